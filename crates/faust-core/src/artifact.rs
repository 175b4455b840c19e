//! Artifact encoding
//!
//! Produced files go back to the caller either as inspectable text (generated
//! C++, diagnostics, SVG, DSP source) or as base64 with a media type (PNG and
//! every other binary format).

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;

/// Media type used when the extension is unknown
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Media type of Faust DSP source
pub const FAUST_SOURCE: &str = "application/x-faust";

/// Classify a file by its lower-cased extension
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.to_lowercase(),
        None => return OCTET_STREAM,
    };

    match ext.as_str() {
        // Images
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        // Source code
        "cpp" | "cxx" | "cc" => "text/x-c++src",
        "c" => "text/x-csrc",
        "h" | "hh" | "hpp" => "text/x-c++hdr",
        "js" => "text/javascript",
        "ts" => "text/typescript",
        "py" => "text/x-python",
        "java" => "text/x-java",
        "rs" => "text/x-rust",
        "go" => "text/x-go",
        "dsp" => FAUST_SOURCE,
        // Markup and data
        "html" => "text/html",
        "css" => "text/css",
        "xml" => "text/xml",
        "json" => "application/json",
        "md" => "text/markdown",
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        _ => OCTET_STREAM,
    }
}

/// Whether a media type is returned verbatim rather than base64-encoded
pub fn is_textual(mime_type: &str) -> bool {
    mime_type.starts_with("text/")
        || matches!(mime_type, "application/json" | "image/svg+xml" | FAUST_SOURCE)
}

/// Payload of an encoded artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactBody {
    Text(String),
    /// Standard base64, padded, no line wrapping
    Data(String),
}

/// A file turned into a transportable payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedArtifact {
    pub mime_type: String,
    pub body: ArtifactBody,
}

impl EncodedArtifact {
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            ArtifactBody::Text(text) => Some(text),
            ArtifactBody::Data(_) => None,
        }
    }

    pub fn data(&self) -> Option<&str> {
        match &self.body {
            ArtifactBody::Data(data) => Some(data),
            ArtifactBody::Text(_) => None,
        }
    }
}

/// Encode raw bytes with the given media type
pub fn encode_bytes(bytes: &[u8], mime_type: &str) -> EncodedArtifact {
    let body = if is_textual(mime_type) {
        ArtifactBody::Text(String::from_utf8_lossy(bytes).into_owned())
    } else {
        ArtifactBody::Data(STANDARD.encode(bytes))
    };

    EncodedArtifact {
        mime_type: mime_type.to_string(),
        body,
    }
}

/// Read and encode a file.
///
/// Returns `None` when the file cannot be read or is empty: an empty output
/// always means something upstream went wrong.
pub fn encode_file(path: &Path) -> Option<EncodedArtifact> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("Cannot read artifact {}: {}", path.display(), e);
            return None;
        }
    };

    if bytes.is_empty() {
        debug!("Artifact {} is empty", path.display());
        return None;
    }

    let encoded = encode_bytes(&bytes, mime_type_for(path));
    debug!(
        "Encoded {} ({} bytes) as {}",
        path.display(),
        bytes.len(),
        encoded.mime_type
    );
    Some(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0xff];

    fn write(temp: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = temp.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_mime_table() {
        let cases = [
            ("a.png", "image/png"),
            ("a.JPG", "image/jpeg"),
            ("a.jpeg", "image/jpeg"),
            ("a.gif", "image/gif"),
            ("a.svg", "image/svg+xml"),
            ("a.cpp", "text/x-c++src"),
            ("a.cc", "text/x-c++src"),
            ("a.c", "text/x-csrc"),
            ("a.hh", "text/x-c++hdr"),
            ("a.dsp", "application/x-faust"),
            ("a.json", "application/json"),
            ("a.md", "text/markdown"),
            ("a.txt", "text/plain"),
            ("a.pdf", "application/pdf"),
            ("a.wav", OCTET_STREAM),
            ("noext", OCTET_STREAM),
            ("archive.tar.gz", OCTET_STREAM),
        ];
        for (name, expected) in cases {
            assert_eq!(mime_type_for(Path::new(name)), expected, "{}", name);
        }
    }

    #[test]
    fn test_textual_classes() {
        assert!(is_textual("text/plain"));
        assert!(is_textual("text/x-c++src"));
        assert!(is_textual("application/json"));
        assert!(is_textual("image/svg+xml"));
        assert!(is_textual(FAUST_SOURCE));
        assert!(!is_textual("image/png"));
        assert!(!is_textual("application/pdf"));
        assert!(!is_textual(OCTET_STREAM));
    }

    #[test]
    fn test_text_files_are_verbatim() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "out.cpp", b"int main() {}\n");

        let encoded = encode_file(&path).unwrap();
        assert_eq!(encoded.mime_type, "text/x-c++src");
        assert_eq!(encoded.text(), Some("int main() {}\n"));
        assert_eq!(encoded.data(), None);
    }

    #[test]
    fn test_svg_and_dsp_are_text() {
        let temp = TempDir::new().unwrap();
        let svg = write(&temp, "process.svg", b"<svg/>");
        let dsp = write(&temp, "source.dsp", b"process = _;");

        assert_eq!(encode_file(&svg).unwrap().text(), Some("<svg/>"));
        assert_eq!(encode_file(&dsp).unwrap().text(), Some("process = _;"));
    }

    #[test]
    fn test_binary_files_round_trip_through_base64() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "spectrogram.png", PNG_MAGIC);

        let encoded = encode_file(&path).unwrap();
        assert_eq!(encoded.mime_type, "image/png");
        let data = encoded.data().unwrap();
        assert_eq!(data.len() % 4, 0);
        assert!(!data.contains('\n'));
        assert_eq!(STANDARD.decode(data).unwrap(), PNG_MAGIC);
    }

    #[test]
    fn test_base64_padding() {
        assert_eq!(encode_bytes(b"f", OCTET_STREAM).data(), Some("Zg=="));
        assert_eq!(encode_bytes(b"fo", OCTET_STREAM).data(), Some("Zm8="));
        assert_eq!(encode_bytes(b"foo", OCTET_STREAM).data(), Some("Zm9v"));
    }

    #[test]
    fn test_empty_file_is_absent_for_every_extension() {
        let temp = TempDir::new().unwrap();
        for name in ["empty.txt", "empty.png", "empty.svg", "empty"] {
            let path = write(&temp, name, b"");
            assert!(encode_file(&path).is_none(), "{}", name);
        }
    }

    #[test]
    fn test_missing_file_is_absent() {
        let temp = TempDir::new().unwrap();
        assert!(encode_file(&temp.path().join("nothing.cpp")).is_none());
    }
}
