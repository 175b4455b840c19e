//! Mel spectrogram rendering
//!
//! Three stages against one workspace: faust compiles the DSP against the
//! spectrogram architecture, the native compiler builds the renderer, and the
//! renderer drives the DSP's `gate`/`freq`/`gain` parameters to produce a PNG.

use std::sync::Arc;

use async_trait::async_trait;
use faust_core::{
    encode_file, CommandSpec, DiagnosticStream, Pipeline, Stage, StageError, Workspace,
};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{parse_args, respond, tool, McpTool, ToolContext, ToolError};
use crate::protocol::{Tool, ToolResult};

const NAME: &str = "FaustSpectrogramTool";

const SOURCE: &str = "spectrogram_source.dsp";
const ARCHITECTURE: &str = "spectrogram.cpp";
const GENERATED: &str = "spectrogram_source.cpp";
const EXECUTABLE: &str = "spectrogram_exe";
const IMAGE: &str = "spectrogram.png";
const ERRORS: &str = "spectrogram_error.txt";

const COLORMAPS: [&str; 4] = ["viridis", "magma", "hot", "gray"];

#[derive(Debug, Deserialize)]
struct SpectrogramArgs {
    value: String,
    #[serde(default = "default_duration")]
    duration: f64,
    #[serde(default = "default_gate_duration")]
    gate_duration: f64,
    #[serde(default = "default_frequency")]
    frequency: f64,
    #[serde(default = "default_gain")]
    gain: f64,
    #[serde(default = "default_sample_rate", deserialize_with = "whole_number")]
    sample_rate: u32,
    #[serde(default = "default_fft_size", deserialize_with = "whole_number")]
    fft_size: u32,
    #[serde(default = "default_hop_size", deserialize_with = "whole_number")]
    hop_size: u32,
    #[serde(default = "default_mel_bands", deserialize_with = "whole_number")]
    mel_bands: u32,
    #[serde(default = "default_colormap")]
    colormap: String,
    #[serde(default)]
    use_db: bool,
}

/// Accept any JSON number with an integral value (`48000` or `48000.0`)
fn whole_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value.fract() != 0.0 || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(de::Error::custom(format!(
            "expected a non-negative whole number, got {}",
            value
        )));
    }
    Ok(value as u32)
}

fn default_duration() -> f64 {
    2.0
}

fn default_gate_duration() -> f64 {
    0.5
}

fn default_frequency() -> f64 {
    440.0
}

fn default_gain() -> f64 {
    0.8
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_fft_size() -> u32 {
    2048
}

fn default_hop_size() -> u32 {
    512
}

fn default_mel_bands() -> u32 {
    128
}

fn default_colormap() -> String {
    "hot".to_string()
}

impl SpectrogramArgs {
    fn validate(&self) -> Result<(), ToolError> {
        let invalid = |msg: String| Err(ToolError::InvalidArguments(msg));

        for (name, value) in [
            ("duration", self.duration),
            ("gate_duration", self.gate_duration),
            ("frequency", self.frequency),
            ("gain", self.gain),
        ] {
            if !value.is_finite() {
                return invalid(format!("{} must be a finite number", name));
            }
        }
        if self.duration <= 0.0 {
            return invalid(format!("duration must be positive, got {}", self.duration));
        }
        if self.gate_duration < 0.0 {
            return invalid(format!(
                "gate_duration must not be negative, got {}",
                self.gate_duration
            ));
        }
        for (name, value) in [
            ("sample_rate", self.sample_rate),
            ("hop_size", self.hop_size),
            ("mel_bands", self.mel_bands),
        ] {
            if value == 0 {
                return invalid(format!("{} must be positive", name));
            }
        }
        if !self.fft_size.is_power_of_two() {
            return invalid(format!(
                "fft_size must be a power of 2, got {}",
                self.fft_size
            ));
        }
        if !COLORMAPS.contains(&self.colormap.as_str()) {
            return invalid(format!(
                "colormap must be one of {}, got '{}'",
                COLORMAPS.join(", "),
                self.colormap
            ));
        }
        Ok(())
    }

    /// Renderer arguments: positional signal parameters, then options
    fn render_args(&self) -> Vec<String> {
        let mut args = vec![
            self.duration.to_string(),
            self.gate_duration.to_string(),
            self.frequency.to_string(),
            self.gain.to_string(),
            "-sr".to_string(),
            self.sample_rate.to_string(),
            "-fft".to_string(),
            self.fft_size.to_string(),
            "-hop".to_string(),
            self.hop_size.to_string(),
            "-mel".to_string(),
            self.mel_bands.to_string(),
            "-cmap".to_string(),
            self.colormap.clone(),
            "-o".to_string(),
            IMAGE.to_string(),
        ];
        if self.use_db {
            args.push("-db".to_string());
        }
        args
    }
}

/// Label and error-file header for a failed stage
fn failure_labels(stage: &str) -> (&'static str, &'static str) {
    match stage {
        "faust" => ("Faust compilation", "Faust compilation error:\n"),
        "c++" => ("C++ compilation", "C++ compilation error:\n"),
        _ => ("Spectrogram generation", "Spectrogram generation error:\n"),
    }
}

/// Renders a mel spectrogram of a DSP program's response to a gated note
pub struct SpectrogramTool {
    ctx: Arc<ToolContext>,
}

impl SpectrogramTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }

    fn pipeline(&self, ws: &Workspace, args: &SpectrogramArgs) -> Result<Pipeline, ToolError> {
        let config = &self.ctx.config;

        let faust = self
            .ctx
            .faust_command(ws)?
            .args(["-a", ARCHITECTURE, "-o", GENERATED, SOURCE]);

        let cxx = CommandSpec::host(config.cxx.as_str(), ws.path())
            .args([GENERATED, "-o", EXECUTABLE])
            .args(config.cxx_flags.iter().cloned())
            .args(config.cxx_libs.iter().cloned());

        let renderer = ws.resolve(EXECUTABLE).display().to_string();
        let render = CommandSpec::host(renderer, ws.path()).args(args.render_args());

        Ok(Pipeline::new()
            .stage(
                Stage::new("faust", faust)
                    .requires(SOURCE)
                    .requires(ARCHITECTURE)
                    .produces(GENERATED),
            )
            .stage(
                Stage::new("c++", cxx)
                    .requires(GENERATED)
                    .produces(EXECUTABLE)
                    .diagnostics(DiagnosticStream::Combined),
            )
            .stage(
                Stage::new("render", render)
                    .requires(EXECUTABLE)
                    .diagnostics(DiagnosticStream::Combined),
            ))
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let args: SpectrogramArgs = parse_args(arguments)?;
        args.validate()?;
        let ws = self.ctx.workspaces.allocate().await?;

        ws.write(SOURCE, &args.value)
            .map_err(|e| ToolError::io(SOURCE, e))?;
        for stale in [GENERATED, EXECUTABLE, IMAGE, ERRORS] {
            ws.remove(stale).map_err(|e| ToolError::io(stale, e))?;
        }
        ws.copy_in(&self.ctx.config.spectrogram_architecture, ARCHITECTURE)
            .map_err(|e| {
                warn!(
                    "Cannot copy {}: {}",
                    self.ctx.config.spectrogram_architecture.display(),
                    e
                );
                ToolError::TemplateMissing("spectrogram.cpp architecture".to_string())
            })?;

        let pipeline = self.pipeline(&ws, &args)?;
        if let Err(e) = pipeline
            .run(self.ctx.runner.as_ref(), &ws, self.ctx.timeout())
            .await
        {
            return Err(self.report(&ws, &e));
        }

        let path = ws.resolve(IMAGE);
        let artifact = encode_file(&path)
            .ok_or_else(|| ToolError::ArtifactMissing(format!("PNG file at: {}", path.display())))?;
        let data = artifact.data().ok_or_else(|| {
            ToolError::stage("Spectrogram generation", "PNG file could not be encoded")
        })?;
        info!("Rendered {} ({} bytes base64)", IMAGE, data.len());
        Ok(ToolResult::image(data, artifact.mime_type.as_str()))
    }

    /// Record a stage failure in the workspace and turn it into a tool error
    fn report(&self, ws: &Workspace, err: &StageError) -> ToolError {
        let (what, header) = failure_labels(err.stage());
        let diagnostic = err
            .diagnostic()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());

        if let Err(e) = ws.write(ERRORS, format!("{}{}", header, diagnostic)) {
            warn!("Cannot write {}: {}", ERRORS, e);
        }
        ToolError::stage(what, diagnostic)
    }
}

#[async_trait]
impl McpTool for SpectrogramTool {
    fn name(&self) -> &'static str {
        NAME
    }

    fn describe(&self) -> Tool {
        tool(
            NAME,
            "Generates mel-scale spectrogram PNG from Faust DSP code. The DSP must expose three parameters: 'gate' (button), 'freq' (frequency), and 'gain' (amplitude).",
            json!({
                "value": {
                    "type": "string",
                    "description": "Faust DSP source code with gate, freq, and gain parameters"
                },
                "duration": {
                    "type": "number",
                    "description": "Total duration in seconds",
                    "default": 2.0
                },
                "gate_duration": {
                    "type": "number",
                    "description": "Gate=1 duration in seconds (from start)",
                    "default": 0.5
                },
                "frequency": {
                    "type": "number",
                    "description": "Frequency in Hz",
                    "default": 440.0
                },
                "gain": {
                    "type": "number",
                    "description": "Gain value (0.0 to 1.0)",
                    "default": 0.8
                },
                "sample_rate": {
                    "type": "integer",
                    "description": "Sample rate in Hz",
                    "default": 44100
                },
                "fft_size": {
                    "type": "integer",
                    "description": "FFT size (power of 2)",
                    "default": 2048
                },
                "hop_size": {
                    "type": "integer",
                    "description": "Hop size in samples",
                    "default": 512
                },
                "mel_bands": {
                    "type": "integer",
                    "description": "Number of mel bands",
                    "default": 128
                },
                "colormap": {
                    "type": "string",
                    "description": "Colormap: viridis, magma, hot, gray",
                    "enum": COLORMAPS,
                    "default": "hot"
                },
                "use_db": {
                    "type": "boolean",
                    "description": "Display in decibels",
                    "default": false
                }
            }),
            vec!["value"],
        )
    }

    async fn call(&self, arguments: Value) -> ToolResult {
        respond(NAME, self.execute(arguments).await)
    }
}
