//! Standard paths used by the Faust MCP server

use std::path::PathBuf;

/// Standard Faust MCP paths
pub struct Paths {
    /// Config directory (~/.config/faust-mcp)
    pub config: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("faust-mcp");

        Self { config }
    }

    /// Default location of the JSON config file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_lives_in_config_dir() {
        let paths = Paths::new();
        assert!(paths.config_file().starts_with(&paths.config));
        assert!(paths.config.ends_with("faust-mcp"));
    }
}
