//! Configuration management for the Faust MCP server

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::container::Runtime;

/// Where the DSP compiler runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaustBackend {
    /// Inside the configured compiler image, with the workspace mounted
    Container,
    /// A `faust` binary installed on this host
    Local,
}

impl std::str::FromStr for FaustBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "container" | "docker" => Ok(FaustBackend::Container),
            "local" | "host" => Ok(FaustBackend::Local),
            other => bail!("Unknown faust backend: {}", other),
        }
    }
}

/// How invocations share the workspace root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// Every invocation gets its own subdirectory
    PerInvocation,
    /// All invocations use the root directly, one at a time
    Shared,
}

/// Faust MCP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace root as seen by this process
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// The same directory as seen by the container runtime's host
    #[serde(default = "default_host_shared_dir")]
    pub host_shared_dir: PathBuf,

    /// Image that ships the faust compiler
    #[serde(default = "default_docker_image")]
    pub docker_image: String,

    #[serde(default = "default_faust_backend")]
    pub faust_backend: FaustBackend,

    /// Compiler binary, on the host for `local` and inside the image for `container`
    #[serde(default = "default_faust_binary")]
    pub faust_binary: String,

    /// Container runtime; detected from PATH when unset
    #[serde(default)]
    pub container_runtime: Option<Runtime>,

    /// Mount point of the workspace inside the container
    #[serde(default = "default_container_mount_point")]
    pub container_mount_point: String,

    /// Native C++ compiler used to build the spectrogram renderer
    #[serde(default = "default_cxx")]
    pub cxx: String,

    #[serde(default = "default_cxx_flags")]
    pub cxx_flags: Vec<String>,

    #[serde(default = "default_cxx_libs")]
    pub cxx_libs: Vec<String>,

    /// Architecture file for the spectrogram renderer
    #[serde(default = "default_spectrogram_architecture")]
    pub spectrogram_architecture: PathBuf,

    /// Per-stage timeout (seconds)
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,

    #[serde(default = "default_isolation")]
    pub isolation: Isolation,

    /// Keep per-invocation directories after the call
    #[serde(default = "default_retain_workspaces")]
    pub retain_workspaces: bool,

    /// Retained per-invocation directories kept before the oldest are pruned; 0 keeps all
    #[serde(default = "default_max_workspaces")]
    pub max_workspaces: usize,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("/tmp/faust-mcp")
}

fn default_host_shared_dir() -> PathBuf {
    PathBuf::from("/tmp/faust-shared")
}

fn default_docker_image() -> String {
    "ghcr.io/orlarey/faustdocker:main".to_string()
}

fn default_faust_backend() -> FaustBackend {
    FaustBackend::Container
}

fn default_faust_binary() -> String {
    "faust".to_string()
}

fn default_container_mount_point() -> String {
    "/tmp".to_string()
}

fn default_cxx() -> String {
    "g++".to_string()
}

fn default_cxx_flags() -> Vec<String> {
    ["-std=c++11", "-O3", "-I/usr/local/include", "-L/usr/local/lib"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_cxx_libs() -> Vec<String> {
    ["-lfftw3f", "-lpng", "-lm"].iter().map(|s| s.to_string()).collect()
}

fn default_spectrogram_architecture() -> PathBuf {
    PathBuf::from("/usr/local/share/faust/spectrogram.cpp")
}

fn default_stage_timeout_secs() -> u64 {
    120
}

fn default_isolation() -> Isolation {
    Isolation::PerInvocation
}

fn default_retain_workspaces() -> bool {
    true
}

fn default_max_workspaces() -> usize {
    32
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            host_shared_dir: default_host_shared_dir(),
            docker_image: default_docker_image(),
            faust_backend: default_faust_backend(),
            faust_binary: default_faust_binary(),
            container_runtime: None,
            container_mount_point: default_container_mount_point(),
            cxx: default_cxx(),
            cxx_flags: default_cxx_flags(),
            cxx_libs: default_cxx_libs(),
            spectrogram_architecture: default_spectrogram_architecture(),
            stage_timeout_secs: default_stage_timeout_secs(),
            isolation: default_isolation(),
            retain_workspaces: default_retain_workspaces(),
            max_workspaces: default_max_workspaces(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `FAUST_MCP_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("FAUST_MCP_WORK_DIR") {
            self.work_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("FAUST_MCP_HOST_SHARED_DIR") {
            self.host_shared_dir = PathBuf::from(dir);
        }
        if let Some(image) = lookup("FAUST_MCP_DOCKER_IMAGE") {
            self.docker_image = image;
        }
        if let Some(backend) = lookup("FAUST_MCP_BACKEND") {
            self.faust_backend = backend.parse()?;
        }
        if let Some(secs) = lookup("FAUST_MCP_STAGE_TIMEOUT") {
            self.stage_timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("Invalid FAUST_MCP_STAGE_TIMEOUT: {}", secs))?;
        }
        Ok(())
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}
