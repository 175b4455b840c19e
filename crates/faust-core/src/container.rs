//! Container runtime support
//!
//! The DSP compiler usually lives in an image rather than on the host. This
//! module knows how to find a runtime (Docker or Podman) and how to turn a
//! command into a one-shot `run --rm` invocation with the workspace mounted.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use which::which;

/// Errors specific to container operations
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("No container runtime found. Install Docker or Podman.")]
    NoRuntime,

    #[error("Container runtime '{0}' is not on PATH")]
    RuntimeMissing(&'static str),
}

/// Container runtime type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    Docker,
    Podman,
}

impl Runtime {
    /// Get the command name for this runtime
    pub fn command(&self) -> &'static str {
        match self {
            Runtime::Docker => "docker",
            Runtime::Podman => "podman",
        }
    }
}

/// Detect the available container runtime
pub fn detect_runtime() -> Result<Runtime, ContainerError> {
    // The compiler image is published for Docker; prefer it when both exist
    if which("docker").is_ok() {
        return Ok(Runtime::Docker);
    }

    if which("podman").is_ok() {
        return Ok(Runtime::Podman);
    }

    Err(ContainerError::NoRuntime)
}

/// Resolve the configured runtime, falling back to detection
pub fn resolve_runtime(configured: Option<Runtime>) -> Result<Runtime, ContainerError> {
    match configured {
        Some(runtime) => {
            if which(runtime.command()).is_err() {
                return Err(ContainerError::RuntimeMissing(runtime.command()));
            }
            Ok(runtime)
        }
        None => detect_runtime(),
    }
}

/// Unique container name for a run in the workspace labelled `label`
pub fn container_name(label: &str) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("faust-mcp-{}-{}", label, &uuid[..8])
}

/// A one-shot container invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRun {
    pub runtime: Runtime,
    /// Passed as `--name`, so a runaway container can be killed by name
    pub name: String,
    pub image: String,
    /// Host-side directory bound into the container
    pub mount_source: String,
    /// Where `mount_source` appears inside the container; also the working directory
    pub mount_point: String,
}

impl ContainerRun {
    /// Build the argument vector for running `program args...` in the image
    pub fn argv(&self, program: &str, args: &[String]) -> Vec<String> {
        let mut argv = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "-v".to_string(),
            format!("{}:{}", self.mount_source, self.mount_point),
            "-w".to_string(),
            self.mount_point.clone(),
            self.image.clone(),
            program.to_string(),
        ];
        argv.extend(args.iter().cloned());
        argv
    }
}
