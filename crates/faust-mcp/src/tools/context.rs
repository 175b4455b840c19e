//! Shared state handed to every tool

use std::sync::Arc;
use std::time::Duration;

use faust_core::container::{
    container_name, resolve_runtime, ContainerError, ContainerRun, Runtime,
};
use faust_core::{CommandSpec, Config, FaustBackend, ProcessRunner, Workspace, WorkspaceManager};
use tracing::warn;

use super::ToolError;

/// Configuration, workspaces and the process runner, shared by all tools
pub struct ToolContext {
    pub config: Config,
    pub workspaces: WorkspaceManager,
    pub runner: Arc<dyn ProcessRunner>,
    runtime: Option<Runtime>,
}

impl ToolContext {
    /// Build a context, detecting the container runtime when the backend needs one
    pub fn new(config: Config, runner: Arc<dyn ProcessRunner>) -> Self {
        let runtime = match config.faust_backend {
            FaustBackend::Container => match resolve_runtime(config.container_runtime) {
                Ok(runtime) => Some(runtime),
                Err(e) => {
                    warn!("{}; faust calls will fail", e);
                    None
                }
            },
            FaustBackend::Local => None,
        };
        Self::with_runtime(config, runner, runtime)
    }

    /// Build a context with an already chosen runtime
    pub fn with_runtime(
        config: Config,
        runner: Arc<dyn ProcessRunner>,
        runtime: Option<Runtime>,
    ) -> Self {
        let workspaces = WorkspaceManager::new(&config);
        Self {
            config,
            workspaces,
            runner,
            runtime,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.config.stage_timeout()
    }

    /// A `faust` invocation bound to `workspace`, on the configured backend.
    ///
    /// Arguments must be workspace-relative: the same names resolve on the
    /// host and at the container's mount point.
    pub fn faust_command(&self, workspace: &Workspace) -> Result<CommandSpec, ToolError> {
        let program = self.config.faust_binary.as_str();
        match self.config.faust_backend {
            FaustBackend::Local => Ok(CommandSpec::host(program, workspace.path())),
            FaustBackend::Container => {
                let runtime = self.runtime.ok_or(ContainerError::NoRuntime)?;
                let run = ContainerRun {
                    runtime,
                    name: container_name(workspace.id()),
                    image: self.config.docker_image.clone(),
                    mount_source: workspace.host_path().display().to_string(),
                    mount_point: self.config.container_mount_point.clone(),
                };
                Ok(CommandSpec::in_container(program, workspace.path(), run))
            }
        }
    }
}
