//! Ordered pipeline stages
//!
//! A tool is a short chain of external commands: compile DSP to C++, build
//! the C++, run the result. Stages run strictly in order and the first one
//! that fails ends the pipeline; nothing after it is ever started.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::process::{CommandSpec, ProcessError, ProcessResult, ProcessRunner};
use crate::workspace::Workspace;

/// Time allowed for killing a container that outlived its stage
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Which captured stream describes a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticStream {
    Stderr,
    /// Stdout followed by stderr
    Combined,
}

impl DiagnosticStream {
    pub fn extract(&self, result: &ProcessResult) -> String {
        match self {
            DiagnosticStream::Stderr => result.stderr.clone(),
            DiagnosticStream::Combined => result.combined(),
        }
    }
}

/// How a stage reads its exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPolicy {
    /// Non-zero exit fails the stage
    RequireSuccess,
    /// Any exit status is accepted (e.g. `faust -h` exits non-zero)
    Ignore,
}

/// One external command within a pipeline
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: &'static str,
    pub command: CommandSpec,
    /// Workspace files that must exist before the command runs
    pub requires: Vec<String>,
    /// Workspace files the command must leave behind, non-empty
    pub produces: Vec<String>,
    pub diagnostics: DiagnosticStream,
    pub exit: ExitPolicy,
}

impl Stage {
    pub fn new(name: &'static str, command: CommandSpec) -> Self {
        Self {
            name,
            command,
            requires: Vec::new(),
            produces: Vec::new(),
            diagnostics: DiagnosticStream::Stderr,
            exit: ExitPolicy::RequireSuccess,
        }
    }

    pub fn requires(mut self, file: impl Into<String>) -> Self {
        self.requires.push(file.into());
        self
    }

    pub fn produces(mut self, file: impl Into<String>) -> Self {
        self.produces.push(file.into());
        self
    }

    pub fn diagnostics(mut self, stream: DiagnosticStream) -> Self {
        self.diagnostics = stream;
        self
    }

    pub fn exit_policy(mut self, policy: ExitPolicy) -> Self {
        self.exit = policy;
        self
    }
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error("{stage}: required file {file} is missing")]
    MissingInput { stage: &'static str, file: String },

    #[error("{stage} failed: {diagnostic}")]
    Failed {
        stage: &'static str,
        diagnostic: String,
        /// Present when the process ran to completion
        result: Option<ProcessResult>,
    },

    #[error("{stage}: expected output {file} is missing or empty")]
    MissingOutput { stage: &'static str, file: String },
}

impl StageError {
    pub fn stage(&self) -> &'static str {
        match self {
            StageError::MissingInput { stage, .. }
            | StageError::Failed { stage, .. }
            | StageError::MissingOutput { stage, .. } => stage,
        }
    }

    /// Captured diagnostic text, if the stage got as far as running
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            StageError::Failed { diagnostic, .. } => Some(diagnostic),
            _ => None,
        }
    }
}

/// A sequence of stages run against one workspace
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Run every stage in order; the results are returned in stage order
    pub async fn run(
        &self,
        runner: &dyn ProcessRunner,
        workspace: &Workspace,
        timeout: Duration,
    ) -> Result<Vec<ProcessResult>, StageError> {
        let mut results = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            for file in &stage.requires {
                if !workspace.exists(file) {
                    warn!("{}: missing input {}", stage.name, file);
                    return Err(StageError::MissingInput {
                        stage: stage.name,
                        file: file.clone(),
                    });
                }
            }

            info!("Stage {}: {}", stage.name, stage.command.display());
            let result = match runner.run(&stage.command, timeout).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("{}: {}", stage.name, e);
                    if matches!(e, ProcessError::TimedOut { .. }) {
                        stop_container(runner, &stage.command).await;
                    }
                    return Err(StageError::Failed {
                        stage: stage.name,
                        diagnostic: e.to_string(),
                        result: None,
                    });
                }
            };
            debug!(
                "Stage {} exited with {} in {}ms",
                stage.name,
                result.exit_code,
                result.duration.as_millis()
            );

            if stage.exit == ExitPolicy::RequireSuccess && !result.success() {
                warn!("{} exited with {}", stage.name, result.exit_code);
                return Err(StageError::Failed {
                    stage: stage.name,
                    diagnostic: stage.diagnostics.extract(&result),
                    result: Some(result),
                });
            }

            for file in &stage.produces {
                let present = std::fs::metadata(workspace.resolve(file))
                    .map(|m| m.len() > 0)
                    .unwrap_or(false);
                if !present {
                    warn!("{}: missing output {}", stage.name, file);
                    return Err(StageError::MissingOutput {
                        stage: stage.name,
                        file: file.clone(),
                    });
                }
            }

            results.push(result);
        }

        Ok(results)
    }
}

/// Kill the container behind a timed-out command; host commands die with their process
async fn stop_container(runner: &dyn ProcessRunner, command: &CommandSpec) {
    let Some(stop) = command.stop_command() else {
        return;
    };
    info!("Stopping container: {}", stop.display());
    match runner.run(&stop, STOP_TIMEOUT).await {
        Ok(result) if result.success() => {}
        Ok(result) => warn!(
            "{} exited with {}: {}",
            stop.display(),
            result.exit_code,
            result.stderr.trim()
        ),
        Err(e) => warn!("{}", e),
    }
}
