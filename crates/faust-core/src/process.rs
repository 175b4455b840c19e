//! External process execution
//!
//! Commands are explicit argument vectors; nothing goes through a shell, so
//! user-supplied options and filenames can never be reinterpreted. Stdout and
//! stderr are captured separately and exit codes are reported, not judged:
//! whether a non-zero status is a failure is up to the calling stage.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::container::ContainerRun;

/// Where a command executes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Directly on this host, with the workspace as working directory
    Host,
    /// Inside a one-shot container with the workspace mounted
    Container(ContainerRun),
}

/// A command to run for one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Local workspace directory the command operates on
    pub workdir: PathBuf,
    pub target: Target,
}

impl CommandSpec {
    pub fn host(program: impl Into<String>, workdir: &Path) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: workdir.to_path_buf(),
            target: Target::Host,
        }
    }

    pub fn in_container(program: impl Into<String>, workdir: &Path, run: ContainerRun) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: workdir.to_path_buf(),
            target: Target::Container(run),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The program and arguments actually executed on this host
    pub fn argv(&self) -> (String, Vec<String>) {
        match &self.target {
            Target::Host => (self.program.clone(), self.args.clone()),
            Target::Container(run) => (
                run.runtime.command().to_string(),
                run.argv(&self.program, &self.args),
            ),
        }
    }

    /// Command that kills this command's container, if it runs in one.
    ///
    /// Killing the runtime client does not stop the container itself.
    pub fn stop_command(&self) -> Option<CommandSpec> {
        match &self.target {
            Target::Host => None,
            Target::Container(run) => Some(
                CommandSpec::host(run.runtime.command(), &self.workdir)
                    .args(["kill", run.name.as_str()]),
            ),
        }
    }

    /// Human-readable form for logs
    pub fn display(&self) -> String {
        let (program, args) = self.argv();
        std::iter::once(program)
            .chain(args)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Outcome of one finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// Exit status; -1 when the process was terminated by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        out.push_str(&self.stderr);
        out
    }
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Could not execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {} seconds", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
}

/// Runs commands on behalf of pipeline stages
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec, timeout: Duration)
        -> Result<ProcessResult, ProcessError>;
}

/// Runner backed by real child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        timeout: Duration,
    ) -> Result<ProcessResult, ProcessError> {
        let (program, args) = spec.argv();
        debug!("Running: {}", spec.display());

        let start = Instant::now();
        let child = Command::new(&program)
            .args(&args)
            .current_dir(&spec.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: program.clone(),
                source,
            })?;

        // Dropping the future on timeout kills the child
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let result = ProcessResult {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    duration: start.elapsed(),
                };
                debug!(
                    "{} exited with {} after {}ms",
                    program,
                    result.exit_code,
                    result.duration.as_millis()
                );
                Ok(result)
            }
            Ok(Err(source)) => Err(ProcessError::Wait { program, source }),
            Err(_) => Err(ProcessError::TimedOut { program, timeout }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Runtime;
    use tempfile::TempDir;

    #[test]
    fn test_host_argv_is_untouched() {
        let spec = CommandSpec::host("faust", Path::new("/work"))
            .args(["-o", "out.cpp"])
            .arg("my file.dsp");

        let (program, args) = spec.argv();
        assert_eq!(program, "faust");
        assert_eq!(args, vec!["-o", "out.cpp", "my file.dsp"]);
        assert_eq!(spec.display(), "faust -o out.cpp my file.dsp");
    }

    #[test]
    fn test_container_argv_wraps_program() {
        let run = ContainerRun {
            runtime: Runtime::Podman,
            name: "faust-mcp-x".to_string(),
            image: "faust:latest".to_string(),
            mount_source: "/shared/x".to_string(),
            mount_point: "/tmp".to_string(),
        };
        let spec = CommandSpec::in_container("faust", Path::new("/work/x"), run).arg("-h");

        let (program, args) = spec.argv();
        assert_eq!(program, "podman");
        assert_eq!(args.first().map(String::as_str), Some("run"));
        assert_eq!(args.last().map(String::as_str), Some("-h"));
        assert!(args.contains(&"/shared/x:/tmp".to_string()));

        let stop = spec.stop_command().unwrap();
        assert_eq!(stop.program, "podman");
        assert_eq!(stop.args, vec!["kill", "faust-mcp-x"]);
        assert_eq!(stop.target, Target::Host);
    }

    #[test]
    fn test_host_commands_have_no_stop_command() {
        assert!(CommandSpec::host("g++", Path::new("/work")).stop_command().is_none());
    }

    #[test]
    fn test_combined_orders_stdout_first() {
        let result = ProcessResult {
            exit_code: 1,
            stdout: "out\n".to_string(),
            stderr: "err\n".to_string(),
            duration: Duration::ZERO,
        };
        assert!(!result.success());
        assert_eq!(result.combined(), "out\nerr\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_streams_are_captured_separately() {
        let temp = TempDir::new().unwrap();
        let spec = CommandSpec::host("sh", temp.path())
            .args(["-c", "echo to-out; echo to-err >&2; exit 3"]);

        let result = SystemRunner.run(&spec, Duration::from_secs(10)).await.unwrap();
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout, "to-out\n");
        assert_eq!(result.stderr, "to-err\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_in_workdir() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("marker.txt"), "here").unwrap();
        let spec = CommandSpec::host("cat", temp.path()).arg("marker.txt");

        let result = SystemRunner.run(&spec, Duration::from_secs(10)).await.unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "here");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let temp = TempDir::new().unwrap();
        let spec = CommandSpec::host("sleep", temp.path()).arg("5");

        let err = SystemRunner
            .run(&spec, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_a_spawn_error() {
        let temp = TempDir::new().unwrap();
        let spec = CommandSpec::host("definitely-not-a-real-compiler-xyz", temp.path());

        let err = SystemRunner.run(&spec, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }
}
