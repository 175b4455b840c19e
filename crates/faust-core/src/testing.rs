//! Test double for [`ProcessRunner`].
//!
//! [`ScriptedRunner`] records every command it is asked to run and answers
//! from a closure instead of spawning anything. The closure sees the full
//! [`CommandSpec`], including the workspace directory, so it can leave the
//! files a real compiler would have produced.
//!
//! ```rust,no_run
//! use faust_core::testing::ScriptedRunner;
//!
//! let runner = ScriptedRunner::new(|spec| {
//!     std::fs::write(spec.workdir.join("source.cpp"), "// generated").unwrap();
//!     ScriptedRunner::exit(0, "", "")
//! });
//! ```

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::process::{CommandSpec, ProcessError, ProcessResult, ProcessRunner};

type Script = dyn Fn(&CommandSpec) -> Result<ProcessResult, ProcessError> + Send + Sync;

/// A [`ProcessRunner`] that records invocations and replies from a script
pub struct ScriptedRunner {
    script: Box<Script>,
    invocations: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&CommandSpec) -> Result<ProcessResult, ProcessError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Every command exits 0 with no output
    pub fn succeeding() -> Self {
        Self::new(|_| Self::exit(0, "", ""))
    }

    /// Every command times out
    pub fn timing_out() -> Self {
        Self::new(|_| Self::time_out())
    }

    /// A finished process with the given status and streams
    pub fn exit(code: i32, stdout: &str, stderr: &str) -> Result<ProcessResult, ProcessError> {
        Ok(ProcessResult {
            exit_code: code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration: Duration::from_millis(1),
        })
    }

    /// A timeout; program and duration are filled in from the actual call
    pub fn time_out() -> Result<ProcessResult, ProcessError> {
        Err(ProcessError::TimedOut {
            program: String::new(),
            timeout: Duration::ZERO,
        })
    }

    /// Commands received so far, in order
    pub fn invocations(&self) -> Vec<CommandSpec> {
        self.invocations
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Program names received so far, in order
    pub fn programs(&self) -> Vec<String> {
        self.invocations()
            .into_iter()
            .map(|spec| spec.program)
            .collect()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        timeout: Duration,
    ) -> Result<ProcessResult, ProcessError> {
        if let Ok(mut calls) = self.invocations.lock() {
            calls.push(spec.clone());
        }

        match (self.script)(spec) {
            Err(ProcessError::TimedOut { .. }) => Err(ProcessError::TimedOut {
                program: spec.program.clone(),
                timeout,
            }),
            other => other,
        }
    }
}
