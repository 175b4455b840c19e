//! Tool failure taxonomy
//!
//! Every variant ends up as a single `text` content item; nothing escapes a
//! tool's `call`.

use faust_core::container::ContainerError;
use faust_core::{StageError, WorkspaceError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    /// The workspace directory could not be created
    #[error("Could not create work directory ({0})")]
    Workspace(String),

    /// Malformed or missing arguments
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// No usable container runtime for the container backend
    #[error("{0}")]
    Environment(#[from] ContainerError),

    /// A fixed resource the pipeline needs is not installed
    #[error("Could not read {0}")]
    TemplateMissing(String),

    /// Writing inputs into the workspace failed
    #[error("Could not write {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },

    /// An external stage failed; carries its captured diagnostic
    #[error("{what} failed: {diagnostic}")]
    StageFailed {
        what: &'static str,
        diagnostic: String,
    },

    /// The expected output is absent or empty
    #[error("Could not read {0}")]
    ArtifactMissing(String),
}

impl ToolError {
    pub fn io(file: &str, source: std::io::Error) -> Self {
        ToolError::Io {
            file: file.to_string(),
            source,
        }
    }

    pub fn stage(what: &'static str, diagnostic: impl Into<String>) -> Self {
        ToolError::StageFailed {
            what,
            diagnostic: diagnostic.into(),
        }
    }

    /// Report a pipeline failure, preferring the captured diagnostic
    pub fn from_stage(what: &'static str, err: &StageError) -> Self {
        let diagnostic = err
            .diagnostic()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        Self::stage(what, diagnostic)
    }
}

impl From<WorkspaceError> for ToolError {
    fn from(err: WorkspaceError) -> Self {
        match err {
            WorkspaceError::InvalidFilename(..) => ToolError::InvalidArguments(err.to_string()),
            WorkspaceError::Create { .. } => ToolError::Workspace(err.to_string()),
        }
    }
}
