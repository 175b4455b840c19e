//! Faust Core - shared machinery for the Faust MCP tools
//!
//! Everything a tool needs to turn DSP source into an artifact: a scratch
//! workspace, a process runner that can target the host or a container,
//! ordered pipeline stages, and the encoder that turns the produced file into
//! a text or base64 payload.

pub mod artifact;
pub mod config;
pub mod container;
pub mod paths;
pub mod pipeline;
pub mod process;
pub mod testing;
pub mod workspace;

pub use artifact::{encode_file, ArtifactBody, EncodedArtifact};
pub use config::{Config, FaustBackend, Isolation};
pub use paths::Paths;
pub use pipeline::{DiagnosticStream, ExitPolicy, Pipeline, Stage, StageError};
pub use process::{CommandSpec, ProcessError, ProcessResult, ProcessRunner, SystemRunner, Target};
pub use workspace::{sanitize_filename, Workspace, WorkspaceError, WorkspaceManager};
