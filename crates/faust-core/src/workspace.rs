//! Scratch workspaces for tool invocations
//!
//! Every external stage reads and writes files in a workspace directory. With
//! [`Isolation::PerInvocation`] each call gets a fresh subdirectory of the
//! root, so concurrent calls never see each other's `source.dsp`. With
//! [`Isolation::Shared`] every call uses the root itself and holds a lock for
//! the whole call instead.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{Config, Isolation};

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Could not create work directory {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid filename '{0}': {1}")]
    InvalidFilename(String, &'static str),
}

/// Check that an untrusted name is a single plain path component
pub fn sanitize_filename(name: &str) -> Result<&str, WorkspaceError> {
    let problem = if name.trim().is_empty() {
        Some("empty name")
    } else if name == "." || name == ".." {
        Some("parent or current directory")
    } else if name.contains('/') || name.contains('\\') {
        Some("contains a path separator")
    } else if name.contains('\0') {
        Some("contains a NUL byte")
    } else if name.starts_with('-') {
        Some("starts with '-'")
    } else {
        None
    };

    match problem {
        Some(why) => Err(WorkspaceError::InvalidFilename(name.to_string(), why)),
        None => Ok(name),
    }
}

/// Hands out workspaces under a configured root
pub struct WorkspaceManager {
    root: PathBuf,
    host_root: PathBuf,
    isolation: Isolation,
    retain: bool,
    keep: usize,
    shared_lock: Arc<Mutex<()>>,
}

impl WorkspaceManager {
    pub fn new(config: &Config) -> Self {
        Self::with_paths(&config.work_dir, &config.host_shared_dir, config.isolation)
            .retain(config.retain_workspaces)
            .keep(config.max_workspaces)
    }

    /// Manager over explicit local and host-visible roots
    pub fn with_paths(root: &Path, host_root: &Path, isolation: Isolation) -> Self {
        Self {
            root: root.to_path_buf(),
            host_root: host_root.to_path_buf(),
            isolation,
            retain: true,
            keep: 0,
            shared_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Whether per-invocation directories outlive the call
    pub fn retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// Cap on retained per-invocation directories; 0 means unlimited
    pub fn keep(mut self, keep: usize) -> Self {
        self.keep = keep;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root if it does not exist yet
    pub fn ensure_workspace(&self) -> Result<(), WorkspaceError> {
        std::fs::create_dir_all(&self.root).map_err(|source| WorkspaceError::Create {
            path: self.root.clone(),
            source,
        })
    }

    /// Get a workspace for one invocation
    pub async fn allocate(&self) -> Result<Workspace, WorkspaceError> {
        self.ensure_workspace()?;

        match self.isolation {
            Isolation::Shared => {
                let guard = self.shared_lock.clone().lock_owned().await;
                debug!("Using shared workspace {}", self.root.display());
                Ok(Workspace {
                    id: "shared".to_string(),
                    path: absolute(&self.root),
                    host_path: self.host_root.clone(),
                    ephemeral: false,
                    _guard: Some(guard),
                })
            }
            Isolation::PerInvocation => {
                if self.retain && self.keep > 0 {
                    self.prune(self.keep - 1);
                }
                let id = invocation_id();
                let path = self.root.join(&id);
                std::fs::create_dir_all(&path).map_err(|source| WorkspaceError::Create {
                    path: path.clone(),
                    source,
                })?;
                debug!("Allocated workspace {}", path.display());
                Ok(Workspace {
                    host_path: self.host_root.join(&id),
                    id,
                    path: absolute(&path),
                    ephemeral: !self.retain,
                    _guard: None,
                })
            }
        }
    }
}

impl WorkspaceManager {
    /// Remove the oldest invocation directories so that at most `keep` remain.
    ///
    /// Only names produced by [`invocation_id`] are considered; anything else
    /// under the root is left alone.
    fn prune(&self, keep: usize) {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list {}: {}", self.root.display(), e);
                return;
            }
        };

        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| is_invocation_id(name))
            .collect();
        if ids.len() <= keep {
            return;
        }

        // Timestamp prefix: lexical order is age order
        ids.sort();
        let excess = ids.len() - keep;
        for id in &ids[..excess] {
            let path = self.root.join(id);
            match std::fs::remove_dir_all(&path) {
                Ok(()) => debug!("Pruned workspace {}", path.display()),
                Err(e) => warn!("Failed to prune workspace {}: {}", path.display(), e),
            }
        }
    }
}

/// `YYYYmmdd-HHMMSS-xxxxxxxx`
fn is_invocation_id(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == 24
        && bytes.iter().enumerate().all(|(i, b)| match i {
            8 | 15 => *b == b'-',
            _ => b.is_ascii_hexdigit(),
        })
}

/// Stages execute binaries from the workspace, so keep its path absolute
fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Sortable, collision-free directory name for an invocation
fn invocation_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{}-{}", chrono::Local::now().format("%Y%m%d-%H%M%S"), &uuid[..8])
}

/// The directory one invocation works in
pub struct Workspace {
    id: String,
    path: PathBuf,
    host_path: PathBuf,
    ephemeral: bool,
    _guard: Option<OwnedMutexGuard<()>>,
}

impl Workspace {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Local path of the workspace
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the same directory as the container runtime's host sees it
    pub fn host_path(&self) -> &Path {
        &self.host_path
    }

    /// Join a relative name onto the workspace; no validation
    pub fn resolve(&self, filename: &str) -> PathBuf {
        self.path.join(filename)
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.resolve(filename).exists()
    }

    /// Write `contents` to `filename`, replacing any previous file
    pub fn write(&self, filename: &str, contents: impl AsRef<[u8]>) -> io::Result<PathBuf> {
        let path = self.resolve(filename);
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Remove a file or directory left by an earlier run; absent is fine
    pub fn remove(&self, name: &str) -> io::Result<()> {
        let path = self.resolve(name);
        let result = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match result {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    /// Copy an outside file into the workspace under `filename`
    pub fn copy_in(&self, source: &Path, filename: &str) -> io::Result<PathBuf> {
        let path = self.resolve(filename);
        std::fs::copy(source, &path)?;
        Ok(path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.ephemeral {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!("Failed to remove workspace {}: {}", self.path.display(), e);
            }
        }
    }
}
