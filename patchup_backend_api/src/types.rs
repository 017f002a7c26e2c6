use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Static description of a backend for logging and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSummary {
    /// Stable identifier for the backend.
    pub id: String,
    /// Working tree the backend mutates.
    pub work_tree: PathBuf,
}

impl BackendSummary {
    /// Construct a new summary.
    #[must_use]
    pub fn new(id: impl Into<String>, work_tree: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            work_tree: work_tree.into(),
        }
    }
}

/// Errors surfaced by backend integrations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The version-control binary could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A command exited unsuccessfully.
    #[error("`{command}` failed with status {status}: {stderr}")]
    Command {
        /// Rendered command line.
        command: String,
        /// Exit status description.
        status: String,
        /// Trimmed standard error output.
        stderr: String,
    },
    /// A command did not finish within the configured timeout.
    #[error("`{command}` timed out after {seconds}s")]
    Timeout {
        /// Rendered command line.
        command: String,
        /// Timeout that elapsed.
        seconds: u64,
    },
    /// Provided path does not correspond to a git repository.
    #[error("path does not reference a git repository: {path}")]
    NotARepository {
        /// Path that failed to resolve to a repository.
        path: PathBuf,
    },
    /// Bare repositories have no working tree to patch.
    #[error("repository at {path} is bare and unsupported")]
    BareRepository {
        /// Path of the repository lacking a working tree.
        path: PathBuf,
    },
    /// Requested object does not exist in the repository.
    #[error("unknown revision: {revision}")]
    UnknownRevision {
        /// Revision that failed to resolve.
        revision: String,
    },
    /// A remote exists but points elsewhere.
    #[error("remote {name} exists but does not point to {expected} (found {actual})")]
    RemoteMismatch {
        /// Remote name.
        name: String,
        /// Configured URL.
        expected: String,
        /// URL currently stored in the repository.
        actual: String,
    },
    /// The operator prompt could not be shown or read.
    #[error("prompt failed: {message}")]
    Prompt {
        /// Human-readable failure.
        message: String,
    },
    /// Filesystem interaction failed.
    #[error("failed to access {path}: {source}")]
    Io {
        /// Path involved in the failed operation.
        path: PathBuf,
        /// Source I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Generic failure surfaced by the backend.
    #[error("{message}")]
    Failure {
        /// Human-readable error message.
        message: String,
    },
}

impl BackendError {
    /// Helper to construct a failure from any displayable message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }
}

/// Convenience result alias for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;
