//! Capability traits the patch engine calls to reach the version-control
//! system and the operator.

mod types;

use std::path::{Path, PathBuf};

use patchup_api::{ApplyMode, ApplyStatus, CommitMetadata, Resolution};

pub use types::{BackendError, BackendResult, BackendSummary};

/// Version-control capabilities required by the patch pipeline.
///
/// Implementations own a single working tree. Calls are strictly sequential;
/// at most one apply is outstanding at any time.
pub trait PatchBackend {
    /// Identity used in logs.
    fn summary(&self) -> BackendSummary;

    /// Raw unified diff of `commit` against its first parent, with binary
    /// payloads and rename detection.
    ///
    /// # Errors
    ///
    /// Returns an error when the commit is unknown or the diff cannot be
    /// produced.
    fn diff(&self, commit: &str) -> BackendResult<String>;

    /// Subject, body and author date of `commit`.
    ///
    /// # Errors
    ///
    /// Returns an error when the commit cannot be resolved.
    fn metadata(&self, commit: &str) -> BackendResult<CommitMetadata>;

    /// Full message of the checked-out commit, `None` on an unborn branch.
    ///
    /// # Errors
    ///
    /// Propagates repository access failures.
    fn head_message(&self) -> BackendResult<Option<String>>;

    /// Feed `patch` to the apply mechanism using `mode`.
    ///
    /// A non-zero status is not an error; only failing to run the apply at
    /// all is.
    ///
    /// # Errors
    ///
    /// Returns an error when the apply mechanism cannot be invoked.
    fn apply(&self, patch: &str, mode: ApplyMode) -> BackendResult<ApplyStatus>;

    /// Whether a partial-apply marker is present.
    ///
    /// # Errors
    ///
    /// Propagates repository access failures.
    fn resumable(&self) -> BackendResult<bool>;

    /// Stage the working tree and finalize the partial apply.
    ///
    /// # Errors
    ///
    /// Returns an error when the apply cannot be finalized.
    fn resume(&self) -> BackendResult<()>;

    /// Discard the partial apply and restore the pre-attempt state.
    ///
    /// # Errors
    ///
    /// Returns an error when the rollback fails.
    fn rollback(&self) -> BackendResult<()>;

    /// Drop working tree modifications to `path` (relative to the tree root).
    ///
    /// # Errors
    ///
    /// Returns an error when the restore fails for a tracked path.
    fn discard_changes(&self, path: &Path) -> BackendResult<()>;

    /// Absolute paths of leftover reject artifacts.
    ///
    /// # Errors
    ///
    /// Returns an error when the tree cannot be walked.
    fn list_reject_artifacts(&self) -> BackendResult<Vec<PathBuf>>;

    /// Add remote `name` pointing to `url`, or verify an existing one.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::RemoteMismatch`] when the remote points
    /// elsewhere.
    fn ensure_remote(&self, name: &str, url: &str) -> BackendResult<()>;

    /// Fetch `branch` from `remote`.
    ///
    /// # Errors
    ///
    /// Returns an error when the fetch fails.
    fn fetch(&self, remote: &str, branch: &str) -> BackendResult<()>;

    /// Commits reachable from `until` but not `since` that touch `path`,
    /// newest first.
    ///
    /// # Errors
    ///
    /// Returns an error when either revision cannot be resolved.
    fn list_commits(&self, since: &str, until: &str, path: &str) -> BackendResult<Vec<String>>;
}

/// Source of operator decisions at conflict prompts.
pub trait OperatorPrompt {
    /// Ask whether to continue after manual fixes or abort.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Prompt`] when no answer can be obtained.
    fn choose(&self, mode: ApplyMode, title: &str) -> BackendResult<Resolution>;
}
