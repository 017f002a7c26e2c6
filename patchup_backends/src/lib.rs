mod cli;
mod git;
mod prompt;

use std::path::Path;

pub use git::{GitBackend, GitBackendOptions};
pub use prompt::TerminalPrompt;

use patchup_backend_api::BackendResult;

/// Open the default backend for the working tree containing `path`.
///
/// # Errors
///
/// Returns an error when `path` is not inside a non-bare git repository.
pub fn default_backend(path: &Path, options: GitBackendOptions) -> BackendResult<GitBackend> {
    GitBackend::open(path, options)
}
