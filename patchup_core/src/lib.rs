//! Core library for carrying upstream mirror commits into a downstream tree.
//!
//! The crate is layered around three primary responsibilities:
//! - rewriting an upstream unified diff so it applies downstream
//! - wrapping the rewritten diff in a mailbox patch with a provenance trailer
//! - driving the apply/recover state machine against a [`PatchBackend`]

#![warn(
    clippy::all,
    clippy::cargo,
    clippy::nursery,
    clippy::pedantic,
    missing_docs
)]
#![cfg_attr(
    not(test),
    deny(
        clippy::dbg_macro,
        clippy::expect_used,
        clippy::panic,
        clippy::print_stderr,
        clippy::print_stdout,
        clippy::todo,
        clippy::unwrap_used
    )
)]

/// Apply state machine and its driver.
pub mod apply;
/// Configuration file model.
pub mod config;
/// Unified diff parsing and serialization.
pub mod diff;
/// Patch envelope assembly and provenance lookup.
pub mod envelope;
/// End-to-end commit processing.
pub mod pipeline;
/// Build-reference substitution table.
pub mod remap;
/// Downstream commit review against its upstream source.
pub mod review;
/// Path and content rewriting of parsed diffs.
pub mod rewrite;

pub use apply::{
    transition, ApplyEngine, ApplyEvent, ApplyState, Effect, PreparedPatch, Transition,
};
pub use config::Config;
pub use diff::{parse_diff, render_diff, render_file};
pub use envelope::{assemble, extract_provenance, PatchEnvelope};
pub use patchup_api::{
    ApplyAttempt, ApplyMode, ApplyStatus, CommitDiff, CommitMetadata, DiffFile, DiffHunk,
    DiffLine, DiffLineKind, DiffStats, FileStatus, Resolution, SourceStripping,
};
pub use patchup_backend_api::{BackendError, OperatorPrompt, PatchBackend};
pub use pipeline::{render_missing_csv, MissingCommit, Pipeline, PickOutcome};
pub use remap::{ReferenceRule, ReferenceTable};
pub use review::{FileReview, ReviewReport};
pub use rewrite::DiffRewriter;

/// Common result type for the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the core library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A substitution rule cannot be applied safely.
    #[error("reference rule #{index} is invalid: {reason}")]
    InvalidRule {
        /// Zero-based position of the rule in the table.
        index: usize,
        /// What is wrong with the rule.
        reason: &'static str,
    },
    /// Two rules share the same source token, which makes the table ambiguous.
    #[error("reference token {token:?} is declared more than once")]
    DuplicateRule {
        /// Repeated source token.
        token: String,
    },
    /// The unified diff could not be parsed.
    #[error("malformed diff at line {line}: {reason}")]
    MalformedDiff {
        /// 1-based line number in the diff text.
        line: usize,
        /// Description of the problem.
        reason: String,
    },
    /// No provenance trailer was found.
    #[error("no `{key}:` provenance trailer found")]
    MissingProvenance {
        /// Trailer key that was searched for.
        key: String,
    },
    /// More than one provenance trailer was found.
    #[error("found {count} `{key}:` provenance trailers, expected exactly one")]
    AmbiguousProvenance {
        /// Trailer key that was searched for.
        key: String,
        /// Number of matching lines.
        count: usize,
    },
    /// The apply state machine received an event it cannot handle.
    #[error("invalid apply transition from {state} on {event}")]
    InvalidTransition {
        /// State the machine was in.
        state: String,
        /// Event that was rejected.
        event: String,
    },
    /// A previous apply left a partial state behind.
    #[error("a patch apply or rebase is already in progress; resolve or abort it first")]
    ApplyInProgress,
    /// Configuration could not be loaded or is inconsistent.
    #[error("invalid configuration {path}: {reason}")]
    Config {
        /// File the configuration came from.
        path: String,
        /// Description of the problem.
        reason: String,
    },
    /// The version-control backend failed.
    #[error("backend error: {source}")]
    Backend {
        /// Error reported by the backend.
        #[from]
        source: BackendError,
    },
    /// Filesystem interaction failed.
    #[error("failed to access {path}: {source}")]
    Io {
        /// Filesystem path involved in the failed operation.
        path: String,
        /// Source I/O error returned by the standard library.
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn display_path(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}
