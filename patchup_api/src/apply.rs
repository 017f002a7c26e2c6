use std::fmt;

use serde::{Deserialize, Serialize};

/// Strategy used to feed a patch into the working tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyMode {
    /// Merge-tolerant application using common-ancestor blobs.
    ThreeWay,
    /// Apply what matches and leave reject files for the rest.
    Reject,
}

impl ApplyMode {
    /// How the rewriter must treat source-side path headers for this mode.
    pub const fn source_stripping(self) -> SourceStripping {
        match self {
            Self::ThreeWay => SourceStripping::PreserveRenameSource,
            Self::Reject => SourceStripping::Symmetric,
        }
    }

    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ThreeWay => "three-way",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for ApplyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source-side prefix stripping policy of the diff rewriter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStripping {
    /// Strip source and destination alike.
    Symmetric,
    /// Keep the upstream prefix on the source side of renames and copies.
    PreserveRenameSource,
}

/// Exit status reported by the backend's apply operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyStatus {
    /// Process exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
}

impl ApplyStatus {
    /// A zero exit code.
    pub const SUCCESS: Self = Self { code: Some(0) };

    /// Status for an explicit exit code.
    pub const fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    /// Whether the patch applied completely.
    pub const fn success(self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Outcome of a single apply invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyAttempt {
    /// Strategy that was used.
    pub mode: ApplyMode,
    /// Whether the patch applied completely.
    pub success: bool,
    /// Whether a partial-apply marker was left behind.
    pub resumable: bool,
}

impl ApplyAttempt {
    /// A fully successful attempt.
    pub const fn applied(mode: ApplyMode) -> Self {
        Self {
            mode,
            success: true,
            resumable: false,
        }
    }

    /// A failed attempt, with or without a resumable marker.
    pub const fn failed(mode: ApplyMode, resumable: bool) -> Self {
        Self {
            mode,
            success: false,
            resumable,
        }
    }
}

/// Operator decision at a conflict prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Conflicts were fixed by hand; finalize the apply.
    Continue,
    /// Roll back to the state before the attempt.
    Abort,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_map_to_stripping_policies() {
        assert_eq!(
            ApplyMode::ThreeWay.source_stripping(),
            SourceStripping::PreserveRenameSource
        );
        assert_eq!(
            ApplyMode::Reject.source_stripping(),
            SourceStripping::Symmetric
        );
    }

    #[test]
    fn mode_serializes_kebab_case() {
        let json = serde_json::to_string(&ApplyMode::ThreeWay).expect("serialize mode");
        assert_eq!(json, "\"three-way\"");
        assert_eq!(ApplyMode::Reject.to_string(), "reject");
    }

    #[test]
    fn status_success_requires_zero() {
        assert!(ApplyStatus::SUCCESS.success());
        assert!(!ApplyStatus::from_code(128).success());
        assert!(!ApplyStatus { code: None }.success());
    }
}
