use serde::{Deserialize, Serialize};

/// Path marker git uses for the missing side of an addition or deletion.
pub const DEV_NULL: &str = "/dev/null";

/// All file entries of one commit diffed against its first parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CommitDiff {
    /// Commit the diff was produced for, when known.
    #[serde(default)]
    pub commit: Option<String>,
    /// File-level diffs in the order git emitted them.
    #[serde(default)]
    pub files: Vec<DiffFile>,
}

impl CommitDiff {
    /// Aggregate insertions/deletions across every file.
    #[must_use]
    pub fn stats(&self) -> DiffStats {
        self.files
            .iter()
            .fold(DiffStats::ZERO, |acc, file| acc.add(file.stats()))
    }
}

/// The two path tokens of a `diff --git` line, prefixes included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHeader {
    /// Source token, e.g. `a/src/lib.rs`.
    pub old_path: String,
    /// Destination token, e.g. `b/src/lib.rs`.
    pub new_path: String,
}

/// Representation of the diff for a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffFile {
    /// Paths named on the `diff --git` line.
    pub header: DiffHeader,
    /// Extended header lines between `diff --git` and `---`.
    #[serde(default)]
    pub extended: Vec<ExtendedHeader>,
    /// Path from the `---` line (`a/...` or `/dev/null`).
    #[serde(default)]
    pub source: Option<String>,
    /// Path from the `+++` line (`b/...` or `/dev/null`).
    #[serde(default)]
    pub target: Option<String>,
    /// The hunks that make up this file diff.
    #[serde(default)]
    pub hunks: Vec<DiffHunk>,
    /// Verbatim `GIT binary patch` payload, if any.
    #[serde(default)]
    pub binary_patch: Vec<String>,
}

impl DiffFile {
    /// Classify the change from the extended headers and path lines.
    #[must_use]
    pub fn status(&self) -> FileStatus {
        let mut status = None;
        for header in &self.extended {
            match header {
                ExtendedHeader::NewFileMode(_) => status = Some(FileStatus::Added),
                ExtendedHeader::DeletedFileMode(_) => status = Some(FileStatus::Deleted),
                ExtendedHeader::RenameFrom(_) | ExtendedHeader::RenameTo(_) => {
                    status = Some(FileStatus::Renamed);
                }
                ExtendedHeader::CopyFrom(_) | ExtendedHeader::CopyTo(_) => {
                    status = Some(FileStatus::Copied);
                }
                _ => {}
            }
        }

        status.unwrap_or_else(|| {
            if self.source.as_deref() == Some(DEV_NULL) {
                FileStatus::Added
            } else if self.target.as_deref() == Some(DEV_NULL) {
                FileStatus::Deleted
            } else {
                FileStatus::Modified
            }
        })
    }

    /// Whether the file content is binary.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        !self.binary_patch.is_empty()
            || self
                .extended
                .iter()
                .any(|header| matches!(header, ExtendedHeader::Binary(_)))
    }

    /// Count of added and removed lines across all hunks.
    #[must_use]
    pub fn stats(&self) -> DiffStats {
        let mut stats = DiffStats::ZERO;
        for line in self.hunks.iter().flat_map(|hunk| &hunk.lines) {
            match line.kind {
                DiffLineKind::Addition => stats.additions += 1,
                DiffLineKind::Deletion => stats.deletions += 1,
                DiffLineKind::Context | DiffLineKind::NoNewline => {}
            }
        }
        stats
    }
}

/// Extended git header lines that may follow `diff --git`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExtendedHeader {
    /// `old mode <mode>`
    OldMode(String),
    /// `new mode <mode>`
    NewMode(String),
    /// `new file mode <mode>`
    NewFileMode(String),
    /// `deleted file mode <mode>`
    DeletedFileMode(String),
    /// `similarity index <n>%`
    Similarity(String),
    /// `dissimilarity index <n>%`
    Dissimilarity(String),
    /// `rename from <path>` (no `a/` prefix).
    RenameFrom(String),
    /// `rename to <path>` (no `b/` prefix).
    RenameTo(String),
    /// `copy from <path>`
    CopyFrom(String),
    /// `copy to <path>`
    CopyTo(String),
    /// `index <abbrev>..<abbrev> [<mode>]`
    Index(String),
    /// `Binary files <a> and <b> differ`
    Binary(String),
    /// Any other header line, kept verbatim.
    Other(String),
}

/// Summary information about the changes within a file diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DiffStats {
    /// Number of added lines.
    pub additions: u32,
    /// Number of removed lines.
    pub deletions: u32,
}

impl DiffStats {
    /// A stats instance with zero additions and deletions.
    pub const ZERO: Self = Self {
        additions: 0,
        deletions: 0,
    };

    /// Convenience constructor for explicit values.
    pub const fn new(additions: u32, deletions: u32) -> Self {
        Self {
            additions,
            deletions,
        }
    }

    /// Combine two stats structs.
    pub const fn add(self, other: Self) -> Self {
        Self {
            additions: self.additions + other.additions,
            deletions: self.deletions + other.deletions,
        }
    }
}

/// A diff hunk containing a contiguous set of changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    /// The range header describing the hunk offsets.
    pub header: DiffRange,
    /// Trailing text after the closing `@@`, e.g. a function signature.
    #[serde(default)]
    pub section: Option<String>,
    /// Line-level changes inside the hunk.
    #[serde(default)]
    pub lines: Vec<DiffLine>,
}

/// The line number ranges referenced by a hunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRange {
    /// Starting line number for the base side.
    pub base_start: u32,
    /// Number of lines covered on the base side.
    pub base_lines: u32,
    /// Starting line number for the head side.
    pub head_start: u32,
    /// Number of lines covered on the head side.
    pub head_lines: u32,
}

/// A single line within a diff hunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    /// The role the line plays in the diff.
    pub kind: DiffLineKind,
    /// Line text without the leading marker character.
    pub text: String,
}

impl DiffLine {
    /// Construct a line of the given kind.
    pub fn new(kind: DiffLineKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Type of a line contained in a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffLineKind {
    /// Unchanged context line.
    Context,
    /// A newly added line.
    Addition,
    /// A deleted line.
    Deletion,
    /// `\ No newline at end of file` marker.
    NoNewline,
}

impl DiffLineKind {
    /// Marker character that opens the line in unified format.
    pub const fn marker(self) -> char {
        match self {
            Self::Context => ' ',
            Self::Addition => '+',
            Self::Deletion => '-',
            Self::NoNewline => '\\',
        }
    }

    /// Whether the line carries file content.
    pub const fn is_content(self) -> bool {
        !matches!(self, Self::NoNewline)
    }
}

/// File status from the diff's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// File only exists in the head side.
    Added,
    /// File only exists in the base side.
    Deleted,
    /// File exists on both sides with modifications.
    Modified,
    /// File path changed between base and head.
    Renamed,
    /// File content copied from another location.
    Copied,
}
