//! Diff-of-diffs comparison between a downstream commit and the upstream
//! commit it records.
//!
//! Both sides are reduced to their hunk lines per downstream path. Hunk
//! offsets and extended headers are dropped because they differ whenever
//! the trees drifted. The remaining lines are compared with a longest
//! common subsequence: downstream lines outside it count as additions,
//! upstream lines outside it as deletions.

use patchup_api::{CommitDiff, DiffFile, DiffLineKind, DiffStats};

/// Deviation of one downstream path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReview {
    /// Path in the downstream tree.
    pub path: String,
    /// Lines changed by the rewritten upstream diff.
    pub upstream: DiffStats,
    /// Lines changed by the downstream commit.
    pub downstream: DiffStats,
    /// Diff-of-diffs: lines only the downstream commit has (additions) and
    /// lines only upstream has (deletions).
    pub deviation: DiffStats,
}

/// Result of reviewing one downstream commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewReport {
    /// Reviewed downstream commit.
    pub downstream: String,
    /// Upstream commit named by its trailer.
    pub upstream: String,
    /// Per-path comparison, upstream order first.
    pub files: Vec<FileReview>,
}

impl ReviewReport {
    /// Deviation summed over every path.
    #[must_use]
    pub fn deviation(&self) -> DiffStats {
        self.files
            .iter()
            .fold(DiffStats::ZERO, |acc, file| acc.add(file.deviation))
    }

    /// Whether the downstream commit carries the upstream change unmodified.
    #[must_use]
    pub fn is_faithful(&self) -> bool {
        self.deviation() == DiffStats::ZERO
    }
}

/// Compare a rewritten upstream diff with a downstream one, path by path.
#[must_use]
pub fn compare(upstream: &CommitDiff, downstream: &CommitDiff) -> Vec<FileReview> {
    let mut reviews = Vec::new();
    let mut matched = vec![false; downstream.files.len()];

    for file in &upstream.files {
        let path = review_path(file);
        let counterpart = downstream
            .files
            .iter()
            .enumerate()
            .find(|(index, other)| !matched[*index] && review_path(other) == path);

        let upstream_lines = body_lines(file);
        let review = match counterpart {
            Some((index, other)) => {
                matched[index] = true;
                let downstream_lines = body_lines(other);
                let common = common_len(&upstream_lines, &downstream_lines);
                FileReview {
                    path: path.to_owned(),
                    upstream: file.stats(),
                    downstream: other.stats(),
                    deviation: DiffStats::new(
                        count(downstream_lines.len() - common),
                        count(upstream_lines.len() - common),
                    ),
                }
            }
            None => FileReview {
                path: path.to_owned(),
                upstream: file.stats(),
                downstream: DiffStats::ZERO,
                deviation: DiffStats::new(0, count(upstream_lines.len())),
            },
        };
        reviews.push(review);
    }

    for (file, _) in downstream
        .files
        .iter()
        .zip(&matched)
        .filter(|(_, matched)| !**matched)
    {
        reviews.push(FileReview {
            path: review_path(file).to_owned(),
            upstream: DiffStats::ZERO,
            downstream: file.stats(),
            deviation: DiffStats::new(count(body_lines(file).len()), 0),
        });
    }

    reviews
}

fn review_path(file: &DiffFile) -> &str {
    let path = file.header.new_path.as_str();
    path.strip_prefix("b/").unwrap_or(path)
}

fn body_lines(file: &DiffFile) -> Vec<String> {
    file.hunks
        .iter()
        .flat_map(|hunk| &hunk.lines)
        .filter(|line| line.kind != DiffLineKind::NoNewline)
        .map(|line| format!("{}{}", line.kind.marker(), line.text))
        .collect()
}

/// Length of the longest common subsequence, in two rolling rows.
fn common_len(left: &[String], right: &[String]) -> usize {
    let prefix = left
        .iter()
        .zip(right)
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = left[prefix..]
        .iter()
        .rev()
        .zip(right[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let left = &left[prefix..left.len() - suffix];
    let right = &right[prefix..right.len() - suffix];

    let mut previous = vec![0usize; right.len() + 1];
    let mut current = vec![0usize; right.len() + 1];
    for a in left {
        for (j, b) in right.iter().enumerate() {
            current[j + 1] = if a == b {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    prefix + suffix + previous[right.len()]
}

fn count(lines: usize) -> u32 {
    u32::try_from(lines).unwrap_or(u32::MAX)
}
