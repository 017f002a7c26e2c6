//! Rewriting of upstream diffs onto the downstream tree layout.

use patchup_api::diff::ExtendedHeader;
use patchup_api::{ApplyMode, CommitDiff, DiffFile, FileStatus, SourceStripping};
use tracing::{debug, info};

use crate::diff::{parse_diff, render_file};
use crate::remap::ReferenceTable;
use crate::Result;

/// Strips the upstream subtree from diff paths and remaps build references in
/// hunk content. Files outside the subtree are dropped.
#[derive(Debug, Clone)]
pub struct DiffRewriter<'a> {
    subtree: String,
    table: &'a ReferenceTable,
}

impl<'a> DiffRewriter<'a> {
    /// Create a rewriter for `subtree` (e.g. `aswb`), relative to the
    /// upstream repository root.
    pub fn new(subtree: impl Into<String>, table: &'a ReferenceTable) -> Self {
        let subtree = subtree.into();
        Self {
            subtree: subtree.trim_matches('/').to_owned(),
            table,
        }
    }

    /// Whether either side of the entry lies inside the subtree.
    #[must_use]
    pub fn is_relevant(&self, file: &DiffFile) -> bool {
        let source_side = [Some(file.header.old_path.as_str()), file.source.as_deref()];
        let target_side = [Some(file.header.new_path.as_str()), file.target.as_deref()];

        source_side
            .into_iter()
            .flatten()
            .any(|token| self.is_under(token, "a/"))
            || target_side
                .into_iter()
                .flatten()
                .any(|token| self.is_under(token, "b/"))
    }

    /// Rewrite one file entry, or `None` when it lies outside the subtree.
    #[must_use]
    pub fn rewrite_file(&self, file: &DiffFile, mode: ApplyMode) -> Option<DiffFile> {
        if !self.is_relevant(file) {
            return None;
        }

        let keep_source = mode.source_stripping() == SourceStripping::PreserveRenameSource
            && matches!(file.status(), FileStatus::Renamed | FileStatus::Copied);
        let mut out = file.clone();

        out.header.new_path = self.strip(&file.header.new_path, "b/");
        out.target = file.target.as_deref().map(|path| self.strip(path, "b/"));
        if !keep_source {
            out.header.old_path = self.strip(&file.header.old_path, "a/");
            out.source = file.source.as_deref().map(|path| self.strip(path, "a/"));
        }

        for header in &mut out.extended {
            match header {
                ExtendedHeader::RenameTo(path) | ExtendedHeader::CopyTo(path) => {
                    *path = self.strip(path, "");
                }
                ExtendedHeader::RenameFrom(path) | ExtendedHeader::CopyFrom(path)
                    if !keep_source =>
                {
                    *path = self.strip(path, "");
                }
                ExtendedHeader::Binary(line) => {
                    let mut rewritten = line.replace(&format!(" b/{}/", self.subtree), " b/");
                    if !keep_source {
                        rewritten = rewritten.replace(&format!(" a/{}/", self.subtree), " a/");
                    }
                    *line = rewritten;
                }
                _ => {}
            }
        }

        for line in out.hunks.iter_mut().flat_map(|hunk| hunk.lines.iter_mut()) {
            if line.kind.is_content() {
                line.text = self.table.remap(&line.text);
            }
        }

        Some(out)
    }

    /// Rewrite a parsed diff into patch text for `mode`.
    #[must_use]
    pub fn rewrite(&self, diff: &CommitDiff, mode: ApplyMode) -> String {
        let mut out = String::new();
        let mut kept = 0usize;
        for file in &diff.files {
            match self.rewrite_file(file, mode) {
                Some(rewritten) => {
                    render_file(&rewritten, &mut out);
                    kept += 1;
                }
                None => debug!(path = %file.header.new_path, "dropping file outside subtree"),
            }
        }
        info!(
            mode = %mode,
            kept,
            dropped = diff.files.len() - kept,
            "rewrote upstream diff"
        );
        out
    }

    /// Parse raw diff text and rewrite it for `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MalformedDiff`] when the text cannot be parsed.
    pub fn rewrite_text(&self, text: &str, mode: ApplyMode) -> Result<String> {
        let diff = parse_diff(text)?;
        Ok(self.rewrite(&diff, mode))
    }

    fn is_under(&self, token: &str, side: &str) -> bool {
        let unquoted = token.strip_prefix('"').unwrap_or(token);
        unquoted
            .strip_prefix(side)
            .and_then(|rest| rest.strip_prefix(self.subtree.as_str()))
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Drop `<subtree>/` right after the side prefix, keeping any quoting.
    fn strip(&self, token: &str, side: &str) -> String {
        if !self.is_under(token, side) {
            return token.to_owned();
        }
        let (quote, unquoted) = match token.strip_prefix('"') {
            Some(rest) => ("\"", rest),
            None => ("", token),
        };
        let rest = &unquoted[side.len() + self.subtree.len() + 1..];
        format!("{quote}{side}{rest}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remap::ReferenceRule;

    fn table() -> ReferenceTable {
        ReferenceTable::new([ReferenceRule::new("//tools/adt/idea/aswb/", "//")]).expect("table")
    }

    const RENAME: &str = "\
diff --git a/aswb/a.txt b/aswb/b.txt
similarity index 100%
rename from aswb/a.txt
rename to aswb/b.txt
";

    #[test]
    fn strip_keeps_quotes_and_side() {
        let table = table();
        let rewriter = DiffRewriter::new("aswb/", &table);
        assert_eq!(rewriter.strip("a/aswb/x y.txt", "a/"), "a/x y.txt");
        assert_eq!(rewriter.strip("\"b/aswb/t\\tab\"", "b/"), "\"b/t\\tab\"");
        assert_eq!(rewriter.strip("aswb/x", ""), "x");
        assert_eq!(rewriter.strip("/dev/null", "a/"), "/dev/null");
        assert_eq!(rewriter.strip("a/aswb2/x", "a/"), "a/aswb2/x");
    }

    #[test]
    fn reject_mode_strips_rename_symmetrically() {
        let table = table();
        let rewriter = DiffRewriter::new("aswb", &table);
        let text = rewriter
            .rewrite_text(RENAME, ApplyMode::Reject)
            .expect("rewrite");
        assert_eq!(
            text,
            "diff --git a/a.txt b/b.txt\n\
             similarity index 100%\n\
             rename from a.txt\n\
             rename to b.txt\n"
        );
    }

    #[test]
    fn three_way_mode_keeps_rename_source() {
        let table = table();
        let rewriter = DiffRewriter::new("aswb", &table);
        let text = rewriter
            .rewrite_text(RENAME, ApplyMode::ThreeWay)
            .expect("rewrite");
        assert_eq!(
            text,
            "diff --git a/aswb/a.txt b/b.txt\n\
             similarity index 100%\n\
             rename from aswb/a.txt\n\
             rename to b.txt\n"
        );
    }

    #[test]
    fn binary_summary_line_is_stripped() {
        let table = table();
        let rewriter = DiffRewriter::new("aswb", &table);
        let text = "diff --git a/aswb/i.png b/aswb/i.png\n\
                    index 1..2 100644\n\
                    Binary files a/aswb/i.png and b/aswb/i.png differ\n";
        let rewritten = rewriter
            .rewrite_text(text, ApplyMode::ThreeWay)
            .expect("rewrite");
        assert!(rewritten.ends_with("Binary files a/i.png and b/i.png differ\n"));
    }

    #[test]
    fn content_is_remapped_but_markers_kept() {
        let table = table();
        let rewriter = DiffRewriter::new("aswb", &table);
        let text = "\
diff --git a/aswb/BUILD b/aswb/BUILD
--- a/aswb/BUILD
+++ b/aswb/BUILD
@@ -1 +1 @@
-deps = [\"//tools/adt/idea/aswb/base\"]
+deps = [\"//tools/adt/idea/aswb/common\"]
\\ No newline at end of file
";
        let rewritten = rewriter
            .rewrite_text(text, ApplyMode::Reject)
            .expect("rewrite");
        assert_eq!(
            rewritten,
            "\
diff --git a/BUILD b/BUILD
--- a/BUILD
+++ b/BUILD
@@ -1 +1 @@
-deps = [\"//base\"]
+deps = [\"//common\"]
\\ No newline at end of file
"
        );
    }
}
