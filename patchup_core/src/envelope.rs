//! Mailbox-style patch envelopes and provenance trailers.

use std::borrow::Cow;
use std::fmt::Write as _;

use patchup_api::CommitMetadata;

use crate::config::PatchConfig;
use crate::{Error, Result};

/// Fixed date `git format-patch` writes on its `From <id>` separator line.
pub const MAILBOX_DATE: &str = "Mon Sep 17 00:00:00 2001";

/// Header block of a generated patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchEnvelope {
    /// Upstream commit id.
    pub commit: String,
    /// Author identity for the `From:` header.
    pub author: String,
    /// Optional `Date:` header value.
    pub date: Option<String>,
    /// Single-line subject.
    pub subject: String,
    /// Free-form body with any old provenance trailers removed and lines
    /// `git am` would read as the start of the diff indented by one space.
    pub body: String,
    /// Trailer key, e.g. `AOSP`.
    pub trailer_key: String,
}

impl PatchEnvelope {
    /// Build an envelope for `metadata`.
    #[must_use]
    pub fn new(metadata: &CommitMetadata, config: &PatchConfig) -> Self {
        let prefix = trailer_prefix(&config.trailer_key);
        let kept = metadata
            .body
            .lines()
            .filter(|line| !line.starts_with(&prefix))
            .collect::<Vec<_>>()
            .join("\n");
        let body = kept
            .trim()
            .lines()
            .map(escape_patch_break)
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            commit: metadata.id.clone(),
            author: config.author.clone(),
            date: metadata.author_date.clone(),
            subject: metadata.subject.lines().next().unwrap_or_default().to_owned(),
            body,
            trailer_key: config.trailer_key.clone(),
        }
    }

    /// The `<KEY>: <id>` trailer line, without newline.
    #[must_use]
    pub fn trailer(&self) -> String {
        format!("{}{}", trailer_prefix(&self.trailer_key), self.commit)
    }

    /// Render the header block up to and including the trailer line.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "From {} {MAILBOX_DATE}", self.commit);
        let _ = writeln!(out, "From: {}", self.author);
        if let Some(date) = &self.date {
            let _ = writeln!(out, "Date: {date}");
        }
        let _ = writeln!(out, "Subject: [PATCH] {}", self.subject);
        out.push('\n');
        if !self.body.is_empty() {
            out.push_str(&self.body);
            out.push_str("\n\n");
        }
        out.push_str(&self.trailer());
        out.push('\n');
        out
    }
}

/// Wrap a rewritten diff in an envelope for `metadata`.
#[must_use]
pub fn assemble(metadata: &CommitMetadata, diff: &str, config: &PatchConfig) -> String {
    let mut out = PatchEnvelope::new(metadata, config).render();
    out.push_str(diff);
    out
}

/// Find the single upstream commit id recorded under `key` in a commit
/// message or patch. Only the message part is searched; a patch's diff is
/// ignored.
///
/// # Errors
///
/// Returns [`Error::MissingProvenance`] when no trailer is present and
/// [`Error::AmbiguousProvenance`] when more than one is.
pub fn extract_provenance(text: &str, key: &str) -> Result<String> {
    let prefix = trailer_prefix(key);
    let found: Vec<&str> = text
        .lines()
        .take_while(|line| !line.starts_with("diff --git ") && *line != "---")
        .filter_map(|line| line.strip_prefix(&prefix))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .collect();

    match found.as_slice() {
        [] => Err(Error::MissingProvenance { key: key.to_owned() }),
        [id] => Ok((*id).to_owned()),
        _ => Err(Error::AmbiguousProvenance {
            key: key.to_owned(),
            count: found.len(),
        }),
    }
}

/// `git mailinfo` ends the message at `---`, `diff -` and `Index: ` lines.
fn escape_patch_break(line: &str) -> Cow<'_, str> {
    if line.starts_with("---") || line.starts_with("diff -") || line.starts_with("Index: ") {
        Cow::Owned(format!(" {line}"))
    } else {
        Cow::Borrowed(line)
    }
}

fn trailer_prefix(key: &str) -> String {
    format!("{key}: ")
}
