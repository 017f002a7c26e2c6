//! Parsing and rendering of git's extended unified diff format.
//!
//! Rendering a parsed diff reproduces the input text line for line, so a
//! rewrite that only touches paths and content leaves every other byte of
//! the patch intact.

use std::fmt::Write as _;
use std::iter::Peekable;

use patchup_api::diff::{DiffHeader, DiffRange, ExtendedHeader};
use patchup_api::{CommitDiff, DiffFile, DiffHunk, DiffLine, DiffLineKind};

use crate::{Error, Result};

const FILE_MARKER: &str = "diff --git ";
const BINARY_MARKER: &str = "GIT binary patch";

/// Parse the output of `git diff`/`git show` into file entries.
///
/// # Errors
///
/// Returns [`Error::MalformedDiff`] when text appears before the first file
/// header, a hunk header cannot be read, or a hunk body does not match the
/// line counts its header declares.
pub fn parse_diff(text: &str) -> Result<CommitDiff> {
    let mut raw: Vec<&str> = text.split('\n').collect();
    if text.ends_with('\n') || text.is_empty() {
        raw.pop();
    }

    let mut lines = raw.into_iter().enumerate().map(|(idx, line)| (idx + 1, line)).peekable();
    let mut files = Vec::new();
    let mut current: Option<DiffFile> = None;

    while let Some((number, line)) = lines.next() {
        if let Some(rest) = line.strip_prefix(FILE_MARKER) {
            files.extend(current.take());
            current = Some(DiffFile {
                header: parse_file_header(rest, number)?,
                extended: Vec::new(),
                source: None,
                target: None,
                hunks: Vec::new(),
                binary_patch: Vec::new(),
            });
            continue;
        }

        let Some(file) = current.as_mut() else {
            return Err(malformed(number, "content before the first `diff --git` header"));
        };

        if line.starts_with("@@ ") {
            let hunk = parse_hunk(line, number, &mut lines)?;
            file.hunks.push(hunk);
        } else if line == BINARY_MARKER {
            file.binary_patch.push(line.to_owned());
            while let Some((_, next)) = lines.next_if(|(_, next)| !next.starts_with(FILE_MARKER)) {
                file.binary_patch.push(next.to_owned());
            }
        } else if !file.hunks.is_empty() {
            return Err(malformed(number, "unexpected line after hunk body"));
        } else if let Some(path) = line.strip_prefix("--- ") {
            file.source = Some(path.to_owned());
        } else if let Some(path) = line.strip_prefix("+++ ") {
            file.target = Some(path.to_owned());
        } else if file.source.is_some() {
            return Err(malformed(number, "expected `+++` or a hunk header"));
        } else {
            file.extended.push(parse_extended(line));
        }
    }

    files.extend(current);
    Ok(CommitDiff {
        commit: None,
        files,
    })
}

/// Render a parsed diff back into patch text.
#[must_use]
pub fn render_diff(diff: &CommitDiff) -> String {
    let mut out = String::new();
    for file in &diff.files {
        render_file(file, &mut out);
    }
    out
}

/// Append one file entry in unified format to `out`.
pub fn render_file(file: &DiffFile, out: &mut String) {
    let _ = writeln!(
        out,
        "{FILE_MARKER}{} {}",
        file.header.old_path, file.header.new_path
    );
    for header in &file.extended {
        out.push_str(&render_extended(header));
        out.push('\n');
    }
    if let Some(source) = &file.source {
        let _ = writeln!(out, "--- {source}");
    }
    if let Some(target) = &file.target {
        let _ = writeln!(out, "+++ {target}");
    }
    for line in &file.binary_patch {
        out.push_str(line);
        out.push('\n');
    }
    for hunk in &file.hunks {
        render_hunk(hunk, out);
    }
}

fn render_hunk(hunk: &DiffHunk, out: &mut String) {
    let range = &hunk.header;
    let _ = write!(
        out,
        "@@ -{} +{} @@",
        side(range.base_start, range.base_lines),
        side(range.head_start, range.head_lines)
    );
    if let Some(section) = &hunk.section {
        out.push(' ');
        out.push_str(section);
    }
    out.push('\n');
    for line in &hunk.lines {
        out.push(line.kind.marker());
        out.push_str(&line.text);
        out.push('\n');
    }
}

// git omits the count when it is exactly one.
fn side(start: u32, lines: u32) -> String {
    if lines == 1 {
        start.to_string()
    } else {
        format!("{start},{lines}")
    }
}

fn render_extended(header: &ExtendedHeader) -> String {
    match header {
        ExtendedHeader::OldMode(mode) => format!("old mode {mode}"),
        ExtendedHeader::NewMode(mode) => format!("new mode {mode}"),
        ExtendedHeader::NewFileMode(mode) => format!("new file mode {mode}"),
        ExtendedHeader::DeletedFileMode(mode) => format!("deleted file mode {mode}"),
        ExtendedHeader::Similarity(value) => format!("similarity index {value}"),
        ExtendedHeader::Dissimilarity(value) => format!("dissimilarity index {value}"),
        ExtendedHeader::RenameFrom(path) => format!("rename from {path}"),
        ExtendedHeader::RenameTo(path) => format!("rename to {path}"),
        ExtendedHeader::CopyFrom(path) => format!("copy from {path}"),
        ExtendedHeader::CopyTo(path) => format!("copy to {path}"),
        ExtendedHeader::Index(value) => format!("index {value}"),
        ExtendedHeader::Binary(raw) | ExtendedHeader::Other(raw) => raw.clone(),
    }
}

fn parse_extended(line: &str) -> ExtendedHeader {
    const PREFIXED: &[(&str, fn(String) -> ExtendedHeader)] = &[
        ("old mode ", ExtendedHeader::OldMode),
        ("new mode ", ExtendedHeader::NewMode),
        ("new file mode ", ExtendedHeader::NewFileMode),
        ("deleted file mode ", ExtendedHeader::DeletedFileMode),
        ("similarity index ", ExtendedHeader::Similarity),
        ("dissimilarity index ", ExtendedHeader::Dissimilarity),
        ("rename from ", ExtendedHeader::RenameFrom),
        ("rename to ", ExtendedHeader::RenameTo),
        ("copy from ", ExtendedHeader::CopyFrom),
        ("copy to ", ExtendedHeader::CopyTo),
        ("index ", ExtendedHeader::Index),
    ];

    for (prefix, build) in PREFIXED {
        if let Some(value) = line.strip_prefix(prefix) {
            return build(value.to_owned());
        }
    }
    if line.starts_with("Binary files ") {
        return ExtendedHeader::Binary(line.to_owned());
    }
    ExtendedHeader::Other(line.to_owned())
}

/// Split the two path tokens of a `diff --git` line.
fn parse_file_header(rest: &str, number: usize) -> Result<DiffHeader> {
    let split = |old: &str, new: &str| DiffHeader {
        old_path: old.to_owned(),
        new_path: new.to_owned(),
    };

    if rest.starts_with('"') {
        let end = closing_quote(rest)
            .ok_or_else(|| malformed(number, "unterminated quoted path in file header"))?;
        let new = rest[end + 1..]
            .strip_prefix(' ')
            .ok_or_else(|| malformed(number, "missing destination path in file header"))?;
        return Ok(split(&rest[..=end], new));
    }

    if let Some(pos) = rest.find(" \"") {
        return Ok(split(&rest[..pos], &rest[pos + 1..]));
    }

    // Unquoted names may contain spaces; prefer the split where both sides
    // name the same path, which is what git emits for everything but renames.
    let candidates: Vec<usize> = rest.match_indices(" b/").map(|(pos, _)| pos).collect();
    let symmetric = candidates.iter().copied().find(|&pos| {
        rest[..pos].strip_prefix("a/") == Some(&rest[pos + 3..])
    });
    if let Some(pos) = symmetric.or_else(|| candidates.first().copied()) {
        return Ok(split(&rest[..pos], &rest[pos + 1..]));
    }

    rest.split_once(' ')
        .map(|(old, new)| split(old, new))
        .ok_or_else(|| malformed(number, "file header names fewer than two paths"))
}

fn closing_quote(quoted: &str) -> Option<usize> {
    let mut escaped = false;
    for (idx, ch) in quoted.char_indices().skip(1) {
        match ch {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => return Some(idx),
            _ => escaped = false,
        }
    }
    None
}

fn parse_hunk<'a, I>(header: &str, number: usize, lines: &mut Peekable<I>) -> Result<DiffHunk>
where
    I: Iterator<Item = (usize, &'a str)>,
{
    let (range, section) = parse_hunk_header(header, number)?;
    let mut base_left = range.base_lines;
    let mut head_left = range.head_lines;
    let mut body = Vec::new();

    loop {
        if let Some((_, marker)) = lines.next_if(|(_, next)| next.starts_with('\\')) {
            body.push(DiffLine::new(DiffLineKind::NoNewline, &marker[1..]));
            continue;
        }
        if base_left == 0 && head_left == 0 {
            break;
        }

        let Some((line_number, line)) = lines.next() else {
            return Err(malformed(number, "hunk ends before its declared line counts"));
        };
        let (kind, text) = match line.chars().next() {
            Some(' ') => (DiffLineKind::Context, &line[1..]),
            // Some tools trim the single space of an empty context line.
            None => (DiffLineKind::Context, ""),
            Some('+') => (DiffLineKind::Addition, &line[1..]),
            Some('-') => (DiffLineKind::Deletion, &line[1..]),
            Some(_) => {
                return Err(malformed(line_number, "hunk ends before its declared line counts"));
            }
        };

        let exhausted = match kind {
            DiffLineKind::Context => take(&mut base_left) | take(&mut head_left),
            DiffLineKind::Deletion => take(&mut base_left),
            DiffLineKind::Addition => take(&mut head_left),
            DiffLineKind::NoNewline => false,
        };
        if exhausted {
            return Err(malformed(line_number, "hunk body is longer than its header declares"));
        }
        body.push(DiffLine::new(kind, text));
    }

    Ok(DiffHunk {
        header: range,
        section,
        lines: body,
    })
}

/// Decrement a remaining-line counter, reporting `true` if it was already zero.
fn take(counter: &mut u32) -> bool {
    match counter.checked_sub(1) {
        Some(next) => {
            *counter = next;
            false
        }
        None => true,
    }
}

fn parse_hunk_header(line: &str, number: usize) -> Result<(DiffRange, Option<String>)> {
    let invalid = || malformed(number, format!("invalid hunk header `{line}`"));

    let rest = line.strip_prefix("@@ -").ok_or_else(invalid)?;
    let (ranges, trailer) = rest.split_once(" @@").ok_or_else(invalid)?;
    let (base, head) = ranges.split_once(" +").ok_or_else(invalid)?;
    let (base_start, base_lines) = parse_side(base).ok_or_else(invalid)?;
    let (head_start, head_lines) = parse_side(head).ok_or_else(invalid)?;

    let section = match trailer.strip_prefix(' ') {
        Some(text) => Some(text.to_owned()),
        None if trailer.is_empty() => None,
        None => Some(trailer.to_owned()),
    };

    Ok((
        DiffRange {
            base_start,
            base_lines,
            head_start,
            head_lines,
        },
        section,
    ))
}

fn parse_side(side: &str) -> Option<(u32, u32)> {
    match side.split_once(',') {
        Some((start, lines)) => Some((start.parse().ok()?, lines.parse().ok()?)),
        None => Some((side.parse().ok()?, 1)),
    }
}

fn malformed(line: usize, reason: impl Into<String>) -> Error {
    Error::MalformedDiff {
        line,
        reason: reason.into(),
    }
}
