//! End-to-end processing of one upstream commit.

use patchup_api::{ApplyMode, CommitDiff, CommitMetadata};
use patchup_backend_api::{OperatorPrompt, PatchBackend};
use tracing::{info, warn};

use crate::apply::{ApplyEngine, PreparedPatch};
use crate::config::Config;
use crate::diff::parse_diff;
use crate::envelope::{assemble, extract_provenance};
use crate::remap::ReferenceTable;
use crate::review::{compare, ReviewReport};
use crate::rewrite::DiffRewriter;
use crate::{Error, Result};

/// How [`Pipeline::pick`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickOutcome {
    /// HEAD already records this upstream commit; nothing was done.
    AlreadyApplied,
    /// The patch is in the tree.
    Applied,
    /// Neither mode produced an applied patch.
    NotApplied,
}

/// An upstream commit touching the subtree that has not been picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingCommit {
    /// Upstream commit id.
    pub id: String,
    /// Commit subject.
    pub subject: String,
    /// Author date as `YYYY-MM-DD`, when known.
    pub date: Option<String>,
}

impl MissingCommit {
    /// One `;`-separated spreadsheet row linking the commit in the code
    /// browser.
    #[must_use]
    pub fn csv_row(&self, browse_url: &str) -> String {
        format!(
            "=HYPERLINK(\"{browse_url}{id}\", \"{id}\");{subject};{date};0",
            id = self.id,
            subject = self.subject.replace(';', ","),
            date = self.date.as_deref().unwrap_or_default(),
        )
    }
}

/// Join rows for `commits` with newlines.
#[must_use]
pub fn render_missing_csv(commits: &[MissingCommit], browse_url: &str) -> String {
    commits
        .iter()
        .map(|commit| commit.csv_row(browse_url))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ties configuration, backend and prompt together.
pub struct Pipeline<'a> {
    config: Config,
    table: ReferenceTable,
    backend: &'a dyn PatchBackend,
    prompt: &'a dyn OperatorPrompt,
}

impl<'a> Pipeline<'a> {
    /// Validate `config` and build its substitution table.
    ///
    /// # Errors
    ///
    /// Returns configuration and rule errors from [`Config::validate`].
    pub fn new(
        config: Config,
        backend: &'a dyn PatchBackend,
        prompt: &'a dyn OperatorPrompt,
    ) -> Result<Self> {
        config.validate("<pipeline>")?;
        let table = config.reference_table()?;
        Ok(Self {
            config,
            table,
            backend,
            prompt,
        })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Render both apply-mode variants of the patch for `commit`.
    ///
    /// # Errors
    ///
    /// Returns backend errors for unknown commits and
    /// [`Error::MalformedDiff`] if the backend's diff cannot be parsed.
    pub fn prepare(&self, commit: &str) -> Result<PreparedPatch> {
        let metadata = self.backend.metadata(commit)?;
        let mut diff = parse_diff(&self.backend.diff(commit)?)?;
        diff.commit = Some(metadata.id.clone());

        let rewriter = DiffRewriter::new(self.config.upstream.subtree.as_str(), &self.table);
        let render = |mode: ApplyMode| {
            assemble(&metadata, &rewriter.rewrite(&diff, mode), &self.config.patch)
        };

        Ok(PreparedPatch {
            commit: metadata.id.clone(),
            three_way: render(ApplyMode::ThreeWay),
            reject: render(ApplyMode::Reject),
        })
    }

    /// Bring `commit` into the working tree: refuse while another apply is
    /// pending, skip when HEAD already carries it, otherwise prepare and run
    /// the three-way/reject fallback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ApplyInProgress`] when the tree has a partial apply,
    /// and propagates backend, prompt and parse failures.
    pub fn pick(&self, commit: &str) -> Result<PickOutcome> {
        if self.backend.resumable()? {
            return Err(Error::ApplyInProgress);
        }

        if self.config.upstream.fetch {
            self.sync_upstream()?;
        }

        let metadata = self.backend.metadata(commit)?;
        if self.head_provenance()?.as_deref() == Some(metadata.id.as_str()) {
            info!(commit = %metadata.id, "HEAD already carries this commit");
            return Ok(PickOutcome::AlreadyApplied);
        }

        let patch = self.prepare(&metadata.id)?;
        let mut engine = ApplyEngine::new(self.backend, self.prompt);
        if let Some(lock) = self.config.patch.lock_file.as_deref().filter(|p| !p.is_empty()) {
            engine = engine.with_lock_file(lock);
        }

        if engine.try_apply(&patch)? {
            info!(commit = %patch.commit, "picked upstream commit");
            Ok(PickOutcome::Applied)
        } else {
            warn!(commit = %patch.commit, "upstream commit was not applied");
            Ok(PickOutcome::NotApplied)
        }
    }

    /// Upstream commit recorded in HEAD's message, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AmbiguousProvenance`] when HEAD names more than one.
    pub fn head_provenance(&self) -> Result<Option<String>> {
        let Some(message) = self.backend.head_message()? else {
            return Ok(None);
        };
        self.optional_provenance(&message)
    }

    /// Upstream commit recorded in the message of `revision`, if any.
    ///
    /// # Errors
    ///
    /// Returns backend errors for unknown revisions and
    /// [`Error::AmbiguousProvenance`] when the message names more than one.
    pub fn provenance_of(&self, revision: &str) -> Result<Option<String>> {
        let metadata = self.backend.metadata(revision)?;
        self.optional_provenance(&full_message(&metadata))
    }

    /// Register the upstream remote and fetch the tracked branch.
    ///
    /// # Errors
    ///
    /// Propagates backend failures, including a remote name bound to a
    /// different URL.
    pub fn sync_upstream(&self) -> Result<()> {
        let upstream = &self.config.upstream;
        self.backend
            .ensure_remote(&upstream.remote_name, &upstream.remote)?;
        self.backend.fetch(&upstream.remote_name, &upstream.branch)?;
        Ok(())
    }

    /// Upstream commits touching the subtree after `since`, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn missing(&self, since: &str) -> Result<Vec<MissingCommit>> {
        if self.config.upstream.fetch {
            self.sync_upstream()?;
        }

        let mut ids = self.backend.list_commits(
            since,
            &self.config.upstream_ref(),
            &self.config.upstream.subtree,
        )?;
        ids.reverse();

        ids.into_iter()
            .map(|id| {
                let metadata = self.backend.metadata(&id)?;
                Ok(MissingCommit {
                    id: metadata.id,
                    subject: metadata.subject,
                    date: metadata.short_date,
                })
            })
            .collect()
    }

    /// Compare the downstream commit `revision` with the upstream commit its
    /// trailer names, after rewriting the upstream side onto the downstream
    /// layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingProvenance`] when `revision` records no
    /// upstream commit, and propagates backend and parse failures.
    pub fn review(&self, revision: &str) -> Result<ReviewReport> {
        let metadata = self.backend.metadata(revision)?;
        let upstream_id =
            extract_provenance(&full_message(&metadata), &self.config.patch.trailer_key)?;
        if self.config.upstream.fetch {
            self.sync_upstream()?;
        }

        let rewriter = DiffRewriter::new(self.config.upstream.subtree.as_str(), &self.table);
        let raw = parse_diff(&self.backend.diff(&upstream_id)?)?;
        let upstream = CommitDiff {
            commit: Some(upstream_id.clone()),
            files: raw
                .files
                .iter()
                .filter_map(|file| rewriter.rewrite_file(file, ApplyMode::Reject))
                .collect(),
        };
        let mut downstream = parse_diff(&self.backend.diff(&metadata.id)?)?;
        downstream.commit = Some(metadata.id.clone());

        let report = ReviewReport {
            files: compare(&upstream, &downstream),
            downstream: metadata.id,
            upstream: upstream_id,
        };
        let deviation = report.deviation();
        info!(
            commit = %report.downstream,
            upstream = %report.upstream,
            additions = deviation.additions,
            deletions = deviation.deletions,
            "reviewed commit"
        );
        Ok(report)
    }

    fn optional_provenance(&self, message: &str) -> Result<Option<String>> {
        match extract_provenance(message, &self.config.patch.trailer_key) {
            Ok(id) => Ok(Some(id)),
            Err(Error::MissingProvenance { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

fn full_message(metadata: &CommitMetadata) -> String {
    if metadata.body.is_empty() {
        metadata.subject.clone()
    } else {
        format!("{}\n\n{}", metadata.subject, metadata.body)
    }
}
