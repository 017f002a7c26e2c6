//! Backend over a local git working tree.
//!
//! Reads (commit metadata, repository state, remotes) go through libgit2.
//! Everything libgit2 cannot do (`git am`, `git diff --binary`, fetching with
//! the user's credentials) shells out to the `git` binary.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use git2::{ErrorClass, ErrorCode, Repository, RepositoryState, Status};
use ignore::WalkBuilder;
use patchup_api::{ApplyMode, ApplyStatus, CommitMetadata};
use patchup_backend_api::{BackendError, BackendResult, BackendSummary, PatchBackend};
use tracing::{debug, info, warn};

use crate::cli::GitCli;

const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Tunables for [`GitBackend`].
#[derive(Debug, Clone)]
pub struct GitBackendOptions {
    /// Binary invoked for porcelain commands.
    pub binary: OsString,
    /// Upper bound for a single git query. `fetch` and `am` are not bounded.
    pub timeout: Duration,
    /// File name suffix of reject artifacts.
    pub reject_suffix: String,
}

impl Default for GitBackendOptions {
    fn default() -> Self {
        Self {
            binary: OsString::from("git"),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            reject_suffix: ".rej".to_string(),
        }
    }
}

/// [`PatchBackend`] implementation for a non-bare git repository.
pub struct GitBackend {
    repo: Repository,
    root: PathBuf,
    cli: GitCli,
    reject_suffix: String,
}

impl GitBackend {
    /// Open the repository containing `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be canonicalized, does not resolve
    /// to a git repository, or the repository is bare.
    pub fn open(path: impl AsRef<Path>, options: GitBackendOptions) -> BackendResult<Self> {
        let original = path.as_ref();
        let canonical = std::fs::canonicalize(original).map_err(|source| BackendError::Io {
            path: original.to_path_buf(),
            source,
        })?;

        let repo = match Repository::discover(&canonical) {
            Ok(repo) => repo,
            Err(err)
                if err.class() == ErrorClass::Repository && err.code() == ErrorCode::NotFound =>
            {
                return Err(BackendError::NotARepository { path: canonical })
            }
            Err(err) => return Err(git_error(&err)),
        };

        let root = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| BackendError::BareRepository {
                path: canonical.clone(),
            })?;

        let cli = GitCli::new(options.binary, &root, options.timeout);
        Ok(Self {
            repo,
            root,
            cli,
            reject_suffix: options.reject_suffix,
        })
    }

    fn find_commit(&self, revision: &str) -> BackendResult<git2::Commit<'_>> {
        self.repo
            .revparse_single(revision)
            .and_then(|object| object.peel_to_commit())
            .map_err(|err| {
                if err.code() == ErrorCode::NotFound {
                    BackendError::UnknownRevision {
                        revision: revision.to_string(),
                    }
                } else {
                    git_error(&err)
                }
            })
    }
}

impl PatchBackend for GitBackend {
    fn summary(&self) -> BackendSummary {
        BackendSummary::new("git", &self.root)
    }

    fn diff(&self, commit: &str) -> BackendResult<String> {
        // Resolve first so an unknown id surfaces as UnknownRevision.
        self.find_commit(commit)?;
        let parent = format!("{commit}~1");
        let output = self.cli.run(
            &[
                "diff",
                "--no-color",
                "--no-ext-diff",
                "--binary",
                "--src-prefix=a/",
                "--dst-prefix=b/",
                "-M",
                "-p",
                &parent,
                commit,
            ],
            None,
        )?;
        Ok(output.stdout)
    }

    fn metadata(&self, commit: &str) -> BackendResult<CommitMetadata> {
        let found = self.find_commit(commit)?;
        let author = found.author();
        let when = author.when();
        let date = FixedOffset::east_opt(when.offset_minutes() * 60).and_then(|offset| {
            DateTime::from_timestamp(when.seconds(), 0).map(|utc| utc.with_timezone(&offset))
        });

        Ok(CommitMetadata {
            id: found.id().to_string(),
            subject: found.summary().unwrap_or_default().to_string(),
            body: found.body().unwrap_or_default().to_string(),
            author_date: date.map(|date| date.to_rfc2822()),
            short_date: date.map(|date| date.format("%Y-%m-%d").to_string()),
        })
    }

    fn head_message(&self) -> BackendResult<Option<String>> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(err)
                if matches!(
                    (err.class(), err.code()),
                    (
                        ErrorClass::Reference,
                        ErrorCode::NotFound | ErrorCode::UnbornBranch
                    )
                ) =>
            {
                return Ok(None)
            }
            Err(err) => return Err(git_error(&err)),
        };

        let commit = head.peel_to_commit().map_err(|err| git_error(&err))?;
        Ok(commit.message().map(str::to_owned))
    }

    fn apply(&self, patch: &str, mode: ApplyMode) -> BackendResult<ApplyStatus> {
        let args: &[&str] = match mode {
            ApplyMode::ThreeWay => &["am", "--3way", "--ignore-whitespace"],
            ApplyMode::Reject => &["am", "--reject", "--no-3way", "--ignore-whitespace"],
        };

        let output = self.cli.status(args, Some(patch))?;
        for line in output.stdout.lines() {
            info!(target: "patchup::git", "{line}");
        }
        let status = ApplyStatus { code: output.code };
        if !status.success() {
            for line in output.stderr.lines() {
                warn!(target: "patchup::git", "{line}");
            }
        }
        Ok(status)
    }

    fn resumable(&self) -> BackendResult<bool> {
        Ok(matches!(
            self.repo.state(),
            RepositoryState::ApplyMailbox
                | RepositoryState::ApplyMailboxOrRebase
                | RepositoryState::Rebase
                | RepositoryState::RebaseInteractive
                | RepositoryState::RebaseMerge
        ))
    }

    fn resume(&self) -> BackendResult<()> {
        self.cli.run(&["add", "-A"], None)?;
        self.cli.run(&["am", "--continue"], None)?;
        Ok(())
    }

    fn rollback(&self) -> BackendResult<()> {
        if self.resumable()? {
            self.cli.run(&["am", "--abort"], None)?;
        } else {
            debug!("no mailbox session to abort");
        }
        self.cli.run(&["reset", "--hard", "HEAD"], None)?;
        Ok(())
    }

    fn discard_changes(&self, path: &Path) -> BackendResult<()> {
        let status = match self.repo.status_file(path) {
            Ok(status) => status,
            Err(err) if err.code() == ErrorCode::NotFound => {
                debug!(path = %path.display(), "nothing to discard");
                return Ok(());
            }
            Err(err) => return Err(git_error(&err)),
        };

        let rendered = path.to_string_lossy();
        if status.contains(Status::CONFLICTED) {
            self.cli
                .run(&["checkout", "HEAD", "--", rendered.as_ref()], None)?;
        } else if status.intersects(Status::WT_MODIFIED | Status::WT_DELETED) {
            self.cli.run(&["restore", "--", rendered.as_ref()], None)?;
        } else {
            debug!(path = %path.display(), "nothing to discard");
        }
        Ok(())
    }

    fn list_reject_artifacts(&self) -> BackendResult<Vec<PathBuf>> {
        let mut artifacts = Vec::new();
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .hidden(false)
            .filter_entry(|entry| entry.file_name() != ".git")
            .build();

        for entry in walker {
            let entry = entry.map_err(|err| BackendError::message(err.to_string()))?;
            let is_file = entry.file_type().is_some_and(|kind| kind.is_file());
            if is_file
                && entry
                    .file_name()
                    .to_string_lossy()
                    .ends_with(&self.reject_suffix)
            {
                artifacts.push(entry.into_path());
            }
        }

        artifacts.sort();
        Ok(artifacts)
    }

    fn ensure_remote(&self, name: &str, url: &str) -> BackendResult<()> {
        match self.repo.find_remote(name) {
            Ok(remote) => {
                let actual = remote.url().unwrap_or_default();
                if actual == url {
                    return Ok(());
                }
                Err(BackendError::RemoteMismatch {
                    name: name.to_string(),
                    expected: url.to_string(),
                    actual: actual.to_string(),
                })
            }
            Err(err) if err.code() == ErrorCode::NotFound => {
                self.repo.remote(name, url).map_err(|err| git_error(&err))?;
                info!(remote = name, url, "added remote");
                Ok(())
            }
            Err(err) => Err(git_error(&err)),
        }
    }

    fn fetch(&self, remote: &str, branch: &str) -> BackendResult<()> {
        self.cli.run_unbounded(&["fetch", remote, branch], None)?;
        info!(remote, branch, "remote up to date");
        Ok(())
    }

    fn list_commits(&self, since: &str, until: &str, path: &str) -> BackendResult<Vec<String>> {
        let range = format!("{since}..{until}");
        let output = self
            .cli
            .run(&["log", "--pretty=format:%H", &range, "--", path], None)?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect())
    }
}

impl fmt::Debug for GitBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitBackend")
            .field("root", &self.root)
            .field("cli", &self.cli)
            .finish_non_exhaustive()
    }
}

fn git_error(err: &git2::Error) -> BackendError {
    BackendError::message(format!("git error: {}", err.message()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{IndexAddOption, Repository as GitRepository};
    use tempfile::TempDir;

    #[test]
    fn open_non_repository_returns_error() {
        let temp = TempDir::new().expect("tempdir");
        let err = GitBackend::open(temp.path(), GitBackendOptions::default());
        assert!(matches!(err, Err(BackendError::NotARepository { .. })));
    }

    #[test]
    fn metadata_reads_subject_and_body() {
        let temp = TempDir::new().expect("tempdir");
        let git_repo = GitRepository::init(temp.path()).expect("init");
        std::fs::write(temp.path().join("README.md"), "hello\n").expect("write");
        let id = stage_and_commit(&git_repo, "Add readme\n\nLonger explanation.\n");

        let backend = GitBackend::open(temp.path(), GitBackendOptions::default()).expect("open");
        let metadata = backend.metadata(&id).expect("metadata");

        assert_eq!(metadata.id, id);
        assert_eq!(metadata.subject, "Add readme");
        assert_eq!(metadata.body.trim(), "Longer explanation.");
        assert!(metadata.author_date.is_some());
        assert_eq!(metadata.short_date.as_deref().map(str::len), Some(10));
    }

    #[test]
    fn unknown_revision_is_reported() {
        let temp = TempDir::new().expect("tempdir");
        GitRepository::init(temp.path()).expect("init");
        let backend = GitBackend::open(temp.path(), GitBackendOptions::default()).expect("open");

        let err = backend
            .metadata("0000000000000000000000000000000000000001")
            .expect_err("missing commit");
        assert!(matches!(err, BackendError::UnknownRevision { .. }));
        assert!(backend.head_message().expect("head").is_none());
    }

    #[test]
    fn reject_artifacts_are_found_outside_git_dir() {
        let temp = TempDir::new().expect("tempdir");
        GitRepository::init(temp.path()).expect("init");
        std::fs::create_dir_all(temp.path().join("src/nested")).expect("mkdir");
        std::fs::write(temp.path().join("src/nested/Foo.java.rej"), "@@").expect("write");
        std::fs::write(temp.path().join(".git/stray.rej"), "@@").expect("write");
        std::fs::write(temp.path().join("src/Foo.java"), "class Foo {}").expect("write");

        let backend = GitBackend::open(temp.path(), GitBackendOptions::default()).expect("open");
        let artifacts = backend.list_reject_artifacts().expect("walk");

        assert_eq!(artifacts.len(), 1);
        assert!(artifacts[0].ends_with("src/nested/Foo.java.rej"));
    }

    #[test]
    fn ensure_remote_adds_then_verifies() {
        let temp = TempDir::new().expect("tempdir");
        GitRepository::init(temp.path()).expect("init");
        let backend = GitBackend::open(temp.path(), GitBackendOptions::default()).expect("open");

        backend
            .ensure_remote("aosp", "https://example.com/upstream.git")
            .expect("add remote");
        backend
            .ensure_remote("aosp", "https://example.com/upstream.git")
            .expect("verify remote");

        let err = backend
            .ensure_remote("aosp", "https://example.com/other.git")
            .expect_err("mismatch");
        assert!(matches!(err, BackendError::RemoteMismatch { .. }));
    }

    fn stage_and_commit(repo: &GitRepository, message: &str) -> String {
        let mut index = repo.index().expect("index");
        index
            .add_all(["*"], IndexAddOption::DEFAULT, None)
            .expect("add");
        index.write().expect("write index");
        let tree_id = index.write_tree().expect("tree");
        let tree = repo.find_tree(tree_id).expect("find tree");
        let signature = git2::Signature::now("Test User", "test@example.com").expect("sig");
        let parents = match repo.head() {
            Ok(head) => vec![head.peel_to_commit().expect("head commit")],
            Err(_) => Vec::new(),
        };
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parent_refs,
        )
        .expect("commit")
        .to_string()
    }
}
