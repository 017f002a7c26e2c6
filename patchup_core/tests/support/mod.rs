#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use patchup_core::{
    ApplyMode, ApplyStatus, BackendError, CommitMetadata, OperatorPrompt, PatchBackend, Resolution,
};
use patchup_backend_api::{BackendResult, BackendSummary};

/// What one scripted `apply` call does.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub code: i32,
    pub resumable: bool,
    pub rejects: Vec<&'static str>,
}

impl Outcome {
    pub fn clean() -> Self {
        Self {
            code: 0,
            resumable: false,
            rejects: Vec::new(),
        }
    }

    pub fn conflict() -> Self {
        Self {
            code: 128,
            resumable: true,
            rejects: Vec::new(),
        }
    }

    pub fn hard_failure() -> Self {
        Self {
            code: 128,
            resumable: false,
            rejects: Vec::new(),
        }
    }

    pub fn with_rejects(mut self, rejects: &[&'static str]) -> Self {
        self.rejects = rejects.to_vec();
        self
    }
}

/// In-memory backend that records every call it receives.
pub struct FakeBackend {
    pub root: PathBuf,
    outcomes: RefCell<VecDeque<Outcome>>,
    pub calls: RefCell<Vec<String>>,
    pub applied: RefCell<Vec<(ApplyMode, String)>>,
    in_progress: Cell<bool>,
    head: RefCell<Option<String>>,
    commits: HashMap<String, (CommitMetadata, String)>,
    history: Vec<String>,
}

impl FakeBackend {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            outcomes: RefCell::new(VecDeque::new()),
            calls: RefCell::new(Vec::new()),
            applied: RefCell::new(Vec::new()),
            in_progress: Cell::new(false),
            head: RefCell::new(Some("Initial import".into())),
            commits: HashMap::new(),
            history: Vec::new(),
        }
    }

    pub fn with_outcomes(self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.outcomes.borrow_mut().extend(outcomes);
        self
    }

    /// Register an upstream commit; later calls are newer in history.
    pub fn with_commit(mut self, metadata: CommitMetadata, diff: &str) -> Self {
        self.history.insert(0, metadata.id.clone());
        self.commits
            .insert(metadata.id.clone(), (metadata, diff.to_owned()));
        self
    }

    pub fn with_head_message(self, message: &str) -> Self {
        *self.head.borrow_mut() = Some(message.to_owned());
        self
    }

    pub fn set_in_progress(&self, value: bool) {
        self.in_progress.set(value);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.borrow_mut().push(call.into());
    }

    fn lookup(&self, commit: &str) -> BackendResult<&(CommitMetadata, String)> {
        self.commits
            .get(commit)
            .ok_or_else(|| BackendError::UnknownRevision {
                revision: commit.to_owned(),
            })
    }
}

impl PatchBackend for FakeBackend {
    fn summary(&self) -> BackendSummary {
        BackendSummary::new("fake", &self.root)
    }

    fn diff(&self, commit: &str) -> BackendResult<String> {
        Ok(self.lookup(commit)?.1.clone())
    }

    fn metadata(&self, commit: &str) -> BackendResult<CommitMetadata> {
        Ok(self.lookup(commit)?.0.clone())
    }

    fn head_message(&self) -> BackendResult<Option<String>> {
        Ok(self.head.borrow().clone())
    }

    fn apply(&self, patch: &str, mode: ApplyMode) -> BackendResult<ApplyStatus> {
        self.record(format!("apply:{mode}"));
        self.applied.borrow_mut().push((mode, patch.to_owned()));
        let outcome = self
            .outcomes
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| BackendError::message("no scripted apply outcome left"))?;

        for reject in &outcome.rejects {
            let path = self.root.join(reject);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("create reject dir");
            }
            fs::write(&path, "@@ -1 +1 @@\n-old\n+new\n").expect("write reject");
        }
        self.in_progress.set(outcome.resumable);
        if outcome.code == 0 {
            *self.head.borrow_mut() = Some(patch.to_owned());
        }
        Ok(ApplyStatus::from_code(outcome.code))
    }

    fn resumable(&self) -> BackendResult<bool> {
        Ok(self.in_progress.get())
    }

    fn resume(&self) -> BackendResult<()> {
        self.record("resume");
        self.in_progress.set(false);
        let last = self.applied.borrow().last().map(|(_, patch)| patch.clone());
        *self.head.borrow_mut() = last;
        Ok(())
    }

    fn rollback(&self) -> BackendResult<()> {
        self.record("rollback");
        self.in_progress.set(false);
        Ok(())
    }

    fn discard_changes(&self, path: &Path) -> BackendResult<()> {
        self.record(format!("discard:{}", path.display()));
        Ok(())
    }

    fn list_reject_artifacts(&self) -> BackendResult<Vec<PathBuf>> {
        self.record("list_rejects");
        Ok(reject_files(&self.root))
    }

    fn ensure_remote(&self, name: &str, url: &str) -> BackendResult<()> {
        self.record(format!("ensure_remote:{name}:{url}"));
        Ok(())
    }

    fn fetch(&self, remote: &str, branch: &str) -> BackendResult<()> {
        self.record(format!("fetch:{remote}:{branch}"));
        Ok(())
    }

    fn list_commits(&self, since: &str, until: &str, path: &str) -> BackendResult<Vec<String>> {
        self.record(format!("log:{since}..{until}:{path}"));
        Ok(self.history.clone())
    }
}

/// Prompt that answers from a fixed script and records each question.
#[derive(Default)]
pub struct ScriptedPrompt {
    answers: RefCell<VecDeque<Resolution>>,
    pub asked: RefCell<Vec<ApplyMode>>,
}

impl ScriptedPrompt {
    pub fn new(answers: impl IntoIterator<Item = Resolution>) -> Self {
        Self {
            answers: RefCell::new(answers.into_iter().collect()),
            asked: RefCell::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<ApplyMode> {
        self.asked.borrow().clone()
    }
}

impl OperatorPrompt for ScriptedPrompt {
    fn choose(&self, mode: ApplyMode, _title: &str) -> BackendResult<Resolution> {
        self.asked.borrow_mut().push(mode);
        self.answers
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| BackendError::Prompt {
                message: "no scripted answer left".into(),
            })
    }
}

pub fn reject_files(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).expect("read dir") {
            let path = entry.expect("dir entry").path();
            if path.is_dir() {
                if path.file_name().is_some_and(|name| name != ".git") {
                    pending.push(path);
                }
            } else if path.extension().is_some_and(|ext| ext == "rej") {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}

pub const UPSTREAM_ID: &str = "5d41402abc4b2a76b9719d911017c592aaaaaaaa";

/// Upstream diff touching the subtree and one file outside it.
pub const UPSTREAM_DIFF: &str = "\
diff --git a/aswb/src/Foo.java b/aswb/src/Foo.java
index 3b18e51..a042389 100644
--- a/aswb/src/Foo.java
+++ b/aswb/src/Foo.java
@@ -1,3 +1,3 @@
 class Foo {
-  int x = 1;
+  int x = 2;
 }
diff --git a/other/Bar.java b/other/Bar.java
index 1111111..2222222 100644
--- a/other/Bar.java
+++ b/other/Bar.java
@@ -1 +1 @@
-class Bar {}
+class Bar { }
";

pub fn upstream_metadata() -> CommitMetadata {
    CommitMetadata::new(UPSTREAM_ID, "Bump Foo.x").with_body("Needed for sync.\n")
}
