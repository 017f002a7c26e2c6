//! Apply/recover state machine.
//!
//! [`transition`] is a pure function over the table below; [`ApplyEngine`]
//! feeds it events and performs the effects it returns against a
//! [`PatchBackend`].
//!
//! A failed reject-mode apply always prompts: it leaves reject files behind
//! even when there is no session to resume.
//!
//! | state | event | next | effects |
//! |-------|-------|------|---------|
//! | `Idle` | `Begin(m)` | `Attempting(m)` | `Apply(m)` |
//! | `Attempting(m)` | success | `Applied(m)` | |
//! | `Attempting(ThreeWay)` | failure, resumable | `ConflictPending` | `Prompt` |
//! | `Attempting(ThreeWay)` | failure, not resumable | `Failed` | |
//! | `Attempting(Reject)` | failure | `ConflictPending` | `Prompt` |
//! | `ConflictPending(ThreeWay)` | `Continue` | `Resumed` | `DiscardLockArtifact`, `Resume` |
//! | `ConflictPending(ThreeWay)` | `Abort` | `Aborted` | `Rollback` |
//! | `ConflictPending(Reject)` | `Continue` | `Resumed` | `PurgeRejects`, `DiscardLockArtifact`, `Resume` |
//! | `ConflictPending(Reject)` | `Abort` | `Aborted` | `PurgeRejects`, `Rollback` |

use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

use patchup_api::{ApplyAttempt, ApplyMode, Resolution};
use patchup_backend_api::{OperatorPrompt, PatchBackend};
use tracing::{debug, info, warn};

use crate::{display_path, Error, Result};

/// Where one apply run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyState {
    /// Nothing has happened yet.
    Idle,
    /// The backend is applying the patch.
    Attempting(ApplyMode),
    /// A partial apply is waiting for the operator.
    ConflictPending(ApplyMode),
    /// The patch applied cleanly.
    Applied(ApplyMode),
    /// The operator fixed conflicts and the apply was finalized.
    Resumed(ApplyMode),
    /// The operator abandoned the attempt and the tree was restored.
    Aborted(ApplyMode),
    /// The apply failed without anything to resume.
    Failed(ApplyMode),
}

impl ApplyState {
    /// Whether no further event is accepted.
    const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Applied(_) | Self::Resumed(_) | Self::Aborted(_) | Self::Failed(_)
        )
    }

    /// Whether the run ended with the patch in the tree.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Applied(_) | Self::Resumed(_))
    }
}

impl fmt::Display for ApplyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Attempting(mode) => write!(f, "attempting({mode})"),
            Self::ConflictPending(mode) => write!(f, "conflict-pending({mode})"),
            Self::Applied(mode) => write!(f, "applied({mode})"),
            Self::Resumed(mode) => write!(f, "resumed({mode})"),
            Self::Aborted(mode) => write!(f, "aborted({mode})"),
            Self::Failed(mode) => write!(f, "failed({mode})"),
        }
    }
}

/// Input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyEvent {
    /// Start applying in the given mode.
    Begin(ApplyMode),
    /// The backend reported the outcome of an apply.
    Attempted(ApplyAttempt),
    /// The operator answered the conflict prompt.
    Chose(Resolution),
}

impl fmt::Display for ApplyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Begin(mode) => write!(f, "begin({mode})"),
            Self::Attempted(attempt) => write!(
                f,
                "attempted({}, success={}, resumable={})",
                attempt.mode, attempt.success, attempt.resumable
            ),
            Self::Chose(Resolution::Continue) => f.write_str("chose(continue)"),
            Self::Chose(Resolution::Abort) => f.write_str("chose(abort)"),
        }
    }
}

/// Side effect requested by a transition, performed in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Hand the patch to the backend.
    Apply(ApplyMode),
    /// Ask the operator how to proceed.
    Prompt(ApplyMode),
    /// Delete every reject artifact in the working tree.
    PurgeRejects,
    /// Drop local changes to the generated lock file.
    DiscardLockArtifact,
    /// Stage the tree and finalize the partial apply.
    Resume,
    /// Abandon the partial apply and reset the tree.
    Rollback,
}

/// Result of one [`transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State after the event.
    pub next: ApplyState,
    /// Effects to perform, in order.
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: ApplyState, effects: impl Into<Vec<Effect>>) -> Self {
        Self {
            next,
            effects: effects.into(),
        }
    }
}

/// Compute the next state and effects for `event` in `state`.
///
/// # Errors
///
/// Returns [`Error::InvalidTransition`] for any pair not in the module's
/// transition table, including attempts whose mode differs from the one
/// being attempted.
pub fn transition(state: ApplyState, event: ApplyEvent) -> Result<Transition> {
    use ApplyState::{Aborted, Applied, Attempting, ConflictPending, Failed, Idle, Resumed};

    let next = match (state, event) {
        (Idle, ApplyEvent::Begin(mode)) => Transition::to(Attempting(mode), [Effect::Apply(mode)]),
        (Attempting(mode), ApplyEvent::Attempted(attempt)) if attempt.mode == mode => {
            if attempt.success {
                Transition::to(Applied(mode), Vec::new())
            } else if attempt.resumable || mode == ApplyMode::Reject {
                Transition::to(ConflictPending(mode), [Effect::Prompt(mode)])
            } else {
                Transition::to(Failed(mode), Vec::new())
            }
        }
        (ConflictPending(mode), ApplyEvent::Chose(Resolution::Continue)) => match mode {
            ApplyMode::ThreeWay => Transition::to(
                Resumed(mode),
                [Effect::DiscardLockArtifact, Effect::Resume],
            ),
            ApplyMode::Reject => Transition::to(
                Resumed(mode),
                [
                    Effect::PurgeRejects,
                    Effect::DiscardLockArtifact,
                    Effect::Resume,
                ],
            ),
        },
        (ConflictPending(mode), ApplyEvent::Chose(Resolution::Abort)) => match mode {
            ApplyMode::ThreeWay => Transition::to(Aborted(mode), [Effect::Rollback]),
            ApplyMode::Reject => {
                Transition::to(Aborted(mode), [Effect::PurgeRejects, Effect::Rollback])
            }
        },
        _ => {
            return Err(Error::InvalidTransition {
                state: state.to_string(),
                event: event.to_string(),
            })
        }
    };
    Ok(next)
}

/// Both renderings of one upstream commit, ready to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedPatch {
    /// Upstream commit id.
    pub commit: String,
    /// Patch text for [`ApplyMode::ThreeWay`].
    pub three_way: String,
    /// Patch text for [`ApplyMode::Reject`].
    pub reject: String,
}

impl PreparedPatch {
    /// Patch text for `mode`.
    #[must_use]
    pub fn text(&self, mode: ApplyMode) -> &str {
        match mode {
            ApplyMode::ThreeWay => &self.three_way,
            ApplyMode::Reject => &self.reject,
        }
    }
}

/// Drives [`transition`] against a backend and an operator prompt.
pub struct ApplyEngine<'a> {
    backend: &'a dyn PatchBackend,
    prompt: &'a dyn OperatorPrompt,
    lock_file: Option<PathBuf>,
}

impl<'a> ApplyEngine<'a> {
    /// Create an engine without a lock file to discard on resume.
    #[must_use]
    pub fn new(backend: &'a dyn PatchBackend, prompt: &'a dyn OperatorPrompt) -> Self {
        Self {
            backend,
            prompt,
            lock_file: None,
        }
    }

    /// Discard local changes to `path` (relative to the work tree) before
    /// resuming a partial apply.
    #[must_use]
    pub fn with_lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file = Some(path.into());
        self
    }

    /// Apply `patch` in one mode and handle any conflict interactively.
    /// Returns the terminal state reached.
    ///
    /// # Errors
    ///
    /// Propagates backend, prompt and filesystem failures, and
    /// [`Error::InvalidTransition`] should the machine be fed an event it
    /// does not accept.
    pub fn run(&self, mode: ApplyMode, patch: &str) -> Result<ApplyState> {
        let mut state = ApplyState::Idle;
        let mut pending = VecDeque::from([ApplyEvent::Begin(mode)]);

        while !state.is_terminal() {
            let Some(event) = pending.pop_front() else {
                return Err(Error::InvalidTransition {
                    state: state.to_string(),
                    event: "end of input".into(),
                });
            };
            let Transition { next, effects } = transition(state, event)?;
            debug!(from = %state, to = %next, %event, "apply transition");
            state = next;
            for effect in effects {
                pending.extend(self.perform(effect, patch)?);
            }
        }

        info!(state = %state, "apply finished");
        Ok(state)
    }

    /// Try three-way first and fall back to reject mode when that attempt
    /// failed or was aborted. Returns whether the patch ended up applied.
    ///
    /// # Errors
    ///
    /// Same as [`ApplyEngine::run`].
    pub fn try_apply(&self, patch: &PreparedPatch) -> Result<bool> {
        let first = self.run(ApplyMode::ThreeWay, patch.text(ApplyMode::ThreeWay))?;
        if first.is_success() {
            return Ok(true);
        }

        warn!(
            commit = %patch.commit,
            state = %first,
            "three-way apply did not succeed, retrying with reject files"
        );
        let second = self.run(ApplyMode::Reject, patch.text(ApplyMode::Reject))?;
        Ok(second.is_success())
    }

    fn perform(&self, effect: Effect, patch: &str) -> Result<Option<ApplyEvent>> {
        match effect {
            Effect::Apply(mode) => {
                let status = self.backend.apply(patch, mode)?;
                let attempt = if status.success() {
                    ApplyAttempt::applied(mode)
                } else {
                    ApplyAttempt::failed(mode, self.backend.resumable()?)
                };
                Ok(Some(ApplyEvent::Attempted(attempt)))
            }
            Effect::Prompt(mode) => {
                let title = format!("{mode} apply stopped with conflicts");
                let resolution = self.prompt.choose(mode, &title)?;
                Ok(Some(ApplyEvent::Chose(resolution)))
            }
            Effect::PurgeRejects => {
                self.purge_rejects()?;
                Ok(None)
            }
            Effect::DiscardLockArtifact => {
                if let Some(lock) = &self.lock_file {
                    self.backend.discard_changes(lock)?;
                }
                Ok(None)
            }
            Effect::Resume => {
                self.backend.resume()?;
                Ok(None)
            }
            Effect::Rollback => {
                self.backend.rollback()?;
                Ok(None)
            }
        }
    }

    fn purge_rejects(&self) -> Result<()> {
        for path in self.backend.list_reject_artifacts()? {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed reject file"),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(Error::Io {
                        path: display_path(&path),
                        source,
                    })
                }
            }
        }
        Ok(())
    }
}
