use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::{LessonId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("pause budget exhausted: {used} of {max} used")]
    OverBudget { used: u32, max: u32 },

    #[error("cannot {action} a lesson in state {from}")]
    InvalidTransition {
        from: LessonProgressState,
        action: &'static str,
    },

    #[error("invalid persisted progress: {0}")]
    InvalidPersistedState(String),
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Lifecycle state of a learner's progress on a single lesson.
///
/// `Locked → Active → InProgress ⇄ Paused → {Completed | Interrupted}`
///
/// `Interrupted` is unlock-equivalent to `Completed` but recorded distinctly
/// so reporting can tell a voluntary finish from a forced one (auto-skip or
/// an admin lock mid-session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LessonProgressState {
    Locked,
    Active,
    InProgress,
    Paused,
    Completed,
    Interrupted,
}

impl LessonProgressState {
    /// Stable string form used by storage adapters.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Active => "active",
            Self::InProgress => "in-progress",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
        }
    }

    /// Parse the stable string form.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidPersistedState` for unknown values.
    pub fn parse(value: &str) -> Result<Self, ProgressError> {
        match value {
            "locked" => Ok(Self::Locked),
            "active" => Ok(Self::Active),
            "in-progress" => Ok(Self::InProgress),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "interrupted" => Ok(Self::Interrupted),
            other => Err(ProgressError::InvalidPersistedState(format!(
                "unknown state: {other}"
            ))),
        }
    }

    /// True for states that count as done for sequential unlocking.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Interrupted)
    }

    /// True while the learner has an open playback session.
    #[must_use]
    pub fn is_mid_session(self) -> bool {
        matches!(self, Self::InProgress | Self::Paused)
    }
}

impl fmt::Display for LessonProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── LESSON PROGRESS ───────────────────────────────────────────────────────────
//

/// One learner's progress on one lesson.
///
/// Rows are created lazily on the first granted start, mutated by learner
/// actions and admin overrides, and reset in place rather than deleted.
/// `pauses_used <= max_pauses` holds after every accepted mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonProgress {
    user_id: UserId,
    lesson_id: LessonId,
    state: LessonProgressState,
    pauses_used: u32,
    max_pauses: u32,
    time_spent_seconds: u32,
    last_position_seconds: u32,
    completed_at: Option<DateTime<Utc>>,
    admin_locked: bool,
}

impl LessonProgress {
    /// Create the row for a freshly granted start.
    #[must_use]
    pub fn begin(user_id: UserId, lesson_id: LessonId, max_pauses: u32) -> Self {
        Self {
            user_id,
            lesson_id,
            state: LessonProgressState::InProgress,
            pauses_used: 0,
            max_pauses,
            time_spent_seconds: 0,
            last_position_seconds: 0,
            completed_at: None,
            admin_locked: false,
        }
    }

    /// Rehydrate progress from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidPersistedState` if the pause budget is
    /// over-spent or the completion timestamp disagrees with the state.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        user_id: UserId,
        lesson_id: LessonId,
        state: LessonProgressState,
        pauses_used: u32,
        max_pauses: u32,
        time_spent_seconds: u32,
        last_position_seconds: u32,
        completed_at: Option<DateTime<Utc>>,
        admin_locked: bool,
    ) -> Result<Self, ProgressError> {
        if pauses_used > max_pauses {
            return Err(ProgressError::InvalidPersistedState(format!(
                "pauses_used {pauses_used} exceeds max_pauses {max_pauses}"
            )));
        }
        if state == LessonProgressState::Completed && completed_at.is_none() {
            return Err(ProgressError::InvalidPersistedState(
                "completed state without completed_at".into(),
            ));
        }
        if completed_at.is_some() && !state.is_terminal() {
            return Err(ProgressError::InvalidPersistedState(format!(
                "completed_at set on non-terminal state {state}"
            )));
        }

        Ok(Self {
            user_id,
            lesson_id,
            state,
            pauses_used,
            max_pauses,
            time_spent_seconds,
            last_position_seconds,
            completed_at,
            admin_locked,
        })
    }

    // ─── Learner transitions ───────────────────────────────────────────────

    /// Enter playback. Re-entry from `Paused` or `InProgress` is allowed so a
    /// learner who abandoned a session can pick it up again. A persisted
    /// `Locked` state is only a snapshot of the sequence at last write and
    /// re-admits too; callers gate on the live unlock resolution, which this
    /// row cannot see.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidTransition` from terminal or
    /// admin-locked states.
    pub fn start(&mut self) -> Result<(), ProgressError> {
        if self.admin_locked || self.state.is_terminal() {
            return Err(ProgressError::InvalidTransition {
                from: self.state,
                action: "start",
            });
        }
        self.state = LessonProgressState::InProgress;
        Ok(())
    }

    /// Spend one pause from the budget, moving to `Paused`.
    ///
    /// Returns the number of pauses remaining after this one.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::OverBudget` when the budget is exhausted and
    /// `ProgressError::InvalidTransition` outside of `InProgress`.
    pub fn record_pause(&mut self) -> Result<u32, ProgressError> {
        if self.state != LessonProgressState::InProgress {
            return Err(ProgressError::InvalidTransition {
                from: self.state,
                action: "pause",
            });
        }
        if self.pauses_used >= self.max_pauses {
            return Err(ProgressError::OverBudget {
                used: self.pauses_used,
                max: self.max_pauses,
            });
        }
        self.pauses_used += 1;
        self.state = LessonProgressState::Paused;
        Ok(self.max_pauses - self.pauses_used)
    }

    /// Resume playback from `Paused`. Does not touch the budget.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidTransition` outside of `Paused`.
    pub fn resume(&mut self) -> Result<(), ProgressError> {
        if self.state != LessonProgressState::Paused {
            return Err(ProgressError::InvalidTransition {
                from: self.state,
                action: "resume",
            });
        }
        self.state = LessonProgressState::InProgress;
        Ok(())
    }

    /// Finish the lesson, recording listening stats.
    ///
    /// A voluntary finish lands in `Completed`; a forced one (auto-skip after
    /// budget exhaustion) lands in `Interrupted`. Both count as done for
    /// unlocking.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidTransition` unless mid-session.
    pub fn complete(
        &mut self,
        time_spent_seconds: u32,
        last_position_seconds: u32,
        forced: bool,
        now: DateTime<Utc>,
    ) -> Result<(), ProgressError> {
        if !self.state.is_mid_session() {
            return Err(ProgressError::InvalidTransition {
                from: self.state,
                action: "complete",
            });
        }
        self.state = if forced {
            LessonProgressState::Interrupted
        } else {
            LessonProgressState::Completed
        };
        self.time_spent_seconds = time_spent_seconds;
        self.last_position_seconds = last_position_seconds;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Record a playback position checkpoint without changing state.
    pub fn checkpoint(&mut self, time_spent_seconds: u32, last_position_seconds: u32) {
        self.time_spent_seconds = time_spent_seconds;
        self.last_position_seconds = last_position_seconds;
    }

    // ─── Admin overrides ───────────────────────────────────────────────────

    /// Raise the pause budget by `extra`. Never touches `pauses_used`, so an
    /// exhausted budget becomes immediately spendable again.
    pub fn grant_extra_pauses(&mut self, extra: u32) {
        self.max_pauses = self.max_pauses.saturating_add(extra);
    }

    /// Roll the row back to a fresh state derived from the sequence.
    ///
    /// `unlocked` is what the sequence resolver says about this lesson once
    /// its completion flag is cleared. The admin lock is lifted.
    pub fn reset(&mut self, default_max_pauses: u32, unlocked: bool) {
        self.state = if unlocked {
            LessonProgressState::Active
        } else {
            LessonProgressState::Locked
        };
        self.pauses_used = 0;
        self.max_pauses = default_max_pauses;
        self.time_spent_seconds = 0;
        self.last_position_seconds = 0;
        self.completed_at = None;
        self.admin_locked = false;
    }

    /// Force the lesson shut. Mid-session rows land in `Interrupted` so the
    /// forced exit is visible in reporting; all others land in `Locked`.
    /// The lock survives sequence re-evaluation until an explicit reset.
    pub fn admin_lock(&mut self) {
        self.state = if self.state.is_mid_session() {
            LessonProgressState::Interrupted
        } else {
            LessonProgressState::Locked
        };
        self.admin_locked = true;
    }

    // ─── Accessors ─────────────────────────────────────────────────────────

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn state(&self) -> LessonProgressState {
        self.state
    }

    #[must_use]
    pub fn pauses_used(&self) -> u32 {
        self.pauses_used
    }

    #[must_use]
    pub fn max_pauses(&self) -> u32 {
        self.max_pauses
    }

    #[must_use]
    pub fn pauses_remaining(&self) -> u32 {
        self.max_pauses.saturating_sub(self.pauses_used)
    }

    #[must_use]
    pub fn time_spent_seconds(&self) -> u32 {
        self.time_spent_seconds
    }

    #[must_use]
    pub fn last_position_seconds(&self) -> u32 {
        self.last_position_seconds
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// True when the lesson counts as done for sequential unlocking.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state.is_terminal()
    }

    /// True when the completion was forced rather than voluntary.
    #[must_use]
    pub fn was_forced(&self) -> bool {
        self.state == LessonProgressState::Interrupted
    }

    #[must_use]
    pub fn admin_locked(&self) -> bool {
        self.admin_locked
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
