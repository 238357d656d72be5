//! Pause budget enforcement.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use lms_core::model::{LessonId, LessonProgressState, PlaybackPolicy, UserId};
use storage::repository::ProgressRepository;

use crate::error::{DenialReason, GovernanceError};
use crate::Clock;

/// Result of a learner's pause request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case", tag = "result")]
pub enum PauseOutcome {
    /// The pause was spent; `remaining` is the budget left afterwards.
    Accepted { remaining: u32 },
    /// The budget is exhausted. When the policy enables auto-skip,
    /// `auto_skip_at` is the advisory deadline the client may show; the
    /// server never completes the lesson from this timer alone.
    Denied {
        reason: DenialReason,
        auto_skip_at: Option<DateTime<Utc>>,
    },
}

impl PauseOutcome {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Tracks pauses per (user, lesson) and enforces the budget.
///
/// The increment rides on the repository's conditional update, so concurrent
/// requests can never push the count past the budget.
#[derive(Clone)]
pub struct PauseTracker {
    clock: Clock,
    progress: Arc<dyn ProgressRepository>,
}

impl PauseTracker {
    #[must_use]
    pub fn new(clock: Clock, progress: Arc<dyn ProgressRepository>) -> Self {
        Self { clock, progress }
    }

    /// Spend one pause for a lesson currently in progress.
    ///
    /// An exhausted budget is a denial result, not an error; with auto-skip
    /// enabled it carries the advisory deadline after which the client should
    /// confirm a forced completion.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the learner never started the lesson and
    /// `Conflict` when the row is not in progress (already paused, never
    /// resumed, or terminal).
    pub async fn record_pause(
        &self,
        user: UserId,
        lesson: LessonId,
        policy: &PlaybackPolicy,
    ) -> Result<PauseOutcome, GovernanceError> {
        let attempt = self.progress.record_pause_if_below_limit(user, lesson).await?;

        if attempt.accepted {
            return Ok(PauseOutcome::Accepted {
                remaining: attempt.max_pauses.saturating_sub(attempt.pauses_used),
            });
        }

        if attempt.pauses_used >= attempt.max_pauses
            && attempt.state == LessonProgressState::InProgress
        {
            let auto_skip_at = policy
                .auto_skip_on_max_pauses()
                .then(|| self.clock.now() + policy.auto_skip_delay());
            return Ok(PauseOutcome::Denied {
                reason: DenialReason::PauseBudgetExhausted,
                auto_skip_at,
            });
        }

        Err(GovernanceError::Conflict(format!(
            "cannot pause a lesson in state {}",
            attempt.state
        )))
    }
}
