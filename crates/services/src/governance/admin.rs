use std::sync::Arc;

use lms_core::model::{
    Capability, CapabilitySet, LessonId, LessonProgress, LessonProgressState, UserId,
};
use lms_core::unlock::{self, UnlockState};
use storage::repository::{CourseRepository, ProgressRepository, Storage};

use super::engine::flags_of;
use crate::error::GovernanceError;

/// Operator overrides on learner progress: grant, reset, lock.
///
/// Every operation checks the caller's `CapabilitySet` once at entry and
/// writes an audit record via `tracing`. Overrides are last-writer-wins
/// against concurrent learner calls: rare, operator-initiated, and
/// intentionally authoritative.
#[derive(Clone)]
pub struct AdminOverrides {
    courses: Arc<dyn CourseRepository>,
    progress: Arc<dyn ProgressRepository>,
}

impl AdminOverrides {
    #[must_use]
    pub fn new(storage: &Storage) -> Self {
        Self {
            courses: Arc::clone(&storage.courses),
            progress: Arc::clone(&storage.progress),
        }
    }

    /// Raise a learner's pause budget for one lesson by `extra`.
    ///
    /// The spent count is never touched, so an exhausted budget becomes
    /// immediately spendable again without resetting any other progress.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` without `ManageProgress`, `Validation` for a zero
    /// grant, `NotFound` when the learner never started the lesson, and
    /// storage errors.
    pub async fn grant_pause(
        &self,
        actor: &CapabilitySet,
        user: UserId,
        lesson: LessonId,
        extra: u32,
    ) -> Result<LessonProgress, GovernanceError> {
        require(actor, Capability::ManageProgress)?;
        if extra == 0 {
            return Err(GovernanceError::Validation(
                "pause grant must be at least 1".to_string(),
            ));
        }

        let mut row = self
            .progress
            .get(user, lesson)
            .await?
            .ok_or(GovernanceError::NotFound)?;
        row.grant_extra_pauses(extra);
        self.progress.upsert(&row).await?;

        tracing::info!(
            user = user.value(),
            lesson = lesson.value(),
            extra,
            max_pauses = row.max_pauses(),
            "pause budget raised by admin"
        );
        Ok(row)
    }

    /// Roll a learner's lesson back to an untouched state.
    ///
    /// Zeroes the spent pauses, restores the lesson's default budget
    /// (discarding prior grants), clears completion and any admin lock, and
    /// re-derives the row's state from the sequence: `Active` when the
    /// predecessor is complete, `Locked` otherwise.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` without `ManageProgress`, `NotFound` when no row
    /// or lesson exists, and storage errors.
    pub async fn reset_lesson(
        &self,
        actor: &CapabilitySet,
        user: UserId,
        lesson_id: LessonId,
    ) -> Result<LessonProgress, GovernanceError> {
        require(actor, Capability::ManageProgress)?;

        let mut row = self
            .progress
            .get(user, lesson_id)
            .await?
            .ok_or(GovernanceError::NotFound)?;
        let lesson = self.courses.get_lesson(lesson_id).await?;

        // Evaluate the sequence as if this lesson had never been touched.
        let sequence = self.courses.get_sequence(lesson.course_id()).await?;
        let mut rows = self.progress.for_lessons(user, sequence.lessons()).await?;
        rows.remove(&lesson_id);
        let resolution = unlock::resolve(&sequence, &flags_of(&rows));
        let unlocked = resolution.state_of(lesson_id) == Some(UnlockState::Active);

        row.reset(lesson.max_pauses(), unlocked);
        self.progress.upsert(&row).await?;

        tracing::info!(
            user = user.value(),
            lesson = lesson_id.value(),
            state = %row.state(),
            "lesson progress reset by admin"
        );
        Ok(row)
    }

    /// Force a lesson locked for one learner, effective immediately.
    ///
    /// Mid-session rows are interrupted; others go straight to `Locked`. The
    /// lock survives sequence re-evaluation (even over upstream completions)
    /// until an explicit reset. A learner who never started the lesson gets
    /// a locked row created on the spot.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` without `ManageProgress`, `NotFound` for an
    /// unknown lesson, and storage errors.
    pub async fn lock_lesson(
        &self,
        actor: &CapabilitySet,
        user: UserId,
        lesson_id: LessonId,
    ) -> Result<LessonProgress, GovernanceError> {
        require(actor, Capability::ManageProgress)?;
        let lesson = self.courses.get_lesson(lesson_id).await?;

        let row = match self.progress.get(user, lesson_id).await? {
            Some(mut row) => {
                row.admin_lock();
                row
            }
            None => LessonProgress::from_persisted(
                user,
                lesson_id,
                LessonProgressState::Locked,
                0,
                lesson.max_pauses(),
                0,
                0,
                None,
                true,
            )?,
        };
        self.progress.upsert(&row).await?;

        tracing::warn!(
            user = user.value(),
            lesson = lesson_id.value(),
            state = %row.state(),
            "lesson locked by admin"
        );
        Ok(row)
    }
}

fn require(actor: &CapabilitySet, capability: Capability) -> Result<(), GovernanceError> {
    if actor.contains(capability) {
        Ok(())
    } else {
        Err(GovernanceError::Forbidden(capability))
    }
}
