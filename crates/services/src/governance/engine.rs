use std::collections::HashMap;
use std::sync::Arc;

use lms_core::model::{
    CourseId, LessonId, LessonProgress, PlaybackPolicy, UserId,
};
use lms_core::unlock::{self, LessonFlags, UnlockResolution, UnlockState};
use storage::repository::{CourseRepository, ProgressRepository, Storage};

use crate::access_codes::{AccessCodeManager, CodeVerification};
use crate::attendance::AttendanceGate;
use crate::error::{DenialReason, GovernanceError};
use crate::pauses::{PauseOutcome, PauseTracker};
use crate::Clock;

/// Outcome of a lesson start request.
///
/// A denial is a regular result carrying the failing gate, so the caller can
/// render the exact remediation ("ask the facilitator to mark attendance" vs.
/// "enter the access code") instead of a generic refusal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartDecision {
    Granted(LessonProgress),
    Denied(DenialReason),
}

impl StartDecision {
    #[must_use]
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }

    #[must_use]
    pub fn denial(&self) -> Option<DenialReason> {
        match self {
            Self::Granted(_) => None,
            Self::Denied(reason) => Some(*reason),
        }
    }
}

/// Result of recording a completion: the terminal row, the lesson the
/// completion unlocked (if any), and the refreshed course rollup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub progress: LessonProgress,
    pub next_unlocked: Option<LessonId>,
    pub percent_complete: u8,
}

/// Per-lesson unlock states plus the completion rollup for one learner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseOverview {
    pub resolution: UnlockResolution,
    pub percent_complete: u8,
}

/// Orchestrates the gates into "can lesson X start for user U now" and
/// applies the resulting progress transitions.
///
/// The engine holds no mutable state between calls; every operation is a
/// short read-decide-write against the repositories, safe under concurrent
/// request handlers.
#[derive(Clone)]
pub struct GovernanceEngine {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    progress: Arc<dyn ProgressRepository>,
    access_codes: AccessCodeManager,
    attendance: AttendanceGate,
    pauses: PauseTracker,
}

impl GovernanceEngine {
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage) -> Self {
        Self {
            clock,
            courses: Arc::clone(&storage.courses),
            progress: Arc::clone(&storage.progress),
            access_codes: AccessCodeManager::new(
                clock,
                Arc::clone(&storage.courses),
                Arc::clone(&storage.access_codes),
            ),
            attendance: AttendanceGate::new(Arc::clone(&storage.attendance)),
            pauses: PauseTracker::new(clock, Arc::clone(&storage.progress)),
        }
    }

    /// The code manager sharing this engine's clock and storage.
    #[must_use]
    pub fn access_codes(&self) -> &AccessCodeManager {
        &self.access_codes
    }

    /// Decide whether a lesson may start and, on grant, persist the
    /// in-progress row (created lazily on first start).
    ///
    /// Gates evaluate in order and short-circuit: sequence, then attendance
    /// for onsite courses, then the access code when enforcement is on.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown lesson, `Validation` for an empty
    /// supplied code, `Conflict` when the stored row refuses the transition,
    /// and storage errors.
    pub async fn start_lesson(
        &self,
        user: UserId,
        lesson_id: LessonId,
        supplied_code: Option<&str>,
    ) -> Result<StartDecision, GovernanceError> {
        let lesson = self.courses.get_lesson(lesson_id).await?;
        let sequence = self.courses.get_sequence(lesson.course_id()).await?;
        let rows = self.progress.for_lessons(user, sequence.lessons()).await?;

        let resolution = unlock::resolve(&sequence, &flags_of(&rows));
        match resolution.state_of(lesson_id) {
            Some(UnlockState::Active) => {}
            Some(UnlockState::Locked | UnlockState::Completed) | None => {
                return Ok(StartDecision::Denied(DenialReason::SequenceLocked));
            }
        }

        let course = self.courses.get_course(lesson.course_id()).await?;
        if course.is_onsite() {
            use lms_core::model::AttendanceEligibility as E;
            match self
                .attendance
                .eligibility(course.id(), user, self.clock.today())
                .await?
            {
                E::NoSession => {
                    return Ok(StartDecision::Denied(DenialReason::AttendanceNoSession));
                }
                E::NotMarked => {
                    return Ok(StartDecision::Denied(DenialReason::AttendanceMissing));
                }
                E::Eligible => {}
            }
        }

        if let Some(reason) = self.check_access_code(lesson_id, supplied_code).await? {
            return Ok(StartDecision::Denied(reason));
        }

        let row = match rows.get(&lesson_id) {
            Some(existing) => {
                let mut row = existing.clone();
                row.start()?;
                row
            }
            None => LessonProgress::begin(user, lesson_id, lesson.max_pauses()),
        };
        self.progress.upsert(&row).await?;
        Ok(StartDecision::Granted(row))
    }

    /// Spend one pause, if the budget and state allow it.
    ///
    /// # Errors
    ///
    /// See [`PauseTracker::record_pause`].
    pub async fn pause_lesson(
        &self,
        user: UserId,
        lesson: LessonId,
        policy: &PlaybackPolicy,
    ) -> Result<PauseOutcome, GovernanceError> {
        self.pauses.record_pause(user, lesson, policy).await
    }

    /// Resume a paused lesson.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no row exists and `Conflict` when the row is
    /// not paused.
    pub async fn resume_lesson(
        &self,
        user: UserId,
        lesson: LessonId,
    ) -> Result<LessonProgress, GovernanceError> {
        let mut row = self
            .progress
            .get(user, lesson)
            .await?
            .ok_or(GovernanceError::NotFound)?;
        row.resume()?;
        self.progress.upsert(&row).await?;
        Ok(row)
    }

    /// Save playback position mid-session without changing state.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no row exists and storage errors.
    pub async fn record_checkpoint(
        &self,
        user: UserId,
        lesson: LessonId,
        time_spent_seconds: u32,
        last_position_seconds: u32,
    ) -> Result<(), GovernanceError> {
        let mut row = self
            .progress
            .get(user, lesson)
            .await?
            .ok_or(GovernanceError::NotFound)?;
        row.checkpoint(time_spent_seconds, last_position_seconds);
        self.progress.upsert(&row).await?;
        Ok(())
    }

    /// Record a completion and recompute what it unlocks.
    ///
    /// `forced` marks an auto-skip confirmation and is re-validated here:
    /// it is only honored when the stored budget is actually exhausted and
    /// the policy enables auto-skip. Client elapsed time is never trusted.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the lesson was never started, `Validation`
    /// for a forced completion the stored state does not justify, `Conflict`
    /// when the row is admin-locked or not mid-session, and storage errors.
    pub async fn complete_lesson(
        &self,
        user: UserId,
        lesson_id: LessonId,
        time_spent_seconds: u32,
        last_position_seconds: u32,
        forced: bool,
        policy: &PlaybackPolicy,
    ) -> Result<CompletionOutcome, GovernanceError> {
        let mut row = self
            .progress
            .get(user, lesson_id)
            .await?
            .ok_or(GovernanceError::NotFound)?;

        if row.admin_locked() {
            return Err(GovernanceError::Conflict(
                "lesson is locked by an administrator".to_string(),
            ));
        }
        if forced {
            let exhausted = row.pauses_used() >= row.max_pauses();
            if !exhausted || !policy.auto_skip_on_max_pauses() {
                return Err(GovernanceError::Validation(
                    "forced completion requires an exhausted pause budget under an auto-skip policy"
                        .to_string(),
                ));
            }
        }

        row.complete(
            time_spent_seconds,
            last_position_seconds,
            forced,
            self.clock.now(),
        )?;
        self.progress.upsert(&row).await?;

        if forced {
            tracing::info!(
                user = user.value(),
                lesson = lesson_id.value(),
                "forced completion recorded after pause budget exhaustion"
            );
        }

        let lesson = self.courses.get_lesson(lesson_id).await?;
        let sequence = self.courses.get_sequence(lesson.course_id()).await?;
        let rows = self.progress.for_lessons(user, sequence.lessons()).await?;
        let resolution = unlock::resolve(&sequence, &flags_of(&rows));

        let next_unlocked = sequence
            .next_after(lesson_id)
            .filter(|next| resolution.state_of(*next) == Some(UnlockState::Active));

        Ok(CompletionOutcome {
            progress: row,
            next_unlocked,
            percent_complete: percent(resolution.completed_count(), sequence.len()),
        })
    }

    /// Unlock states and completion rollup for a whole course.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown course and storage errors.
    pub async fn course_overview(
        &self,
        user: UserId,
        course: CourseId,
    ) -> Result<CourseOverview, GovernanceError> {
        let sequence = self.courses.get_sequence(course).await?;
        let rows = self.progress.for_lessons(user, sequence.lessons()).await?;
        let resolution = unlock::resolve(&sequence, &flags_of(&rows));
        let percent_complete = percent(resolution.completed_count(), sequence.len());
        Ok(CourseOverview {
            resolution,
            percent_complete,
        })
    }

    async fn check_access_code(
        &self,
        lesson: LessonId,
        supplied: Option<&str>,
    ) -> Result<Option<DenialReason>, GovernanceError> {
        let state = self.access_codes.state_of(lesson).await?;
        if !state.enabled() {
            return Ok(None);
        }

        let Some(supplied) = supplied else {
            return Ok(Some(DenialReason::AccessCodeRequired));
        };

        let reason = match self.access_codes.verify(lesson, supplied).await? {
            CodeVerification::Valid => None,
            CodeVerification::Expired => Some(DenialReason::AccessCodeExpired),
            CodeVerification::Incorrect => Some(DenialReason::AccessCodeIncorrect),
            CodeVerification::NotConfigured => Some(DenialReason::AccessCodeRequired),
        };
        Ok(reason)
    }
}

pub(crate) fn flags_of(
    rows: &HashMap<LessonId, LessonProgress>,
) -> HashMap<LessonId, LessonFlags> {
    rows.iter()
        .map(|(id, row)| {
            (
                *id,
                LessonFlags {
                    completed: row.state().is_terminal(),
                    admin_locked: row.admin_locked(),
                },
            )
        })
        .collect()
}

pub(crate) fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    u8::try_from(completed * 100 / total).unwrap_or(100)
}
