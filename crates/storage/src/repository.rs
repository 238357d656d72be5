use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use lms_core::model::{
    AccessCode, AccessCodeState, AttendanceRecord, Course, CourseId, CourseSequence, Lesson,
    LessonId, LessonProgress, LessonProgressState, ProgressError, SessionId, UserId,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<ProgressError> for StorageError {
    fn from(err: ProgressError) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result of the atomic conditional pause increment.
///
/// `accepted == false` with an existing row means the condition failed:
/// either the budget is exhausted or the row is not mid-playback. The caller
/// inspects `state` and the counters to pick the right response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseAttempt {
    pub accepted: bool,
    pub pauses_used: u32,
    pub max_pauses: u32,
    pub state: LessonProgressState,
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

/// Courses, lessons, and the derived lesson ordering.
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// Fetch course metadata.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_course(&self, id: CourseId) -> Result<Course, StorageError>;

    /// Fetch lesson metadata.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_lesson(&self, id: LessonId) -> Result<Lesson, StorageError>;

    /// The ordered lesson list of a course. Empty courses yield an empty
    /// sequence, not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the course is missing.
    async fn get_sequence(&self, course_id: CourseId) -> Result<CourseSequence, StorageError>;

    /// Persist or update a course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the course cannot be stored.
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError>;

    /// Persist or update a lesson.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lesson cannot be stored.
    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError>;
}

/// Per-(user, lesson) progress rows.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch one progress row, if it exists.
    ///
    /// # Errors
    ///
    /// Returns storage errors; a missing row is `Ok(None)`.
    async fn get(
        &self,
        user: UserId,
        lesson: LessonId,
    ) -> Result<Option<LessonProgress>, StorageError>;

    /// Fetch progress rows for the given lessons, keyed by lesson.
    /// Lessons without a row are simply absent from the map.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    async fn for_lessons(
        &self,
        user: UserId,
        lessons: &[LessonId],
    ) -> Result<HashMap<LessonId, LessonProgress>, StorageError>;

    /// Persist or update a progress row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn upsert(&self, progress: &LessonProgress) -> Result<(), StorageError>;

    /// Atomically spend one pause: increment `pauses_used` and move to
    /// `Paused` only while the row is `InProgress` with budget remaining.
    ///
    /// This is the single guard against the lost-update race of concurrent
    /// pause requests; callers must never read-modify-write the counter.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no row exists.
    async fn record_pause_if_below_limit(
        &self,
        user: UserId,
        lesson: LessonId,
    ) -> Result<PauseAttempt, StorageError>;
}

/// The single access code (and enforcement flag) a lesson may carry.
#[async_trait]
pub trait AccessCodeRepository: Send + Sync {
    /// The lesson's enforcement flag plus stored code. Lessons with no row
    /// yield the default (disabled, no code).
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    async fn get_state(&self, lesson: LessonId) -> Result<AccessCodeState, StorageError>;

    /// Replace the lesson's code and enable enforcement.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the code cannot be stored.
    async fn put_code(&self, code: &AccessCode) -> Result<(), StorageError>;

    /// Flip enforcement without touching the stored code.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    async fn set_enabled(&self, lesson: LessonId, enabled: bool) -> Result<(), StorageError>;

    /// Delete the stored code, keeping the enforcement flag. While
    /// enforcement stays on, verification then fails closed.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    async fn clear_code(&self, lesson: LessonId) -> Result<(), StorageError>;
}

/// Onsite class sessions and their attendance rosters.
#[async_trait]
pub trait AttendanceRepository: Send + Sync {
    /// The session scheduled for a course on the given date, if any.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    async fn today_session(
        &self,
        course: CourseId,
        on: NaiveDate,
    ) -> Result<Option<SessionId>, StorageError>;

    /// One learner's roster row for a session, if present on the roster.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    async fn get_attendance(
        &self,
        session: SessionId,
        user: UserId,
    ) -> Result<Option<AttendanceRecord>, StorageError>;

    /// Schedule a session for a course on a date.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    async fn add_session(
        &self,
        session: SessionId,
        course: CourseId,
        on: NaiveDate,
    ) -> Result<(), StorageError>;

    /// Persist or update a roster row.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    async fn put_attendance(&self, record: &AttendanceRecord) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY ADAPTER ─────────────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    courses: Arc<Mutex<HashMap<CourseId, Course>>>,
    lessons: Arc<Mutex<HashMap<LessonId, Lesson>>>,
    progress: Arc<Mutex<HashMap<(UserId, LessonId), LessonProgress>>>,
    codes: Arc<Mutex<HashMap<LessonId, AccessCodeState>>>,
    sessions: Arc<Mutex<HashMap<SessionId, (CourseId, NaiveDate)>>>,
    attendance: Arc<Mutex<HashMap<(SessionId, UserId), AttendanceRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(e: impl std::fmt::Display) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl CourseRepository for InMemoryRepository {
    async fn get_course(&self, id: CourseId) -> Result<Course, StorageError> {
        let guard = self.courses.lock().map_err(poisoned)?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Lesson, StorageError> {
        let guard = self.lessons.lock().map_err(poisoned)?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn get_sequence(&self, course_id: CourseId) -> Result<CourseSequence, StorageError> {
        {
            let guard = self.courses.lock().map_err(poisoned)?;
            if !guard.contains_key(&course_id) {
                return Err(StorageError::NotFound);
            }
        }
        let guard = self.lessons.lock().map_err(poisoned)?;
        let mut lessons: Vec<&Lesson> = guard
            .values()
            .filter(|l| l.course_id() == course_id)
            .collect();
        lessons.sort_by_key(|l| (l.order_index(), l.id()));
        let ids = lessons.iter().map(|l| l.id()).collect();
        CourseSequence::new(course_id, ids)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        let mut guard = self.courses.lock().map_err(poisoned)?;
        guard.insert(course.id(), course.clone());
        Ok(())
    }

    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        let mut guard = self.lessons.lock().map_err(poisoned)?;
        guard.insert(lesson.id(), lesson.clone());
        Ok(())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get(
        &self,
        user: UserId,
        lesson: LessonId,
    ) -> Result<Option<LessonProgress>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(guard.get(&(user, lesson)).cloned())
    }

    async fn for_lessons(
        &self,
        user: UserId,
        lessons: &[LessonId],
    ) -> Result<HashMap<LessonId, LessonProgress>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        let mut out = HashMap::with_capacity(lessons.len());
        for id in lessons {
            if let Some(row) = guard.get(&(user, *id)) {
                out.insert(*id, row.clone());
            }
        }
        Ok(out)
    }

    async fn upsert(&self, progress: &LessonProgress) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        guard.insert(
            (progress.user_id(), progress.lesson_id()),
            progress.clone(),
        );
        Ok(())
    }

    async fn record_pause_if_below_limit(
        &self,
        user: UserId,
        lesson: LessonId,
    ) -> Result<PauseAttempt, StorageError> {
        // The whole check-and-increment happens under one lock, matching the
        // conditional UPDATE the sqlite adapter issues.
        let mut guard = self.progress.lock().map_err(poisoned)?;
        let row = guard.get_mut(&(user, lesson)).ok_or(StorageError::NotFound)?;

        let accepted = row.state() == LessonProgressState::InProgress
            && row.pauses_used() < row.max_pauses();
        if accepted {
            row.record_pause()?;
        }

        Ok(PauseAttempt {
            accepted,
            pauses_used: row.pauses_used(),
            max_pauses: row.max_pauses(),
            state: row.state(),
        })
    }
}

#[async_trait]
impl AccessCodeRepository for InMemoryRepository {
    async fn get_state(&self, lesson: LessonId) -> Result<AccessCodeState, StorageError> {
        let guard = self.codes.lock().map_err(poisoned)?;
        Ok(guard.get(&lesson).cloned().unwrap_or_default())
    }

    async fn put_code(&self, code: &AccessCode) -> Result<(), StorageError> {
        let mut guard = self.codes.lock().map_err(poisoned)?;
        guard.insert(
            code.lesson_id(),
            AccessCodeState::new(true, Some(code.clone())),
        );
        Ok(())
    }

    async fn set_enabled(&self, lesson: LessonId, enabled: bool) -> Result<(), StorageError> {
        let mut guard = self.codes.lock().map_err(poisoned)?;
        let current = guard.remove(&lesson).unwrap_or_default();
        guard.insert(
            lesson,
            AccessCodeState::new(enabled, current.code().cloned()),
        );
        Ok(())
    }

    async fn clear_code(&self, lesson: LessonId) -> Result<(), StorageError> {
        let mut guard = self.codes.lock().map_err(poisoned)?;
        let current = guard.remove(&lesson).unwrap_or_default();
        guard.insert(lesson, AccessCodeState::new(current.enabled(), None));
        Ok(())
    }
}

#[async_trait]
impl AttendanceRepository for InMemoryRepository {
    async fn today_session(
        &self,
        course: CourseId,
        on: NaiveDate,
    ) -> Result<Option<SessionId>, StorageError> {
        let guard = self.sessions.lock().map_err(poisoned)?;
        Ok(guard
            .iter()
            .find(|(_, (c, date))| *c == course && *date == on)
            .map(|(id, _)| *id))
    }

    async fn get_attendance(
        &self,
        session: SessionId,
        user: UserId,
    ) -> Result<Option<AttendanceRecord>, StorageError> {
        let guard = self.attendance.lock().map_err(poisoned)?;
        Ok(guard.get(&(session, user)).cloned())
    }

    async fn add_session(
        &self,
        session: SessionId,
        course: CourseId,
        on: NaiveDate,
    ) -> Result<(), StorageError> {
        let mut guard = self.sessions.lock().map_err(poisoned)?;
        guard.insert(session, (course, on));
        Ok(())
    }

    async fn put_attendance(&self, record: &AttendanceRecord) -> Result<(), StorageError> {
        let mut guard = self.attendance.lock().map_err(poisoned)?;
        guard.insert((record.session_id(), record.user_id()), record.clone());
        Ok(())
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates the four repositories behind trait objects for easy backend
/// swapping.
#[derive(Clone)]
pub struct Storage {
    pub courses: Arc<dyn CourseRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub access_codes: Arc<dyn AccessCodeRepository>,
    pub attendance: Arc<dyn AttendanceRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let courses: Arc<dyn CourseRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let access_codes: Arc<dyn AccessCodeRepository> = Arc::new(repo.clone());
        let attendance: Arc<dyn AttendanceRepository> = Arc::new(repo);
        Self {
            courses,
            progress,
            access_codes,
            attendance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_core::model::CourseDelivery;
    use lms_core::time::fixed_now;

    fn build_course(id: u64) -> Course {
        Course::new(CourseId::new(id), CourseDelivery::Remote)
    }

    fn build_lesson(id: u64, course: u64, order: u32) -> Lesson {
        Lesson::new(LessonId::new(id), CourseId::new(course), order, 3)
    }

    #[tokio::test]
    async fn sequence_orders_lessons_by_index() {
        let repo = InMemoryRepository::new();
        repo.upsert_course(&build_course(1)).await.unwrap();
        repo.upsert_lesson(&build_lesson(11, 1, 2)).await.unwrap();
        repo.upsert_lesson(&build_lesson(10, 1, 0)).await.unwrap();
        repo.upsert_lesson(&build_lesson(12, 1, 1)).await.unwrap();
        // a lesson from a different course must not leak in
        repo.upsert_course(&build_course(2)).await.unwrap();
        repo.upsert_lesson(&build_lesson(20, 2, 0)).await.unwrap();

        let seq = repo.get_sequence(CourseId::new(1)).await.unwrap();
        assert_eq!(
            seq.lessons(),
            &[LessonId::new(10), LessonId::new(12), LessonId::new(11)]
        );
    }

    #[tokio::test]
    async fn sequence_for_missing_course_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo.get_sequence(CourseId::new(9)).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn progress_round_trips() {
        let repo = InMemoryRepository::new();
        let mut progress = LessonProgress::begin(UserId::new(1), LessonId::new(10), 3);
        progress.complete(600, 590, false, fixed_now()).unwrap();
        repo.upsert(&progress).await.unwrap();

        let fetched = repo
            .get(UserId::new(1), LessonId::new(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, progress);
        assert!(fetched.is_completed());
    }

    #[tokio::test]
    async fn conditional_pause_stops_at_budget() {
        let repo = InMemoryRepository::new();
        let progress = LessonProgress::begin(UserId::new(1), LessonId::new(10), 2);
        repo.upsert(&progress).await.unwrap();

        let first = repo
            .record_pause_if_below_limit(UserId::new(1), LessonId::new(10))
            .await
            .unwrap();
        assert!(first.accepted);
        assert_eq!(first.pauses_used, 1);
        assert_eq!(first.state, LessonProgressState::Paused);

        // paused rows reject a second pause until resumed
        let while_paused = repo
            .record_pause_if_below_limit(UserId::new(1), LessonId::new(10))
            .await
            .unwrap();
        assert!(!while_paused.accepted);
        assert_eq!(while_paused.pauses_used, 1);
    }

    #[tokio::test]
    async fn conditional_pause_without_row_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo
            .record_pause_if_below_limit(UserId::new(1), LessonId::new(10))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn access_code_clear_keeps_enforcement() {
        let repo = InMemoryRepository::new();
        let code = AccessCode::permanent(LessonId::new(5), "123456", fixed_now()).unwrap();
        repo.put_code(&code).await.unwrap();

        let state = repo.get_state(LessonId::new(5)).await.unwrap();
        assert!(state.enabled());
        assert!(state.code().is_some());

        repo.clear_code(LessonId::new(5)).await.unwrap();
        let state = repo.get_state(LessonId::new(5)).await.unwrap();
        assert!(state.enabled());
        assert!(state.code().is_none());
    }

    #[tokio::test]
    async fn toggle_survives_without_code() {
        let repo = InMemoryRepository::new();
        repo.set_enabled(LessonId::new(7), true).await.unwrap();
        let state = repo.get_state(LessonId::new(7)).await.unwrap();
        assert!(state.enabled());
        assert!(state.code().is_none());
    }

    #[tokio::test]
    async fn today_session_matches_course_and_date() {
        let repo = InMemoryRepository::new();
        let on = fixed_now().date_naive();
        repo.add_session(SessionId::new(1), CourseId::new(1), on)
            .await
            .unwrap();

        assert_eq!(
            repo.today_session(CourseId::new(1), on).await.unwrap(),
            Some(SessionId::new(1))
        );
        assert_eq!(
            repo.today_session(CourseId::new(2), on).await.unwrap(),
            None
        );
        assert_eq!(
            repo.today_session(CourseId::new(1), on.succ_opt().unwrap())
                .await
                .unwrap(),
            None
        );
    }
}
