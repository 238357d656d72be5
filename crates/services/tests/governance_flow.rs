use chrono::Duration;

use lms_core::model::{
    AccessCodeType, AttendanceRecord, AttendanceStatus, Capability, CapabilitySet, Course,
    CourseDelivery, CourseId, Lesson, LessonId, LessonProgressState, PlaybackPolicy, SessionId,
    UserId,
};
use lms_core::time::{fixed_clock, fixed_now};
use lms_core::unlock::UnlockState;
use services::{
    AdminOverrides, DenialReason, GovernanceEngine, GovernanceError, PauseOutcome, StartDecision,
};
use storage::repository::Storage;

fn user() -> UserId {
    UserId::new(1)
}

fn course() -> CourseId {
    CourseId::new(1)
}

fn lesson(n: u64) -> LessonId {
    LessonId::new(n)
}

async fn seed_course(storage: &Storage, delivery: CourseDelivery, max_pauses: u32) {
    storage
        .courses
        .upsert_course(&Course::new(course(), delivery))
        .await
        .unwrap();
    for (i, id) in [10u64, 11, 12].into_iter().enumerate() {
        storage
            .courses
            .upsert_lesson(&Lesson::new(
                lesson(id),
                course(),
                u32::try_from(i).unwrap(),
                max_pauses,
            ))
            .await
            .unwrap();
    }
}

async fn remote_engine(max_pauses: u32) -> (GovernanceEngine, Storage) {
    let storage = Storage::in_memory();
    seed_course(&storage, CourseDelivery::Remote, max_pauses).await;
    (GovernanceEngine::new(fixed_clock(), &storage), storage)
}

async fn mark_present(storage: &Storage) {
    storage
        .attendance
        .add_session(SessionId::new(1), course(), fixed_now().date_naive())
        .await
        .unwrap();
    let mut record = AttendanceRecord::pending(SessionId::new(1), user());
    record.mark(AttendanceStatus::Present, fixed_now());
    storage.attendance.put_attendance(&record).await.unwrap();
}

async fn complete(engine: &GovernanceEngine, id: LessonId) {
    engine
        .start_lesson(user(), id, None)
        .await
        .unwrap();
    engine
        .complete_lesson(user(), id, 600, 590, false, &PlaybackPolicy::standard())
        .await
        .unwrap();
}

#[tokio::test]
async fn lessons_unlock_strictly_in_order() {
    let (engine, _storage) = remote_engine(3).await;

    let decision = engine.start_lesson(user(), lesson(11), None).await.unwrap();
    assert_eq!(decision.denial(), Some(DenialReason::SequenceLocked));

    let decision = engine.start_lesson(user(), lesson(10), None).await.unwrap();
    assert!(decision.is_granted());

    // lesson 12 still locked: 11 is not complete
    let outcome = engine
        .complete_lesson(user(), lesson(10), 600, 590, false, &PlaybackPolicy::standard())
        .await
        .unwrap();
    assert_eq!(outcome.next_unlocked, Some(lesson(11)));
    assert_eq!(outcome.percent_complete, 33);

    let decision = engine.start_lesson(user(), lesson(12), None).await.unwrap();
    assert_eq!(decision.denial(), Some(DenialReason::SequenceLocked));
    let decision = engine.start_lesson(user(), lesson(11), None).await.unwrap();
    assert!(decision.is_granted());
}

#[tokio::test]
async fn restarting_a_completed_lesson_is_denied() {
    let (engine, _storage) = remote_engine(3).await;
    complete(&engine, lesson(10)).await;

    let decision = engine.start_lesson(user(), lesson(10), None).await.unwrap();
    assert_eq!(decision.denial(), Some(DenialReason::SequenceLocked));
}

#[tokio::test]
async fn onsite_course_requires_a_session_and_a_present_mark() {
    let storage = Storage::in_memory();
    seed_course(&storage, CourseDelivery::Onsite, 3).await;
    let engine = GovernanceEngine::new(fixed_clock(), &storage);

    // nothing scheduled today, even though the sequence allows lesson 0
    let decision = engine.start_lesson(user(), lesson(10), None).await.unwrap();
    assert_eq!(decision.denial(), Some(DenialReason::AttendanceNoSession));

    storage
        .attendance
        .add_session(SessionId::new(1), course(), fixed_now().date_naive())
        .await
        .unwrap();
    let decision = engine.start_lesson(user(), lesson(10), None).await.unwrap();
    assert_eq!(decision.denial(), Some(DenialReason::AttendanceMissing));

    mark_present(&storage).await;
    let decision = engine.start_lesson(user(), lesson(10), None).await.unwrap();
    assert!(decision.is_granted());
}

#[tokio::test]
async fn enabled_enforcement_without_a_code_fails_closed() {
    let (engine, storage) = remote_engine(3).await;
    storage
        .access_codes
        .set_enabled(lesson(10), true)
        .await
        .unwrap();

    let decision = engine.start_lesson(user(), lesson(10), None).await.unwrap();
    assert_eq!(decision.denial(), Some(DenialReason::AccessCodeRequired));

    let decision = engine
        .start_lesson(user(), lesson(10), Some("123456"))
        .await
        .unwrap();
    assert_eq!(decision.denial(), Some(DenialReason::AccessCodeRequired));
}

#[tokio::test]
async fn access_code_gate_reports_each_failure_distinctly() {
    let (engine, _storage) = remote_engine(3).await;
    let admin = CapabilitySet::admin();

    let code = engine
        .access_codes()
        .generate(&admin, lesson(10), AccessCodeType::Permanent, None)
        .await
        .unwrap();

    let decision = engine.start_lesson(user(), lesson(10), None).await.unwrap();
    assert_eq!(decision.denial(), Some(DenialReason::AccessCodeRequired));

    let decision = engine
        .start_lesson(user(), lesson(10), Some("000000"))
        .await
        .unwrap();
    assert_eq!(decision.denial(), Some(DenialReason::AccessCodeIncorrect));

    let decision = engine
        .start_lesson(user(), lesson(10), Some(code.code()))
        .await
        .unwrap();
    assert!(decision.is_granted());
}

#[tokio::test]
async fn expired_temporary_code_denies_with_expired() {
    let storage = Storage::in_memory();
    seed_course(&storage, CourseDelivery::Remote, 3).await;
    let admin = CapabilitySet::admin();

    let setup_engine = GovernanceEngine::new(fixed_clock(), &storage);
    let code = setup_engine
        .access_codes()
        .generate(&admin, lesson(10), AccessCodeType::Temporary, Some(30))
        .await
        .unwrap();

    let later = lms_core::Clock::fixed(fixed_now() + Duration::minutes(31));
    let engine = GovernanceEngine::new(later, &storage);
    let decision = engine
        .start_lesson(user(), lesson(10), Some(code.code()))
        .await
        .unwrap();
    assert_eq!(decision.denial(), Some(DenialReason::AccessCodeExpired));
}

#[tokio::test]
async fn pause_resume_complete_happy_path() {
    let (engine, _storage) = remote_engine(3).await;
    let policy = PlaybackPolicy::standard();

    let decision = engine.start_lesson(user(), lesson(10), None).await.unwrap();
    let StartDecision::Granted(row) = decision else {
        panic!("expected grant");
    };
    assert_eq!(row.state(), LessonProgressState::InProgress);

    let outcome = engine.pause_lesson(user(), lesson(10), &policy).await.unwrap();
    assert_eq!(outcome, PauseOutcome::Accepted { remaining: 2 });

    engine.record_checkpoint(user(), lesson(10), 120, 115).await.unwrap();
    let row = engine.resume_lesson(user(), lesson(10)).await.unwrap();
    assert_eq!(row.state(), LessonProgressState::InProgress);
    assert_eq!(row.last_position_seconds(), 115);

    let outcome = engine
        .complete_lesson(user(), lesson(10), 600, 590, false, &policy)
        .await
        .unwrap();
    assert_eq!(outcome.progress.state(), LessonProgressState::Completed);
    assert!(!outcome.progress.was_forced());
    assert_eq!(outcome.next_unlocked, Some(lesson(11)));
}

#[tokio::test]
async fn exhausted_budget_auto_skips_through_the_completion_path() {
    let (engine, _storage) = remote_engine(1).await;
    let policy = PlaybackPolicy::standard();

    engine.start_lesson(user(), lesson(10), None).await.unwrap();
    let outcome = engine.pause_lesson(user(), lesson(10), &policy).await.unwrap();
    assert_eq!(outcome, PauseOutcome::Accepted { remaining: 0 });
    engine.resume_lesson(user(), lesson(10)).await.unwrap();

    let outcome = engine.pause_lesson(user(), lesson(10), &policy).await.unwrap();
    assert_eq!(
        outcome,
        PauseOutcome::Denied {
            reason: DenialReason::PauseBudgetExhausted,
            auto_skip_at: Some(fixed_now() + Duration::seconds(30)),
        }
    );

    let outcome = engine
        .complete_lesson(user(), lesson(10), 300, 280, true, &policy)
        .await
        .unwrap();
    assert_eq!(outcome.progress.state(), LessonProgressState::Interrupted);
    assert!(outcome.progress.was_forced());
    // a forced finish unlocks the next lesson exactly like a voluntary one
    assert_eq!(outcome.next_unlocked, Some(lesson(11)));
}

#[tokio::test]
async fn forced_completion_is_rejected_when_budget_remains() {
    let (engine, _storage) = remote_engine(3).await;

    engine.start_lesson(user(), lesson(10), None).await.unwrap();
    let err = engine
        .complete_lesson(user(), lesson(10), 300, 280, true, &PlaybackPolicy::standard())
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::Validation(_)));
}

#[tokio::test]
async fn grant_pause_unsticks_an_exhausted_budget() {
    let (engine, storage) = remote_engine(1).await;
    let admin_ops = AdminOverrides::new(&storage);
    let policy = PlaybackPolicy::standard();

    engine.start_lesson(user(), lesson(10), None).await.unwrap();
    engine.pause_lesson(user(), lesson(10), &policy).await.unwrap();
    engine.resume_lesson(user(), lesson(10)).await.unwrap();

    let outcome = engine.pause_lesson(user(), lesson(10), &policy).await.unwrap();
    assert!(!outcome.is_accepted());

    let row = admin_ops
        .grant_pause(&CapabilitySet::admin(), user(), lesson(10), 2)
        .await
        .unwrap();
    assert_eq!(row.max_pauses(), 3);
    assert_eq!(row.pauses_used(), 1);

    let outcome = engine.pause_lesson(user(), lesson(10), &policy).await.unwrap();
    assert_eq!(outcome, PauseOutcome::Accepted { remaining: 1 });
}

#[tokio::test]
async fn reset_rolls_back_any_state_including_interrupted() {
    let (engine, storage) = remote_engine(1).await;
    let admin_ops = AdminOverrides::new(&storage);
    let policy = PlaybackPolicy::standard();

    engine.start_lesson(user(), lesson(10), None).await.unwrap();
    engine.pause_lesson(user(), lesson(10), &policy).await.unwrap();
    engine.resume_lesson(user(), lesson(10)).await.unwrap();
    engine
        .complete_lesson(user(), lesson(10), 300, 280, true, &policy)
        .await
        .unwrap();

    let row = admin_ops
        .reset_lesson(&CapabilitySet::admin(), user(), lesson(10))
        .await
        .unwrap();
    assert_eq!(row.state(), LessonProgressState::Active);
    assert_eq!(row.pauses_used(), 0);
    assert!(!row.is_completed());
    assert_eq!(row.completed_at(), None);

    // the first lesson is startable again, and the second is locked again
    let decision = engine.start_lesson(user(), lesson(10), None).await.unwrap();
    assert!(decision.is_granted());
    let decision = engine.start_lesson(user(), lesson(11), None).await.unwrap();
    assert_eq!(decision.denial(), Some(DenialReason::SequenceLocked));
}

#[tokio::test]
async fn reset_deep_in_the_sequence_re_locks_the_row() {
    let (engine, storage) = remote_engine(3).await;
    let admin_ops = AdminOverrides::new(&storage);

    complete(&engine, lesson(10)).await;
    complete(&engine, lesson(11)).await;

    // lesson 11's predecessor is complete, so reset leaves it active
    let row = admin_ops
        .reset_lesson(&CapabilitySet::admin(), user(), lesson(11))
        .await
        .unwrap();
    assert_eq!(row.state(), LessonProgressState::Active);

    // resetting lesson 10 as well leaves lesson 11 without a completed
    // predecessor next time it is evaluated
    admin_ops
        .reset_lesson(&CapabilitySet::admin(), user(), lesson(10))
        .await
        .unwrap();
    let decision = engine.start_lesson(user(), lesson(11), None).await.unwrap();
    assert_eq!(decision.denial(), Some(DenialReason::SequenceLocked));
}

#[tokio::test]
async fn stale_locked_row_readmits_once_the_predecessor_is_complete_again() {
    let (engine, storage) = remote_engine(3).await;
    let admin_ops = AdminOverrides::new(&storage);
    let admin = CapabilitySet::admin();

    complete(&engine, lesson(10)).await;
    complete(&engine, lesson(11)).await;

    // reset 10 first, so resetting 11 sees an incomplete predecessor and
    // the row lands in the persisted locked state
    admin_ops.reset_lesson(&admin, user(), lesson(10)).await.unwrap();
    let row = admin_ops.reset_lesson(&admin, user(), lesson(11)).await.unwrap();
    assert_eq!(row.state(), LessonProgressState::Locked);

    // the live sequence resolution must outrank that snapshot
    complete(&engine, lesson(10)).await;
    let decision = engine.start_lesson(user(), lesson(11), None).await.unwrap();
    assert!(decision.is_granted());
}

#[tokio::test]
async fn admin_lock_interrupts_a_session_and_survives_completion_upstream() {
    let (engine, storage) = remote_engine(3).await;
    let admin_ops = AdminOverrides::new(&storage);
    let admin = CapabilitySet::admin();

    complete(&engine, lesson(10)).await;
    engine.start_lesson(user(), lesson(11), None).await.unwrap();

    let row = admin_ops.lock_lesson(&admin, user(), lesson(11)).await.unwrap();
    assert_eq!(row.state(), LessonProgressState::Interrupted);
    assert!(row.admin_locked());

    // the learner cannot finish or restart the locked lesson
    let err = engine
        .complete_lesson(user(), lesson(11), 300, 280, false, &PlaybackPolicy::standard())
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::Conflict(_)));
    let decision = engine.start_lesson(user(), lesson(11), None).await.unwrap();
    assert_eq!(decision.denial(), Some(DenialReason::SequenceLocked));

    // the lock also keeps downstream lessons closed
    let overview = engine.course_overview(user(), course()).await.unwrap();
    assert_eq!(
        overview.resolution.state_of(lesson(12)),
        Some(UnlockState::Locked)
    );

    // only an explicit reset re-admits the lesson to sequence evaluation
    let row = admin_ops.reset_lesson(&admin, user(), lesson(11)).await.unwrap();
    assert!(!row.admin_locked());
    let decision = engine.start_lesson(user(), lesson(11), None).await.unwrap();
    assert!(decision.is_granted());
}

#[tokio::test]
async fn locking_an_untouched_lesson_creates_a_locked_row() {
    let (engine, storage) = remote_engine(3).await;
    let admin_ops = AdminOverrides::new(&storage);

    let row = admin_ops
        .lock_lesson(&CapabilitySet::admin(), user(), lesson(10))
        .await
        .unwrap();
    assert_eq!(row.state(), LessonProgressState::Locked);
    assert!(row.admin_locked());

    let decision = engine.start_lesson(user(), lesson(10), None).await.unwrap();
    assert_eq!(decision.denial(), Some(DenialReason::SequenceLocked));
}

#[tokio::test]
async fn admin_overrides_require_the_capability() {
    let (_engine, storage) = remote_engine(3).await;
    let admin_ops = AdminOverrides::new(&storage);
    let codes_only: CapabilitySet = [Capability::ManageAccessCodes].into_iter().collect();

    let err = admin_ops
        .grant_pause(&codes_only, user(), lesson(10), 1)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GovernanceError::Forbidden(Capability::ManageProgress)
    ));
}

#[tokio::test]
async fn course_overview_reports_rollup_percent() {
    let (engine, _storage) = remote_engine(3).await;

    let overview = engine.course_overview(user(), course()).await.unwrap();
    assert_eq!(overview.percent_complete, 0);
    assert_eq!(
        overview.resolution.state_of(lesson(10)),
        Some(UnlockState::Active)
    );

    complete(&engine, lesson(10)).await;
    complete(&engine, lesson(11)).await;
    let overview = engine.course_overview(user(), course()).await.unwrap();
    assert_eq!(overview.percent_complete, 66);

    complete(&engine, lesson(12)).await;
    let overview = engine.course_overview(user(), course()).await.unwrap();
    assert_eq!(overview.percent_complete, 100);
    assert_eq!(overview.resolution.first_active(), None);
}
