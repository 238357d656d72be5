use lms_core::model::{
    AccessCode, AccessCodeState, AccessCodeType, AttendanceRecord, AttendanceStatus, Course,
    CourseDelivery, CourseId, Lesson, LessonId, LessonProgress, LessonProgressState, SessionId,
    UserId,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn lesson_id_from_i64(v: i64) -> Result<LessonId, StorageError> {
    Ok(LessonId::new(i64_to_u64("lesson_id", v)?))
}

pub(crate) fn course_id_from_i64(v: i64) -> Result<CourseId, StorageError> {
    Ok(CourseId::new(i64_to_u64("course_id", v)?))
}

pub(crate) fn session_id_from_i64(v: i64) -> Result<SessionId, StorageError> {
    Ok(SessionId::new(i64_to_u64("session_id", v)?))
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn map_course_row(row: &sqlx::sqlite::SqliteRow) -> Result<Course, StorageError> {
    let delivery_str: String = row.try_get("delivery").map_err(ser)?;
    let delivery = CourseDelivery::parse(&delivery_str).map_err(ser)?;
    Ok(Course::new(
        course_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        delivery,
    ))
}

pub(crate) fn map_lesson_row(row: &sqlx::sqlite::SqliteRow) -> Result<Lesson, StorageError> {
    Ok(Lesson::new(
        lesson_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
        i64_to_u32(
            "order_index",
            row.try_get::<i64, _>("order_index").map_err(ser)?,
        )?,
        i64_to_u32(
            "max_pauses",
            row.try_get::<i64, _>("max_pauses").map_err(ser)?,
        )?,
    ))
}

pub(crate) fn map_progress_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<LessonProgress, StorageError> {
    let state_str: String = row.try_get("state").map_err(ser)?;
    let state = LessonProgressState::parse(&state_str).map_err(ser)?;

    LessonProgress::from_persisted(
        user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        lesson_id_from_i64(row.try_get::<i64, _>("lesson_id").map_err(ser)?)?,
        state,
        i64_to_u32(
            "pauses_used",
            row.try_get::<i64, _>("pauses_used").map_err(ser)?,
        )?,
        i64_to_u32(
            "max_pauses",
            row.try_get::<i64, _>("max_pauses").map_err(ser)?,
        )?,
        i64_to_u32(
            "time_spent_seconds",
            row.try_get::<i64, _>("time_spent_seconds").map_err(ser)?,
        )?,
        i64_to_u32(
            "last_position_seconds",
            row.try_get::<i64, _>("last_position_seconds").map_err(ser)?,
        )?,
        row.try_get("completed_at").map_err(ser)?,
        row.try_get::<bool, _>("admin_locked").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_access_code_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<AccessCodeState, StorageError> {
    let enabled: bool = row.try_get("enabled").map_err(ser)?;
    let code_value: Option<String> = row.try_get("code").map_err(ser)?;

    let code = match code_value {
        None => None,
        Some(value) => {
            let type_str: String = row
                .try_get::<Option<String>, _>("code_type")
                .map_err(ser)?
                .ok_or_else(|| StorageError::Serialization("code without code_type".into()))?;
            let code_type = AccessCodeType::parse(&type_str).map_err(ser)?;
            let generated_at = row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>("generated_at")
                .map_err(ser)?
                .ok_or_else(|| StorageError::Serialization("code without generated_at".into()))?;

            Some(
                AccessCode::from_persisted(
                    lesson_id_from_i64(row.try_get::<i64, _>("lesson_id").map_err(ser)?)?,
                    value,
                    code_type,
                    row.try_get("expires_at").map_err(ser)?,
                    generated_at,
                )
                .map_err(ser)?,
            )
        }
    };

    Ok(AccessCodeState::new(enabled, code))
}

pub(crate) fn map_attendance_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<AttendanceRecord, StorageError> {
    let status_str: String = row.try_get("status").map_err(ser)?;
    let status = AttendanceStatus::parse(&status_str).map_err(ser)?;

    AttendanceRecord::from_persisted(
        session_id_from_i64(row.try_get::<i64, _>("session_id").map_err(ser)?)?,
        user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        status,
        row.try_get("marked_at").map_err(ser)?,
    )
    .map_err(ser)
}
