use chrono::NaiveDate;
use lms_core::model::{AttendanceRecord, CourseId, SessionId, UserId};

use super::mapping::{id_to_i64, map_attendance_row, ser, session_id_from_i64};
use super::SqliteRepository;
use crate::repository::{AttendanceRepository, StorageError};

#[async_trait::async_trait]
impl AttendanceRepository for SqliteRepository {
    async fn today_session(
        &self,
        course: CourseId,
        on: NaiveDate,
    ) -> Result<Option<SessionId>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id FROM class_sessions
            WHERE course_id = ?1 AND session_date = ?2
            ORDER BY id ASC
            LIMIT 1
            ",
        )
        .bind(id_to_i64("course_id", course.value())?)
        .bind(on)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.map(|r| {
            let id: i64 = sqlx::Row::try_get(&r, "id").map_err(ser)?;
            session_id_from_i64(id)
        })
        .transpose()
    }

    async fn get_attendance(
        &self,
        session: SessionId,
        user: UserId,
    ) -> Result<Option<AttendanceRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT session_id, user_id, status, marked_at
            FROM attendance
            WHERE session_id = ?1 AND user_id = ?2
            ",
        )
        .bind(id_to_i64("session_id", session.value())?)
        .bind(id_to_i64("user_id", user.value())?)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.map(|r| map_attendance_row(&r)).transpose()
    }

    async fn add_session(
        &self,
        session: SessionId,
        course: CourseId,
        on: NaiveDate,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO class_sessions (id, course_id, session_date)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                course_id = excluded.course_id,
                session_date = excluded.session_date
            ",
        )
        .bind(id_to_i64("session_id", session.value())?)
        .bind(id_to_i64("course_id", course.value())?)
        .bind(on)
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn put_attendance(&self, record: &AttendanceRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO attendance (session_id, user_id, status, marked_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(session_id, user_id) DO UPDATE SET
                status = excluded.status,
                marked_at = excluded.marked_at
            ",
        )
        .bind(id_to_i64("session_id", record.session_id().value())?)
        .bind(id_to_i64("user_id", record.user_id().value())?)
        .bind(record.status().as_str())
        .bind(record.marked_at())
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }
}
