use std::collections::HashMap;

use lms_core::model::{LessonId, LessonProgress, UserId};

use super::mapping::{id_to_i64, map_progress_row, ser};
use super::SqliteRepository;
use crate::repository::{PauseAttempt, ProgressRepository, StorageError};

const PROGRESS_COLUMNS: &str = r"
    user_id, lesson_id, state, pauses_used, max_pauses,
    time_spent_seconds, last_position_seconds, completed_at, admin_locked
";

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get(
        &self,
        user: UserId,
        lesson: LessonId,
    ) -> Result<Option<LessonProgress>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM lesson_progress WHERE user_id = ?1 AND lesson_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(id_to_i64("user_id", user.value())?)
            .bind(id_to_i64("lesson_id", lesson.value())?)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.map(|r| map_progress_row(&r)).transpose()
    }

    async fn for_lessons(
        &self,
        user: UserId,
        lessons: &[LessonId],
    ) -> Result<HashMap<LessonId, LessonProgress>, StorageError> {
        if lessons.is_empty() {
            return Ok(HashMap::new());
        }

        let mut sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM lesson_progress WHERE user_id = ?1 AND lesson_id IN ("
        );
        for i in 0..lessons.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 2).to_string());
        }
        sql.push_str(")\n");

        let mut q = sqlx::query(&sql).bind(id_to_i64("user_id", user.value())?);
        for id in lessons {
            q = q.bind(id_to_i64("lesson_id", id.value())?);
        }

        let rows = q
            .fetch_all(self.pool())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let progress = map_progress_row(&row)?;
            out.insert(progress.lesson_id(), progress);
        }
        Ok(out)
    }

    async fn upsert(&self, progress: &LessonProgress) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO lesson_progress (
                user_id, lesson_id, state, pauses_used, max_pauses,
                time_spent_seconds, last_position_seconds, completed_at, admin_locked
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(user_id, lesson_id) DO UPDATE SET
                state = excluded.state,
                pauses_used = excluded.pauses_used,
                max_pauses = excluded.max_pauses,
                time_spent_seconds = excluded.time_spent_seconds,
                last_position_seconds = excluded.last_position_seconds,
                completed_at = excluded.completed_at,
                admin_locked = excluded.admin_locked
            ",
        )
        .bind(id_to_i64("user_id", progress.user_id().value())?)
        .bind(id_to_i64("lesson_id", progress.lesson_id().value())?)
        .bind(progress.state().as_str())
        .bind(i64::from(progress.pauses_used()))
        .bind(i64::from(progress.max_pauses()))
        .bind(i64::from(progress.time_spent_seconds()))
        .bind(i64::from(progress.last_position_seconds()))
        .bind(progress.completed_at())
        .bind(progress.admin_locked())
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn record_pause_if_below_limit(
        &self,
        user: UserId,
        lesson: LessonId,
    ) -> Result<PauseAttempt, StorageError> {
        let user_i64 = id_to_i64("user_id", user.value())?;
        let lesson_i64 = id_to_i64("lesson_id", lesson.value())?;

        // The WHERE clause carries the whole guard, so concurrent callers
        // can never push pauses_used past max_pauses.
        let result = sqlx::query(
            r"
            UPDATE lesson_progress
            SET pauses_used = pauses_used + 1, state = 'paused'
            WHERE user_id = ?1 AND lesson_id = ?2
              AND state = 'in-progress'
              AND pauses_used < max_pauses
            ",
        )
        .bind(user_i64)
        .bind(lesson_i64)
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let accepted = result.rows_affected() == 1;

        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM lesson_progress WHERE user_id = ?1 AND lesson_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(user_i64)
            .bind(lesson_i64)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .ok_or(StorageError::NotFound)?;

        let state_str: String = sqlx::Row::try_get(&row, "state").map_err(ser)?;
        let state = lms_core::model::LessonProgressState::parse(&state_str).map_err(ser)?;
        let pauses_used: i64 = sqlx::Row::try_get(&row, "pauses_used").map_err(ser)?;
        let max_pauses: i64 = sqlx::Row::try_get(&row, "max_pauses").map_err(ser)?;

        Ok(PauseAttempt {
            accepted,
            pauses_used: u32::try_from(pauses_used)
                .map_err(|_| StorageError::Serialization("invalid pauses_used".into()))?,
            max_pauses: u32::try_from(max_pauses)
                .map_err(|_| StorageError::Serialization("invalid max_pauses".into()))?,
            state,
        })
    }
}
