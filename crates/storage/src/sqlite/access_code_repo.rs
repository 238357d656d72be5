use lms_core::model::{AccessCode, AccessCodeState, LessonId};

use super::mapping::{id_to_i64, map_access_code_row};
use super::SqliteRepository;
use crate::repository::{AccessCodeRepository, StorageError};

#[async_trait::async_trait]
impl AccessCodeRepository for SqliteRepository {
    async fn get_state(&self, lesson: LessonId) -> Result<AccessCodeState, StorageError> {
        let row = sqlx::query(
            r"
            SELECT lesson_id, enabled, code, code_type, expires_at, generated_at
            FROM access_codes
            WHERE lesson_id = ?1
            ",
        )
        .bind(id_to_i64("lesson_id", lesson.value())?)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        match row {
            Some(r) => map_access_code_row(&r),
            None => Ok(AccessCodeState::default()),
        }
    }

    async fn put_code(&self, code: &AccessCode) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO access_codes (lesson_id, enabled, code, code_type, expires_at, generated_at)
            VALUES (?1, 1, ?2, ?3, ?4, ?5)
            ON CONFLICT(lesson_id) DO UPDATE SET
                enabled = 1,
                code = excluded.code,
                code_type = excluded.code_type,
                expires_at = excluded.expires_at,
                generated_at = excluded.generated_at
            ",
        )
        .bind(id_to_i64("lesson_id", code.lesson_id().value())?)
        .bind(code.code())
        .bind(code.code_type().as_str())
        .bind(code.expires_at())
        .bind(code.generated_at())
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn set_enabled(&self, lesson: LessonId, enabled: bool) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO access_codes (lesson_id, enabled, code, code_type, expires_at, generated_at)
            VALUES (?1, ?2, NULL, NULL, NULL, NULL)
            ON CONFLICT(lesson_id) DO UPDATE SET enabled = excluded.enabled
            ",
        )
        .bind(id_to_i64("lesson_id", lesson.value())?)
        .bind(enabled)
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn clear_code(&self, lesson: LessonId) -> Result<(), StorageError> {
        sqlx::query(
            r"
            UPDATE access_codes
            SET code = NULL, code_type = NULL, expires_at = NULL, generated_at = NULL
            WHERE lesson_id = ?1
            ",
        )
        .bind(id_to_i64("lesson_id", lesson.value())?)
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }
}
