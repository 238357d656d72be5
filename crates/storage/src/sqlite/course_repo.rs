use lms_core::model::{Course, CourseId, CourseSequence, Lesson, LessonId};

use super::mapping::{id_to_i64, lesson_id_from_i64, map_course_row, map_lesson_row, ser};
use super::SqliteRepository;
use crate::repository::{CourseRepository, StorageError};

#[async_trait::async_trait]
impl CourseRepository for SqliteRepository {
    async fn get_course(&self, id: CourseId) -> Result<Course, StorageError> {
        let row = sqlx::query("SELECT id, delivery FROM courses WHERE id = ?1")
            .bind(id_to_i64("course_id", id.value())?)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .ok_or(StorageError::NotFound)?;
        map_course_row(&row)
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Lesson, StorageError> {
        let row = sqlx::query(
            "SELECT id, course_id, order_index, max_pauses FROM lessons WHERE id = ?1",
        )
        .bind(id_to_i64("lesson_id", id.value())?)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .ok_or(StorageError::NotFound)?;
        map_lesson_row(&row)
    }

    async fn get_sequence(&self, course_id: CourseId) -> Result<CourseSequence, StorageError> {
        // distinguish "no such course" from "course with no lessons"
        self.get_course(course_id).await?;

        let rows = sqlx::query(
            r"
            SELECT id
            FROM lessons
            WHERE course_id = ?1
            ORDER BY order_index ASC, id ASC
            ",
        )
        .bind(id_to_i64("course_id", course_id.value())?)
        .fetch_all(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = sqlx::Row::try_get(&row, "id").map_err(ser)?;
            ids.push(lesson_id_from_i64(id)?);
        }

        CourseSequence::new(course_id, ids).map_err(ser)
    }

    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO courses (id, delivery)
            VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET delivery = excluded.delivery
            ",
        )
        .bind(id_to_i64("course_id", course.id().value())?)
        .bind(course.delivery().as_str())
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO lessons (id, course_id, order_index, max_pauses)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                course_id = excluded.course_id,
                order_index = excluded.order_index,
                max_pauses = excluded.max_pauses
            ",
        )
        .bind(id_to_i64("lesson_id", lesson.id().value())?)
        .bind(id_to_i64("course_id", lesson.course_id().value())?)
        .bind(i64::from(lesson.order_index()))
        .bind(i64::from(lesson.max_pauses()))
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}
