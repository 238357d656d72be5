use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema (courses, lessons, progress rows, access codes,
/// class sessions, attendance, and indexes).
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS courses (
                    id INTEGER PRIMARY KEY,
                    delivery TEXT NOT NULL CHECK (delivery IN ('onsite', 'remote'))
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS lessons (
                    id INTEGER PRIMARY KEY,
                    course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                    order_index INTEGER NOT NULL CHECK (order_index >= 0),
                    max_pauses INTEGER NOT NULL CHECK (max_pauses >= 0)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_lessons_course_order
                ON lessons (course_id, order_index);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS lesson_progress (
                    user_id INTEGER NOT NULL,
                    lesson_id INTEGER NOT NULL REFERENCES lessons(id) ON DELETE CASCADE,
                    state TEXT NOT NULL,
                    pauses_used INTEGER NOT NULL CHECK (pauses_used >= 0),
                    max_pauses INTEGER NOT NULL CHECK (max_pauses >= 0),
                    time_spent_seconds INTEGER NOT NULL DEFAULT 0,
                    last_position_seconds INTEGER NOT NULL DEFAULT 0,
                    completed_at TEXT,
                    admin_locked INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (user_id, lesson_id),
                    CHECK (pauses_used <= max_pauses)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS access_codes (
                    lesson_id INTEGER PRIMARY KEY REFERENCES lessons(id) ON DELETE CASCADE,
                    enabled INTEGER NOT NULL DEFAULT 0,
                    code TEXT,
                    code_type TEXT CHECK (code_type IN ('permanent', 'temporary')),
                    expires_at TEXT,
                    generated_at TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS class_sessions (
                    id INTEGER PRIMARY KEY,
                    course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                    session_date TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_class_sessions_course_date
                ON class_sessions (course_id, session_date);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS attendance (
                    session_id INTEGER NOT NULL REFERENCES class_sessions(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL,
                    status TEXT NOT NULL CHECK (status IN ('pending', 'present', 'absent')),
                    marked_at TEXT,
                    PRIMARY KEY (session_id, user_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (1, ?1)")
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
    }

    Ok(())
}
