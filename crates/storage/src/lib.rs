#![forbid(unsafe_code)]

//! Persistence layer: repository traits, an in-memory adapter for tests,
//! and the `SQLite` production adapter.

pub mod repository;
pub mod sqlite;

pub use repository::{
    AccessCodeRepository, AttendanceRepository, CourseRepository, InMemoryRepository, PauseAttempt,
    ProgressRepository, Storage, StorageError,
};
pub use sqlite::{SqliteInitError, SqliteRepository};
