#![forbid(unsafe_code)]

//! Lesson access and progress governance services.

pub mod access_codes;
pub mod attendance;
pub mod error;
pub mod governance;
pub mod pauses;

pub use lms_core::Clock;

pub use access_codes::{AccessCodeInfo, AccessCodeManager, CodeVerification};
pub use attendance::AttendanceGate;
pub use error::{DenialReason, GovernanceError};
pub use governance::{
    AdminOverrides, CompletionOutcome, CourseOverview, GovernanceEngine, StartDecision,
};
pub use pauses::{PauseOutcome, PauseTracker};
