//! Shared error types for the services crate.

use std::fmt;

use thiserror::Error;

use lms_core::model::{AccessCodeError, Capability, ProgressError};
use storage::repository::StorageError;

/// Errors emitted by the governance services.
///
/// Gating failures are not errors: they come back as typed denial results so
/// the caller can render the exact remediation. Only malformed input, missing
/// targets, capability refusals, transition conflicts, and storage failures
/// surface here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GovernanceError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("missing capability: {0}")]
    Forbidden(Capability),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for GovernanceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => Self::NotFound,
            other => Self::Storage(other),
        }
    }
}

impl From<ProgressError> for GovernanceError {
    fn from(err: ProgressError) -> Self {
        match err {
            ProgressError::InvalidPersistedState(_) => {
                Self::Storage(StorageError::Serialization(err.to_string()))
            }
            other => Self::Conflict(other.to_string()),
        }
    }
}

impl From<AccessCodeError> for GovernanceError {
    fn from(err: AccessCodeError) -> Self {
        match err {
            AccessCodeError::InvalidPersistedState(_) => {
                Self::Storage(StorageError::Serialization(err.to_string()))
            }
            other => Self::Validation(other.to_string()),
        }
    }
}

/// The specific gate that refused a lesson start or pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DenialReason {
    /// The sequence resolver did not report the lesson as startable.
    SequenceLocked,
    /// Onsite course with no session scheduled today.
    AttendanceNoSession,
    /// A session exists today but the learner is not marked present.
    AttendanceMissing,
    /// Code enforcement is on and no valid code was supplied or configured.
    AccessCodeRequired,
    /// The supplied code matched a temporary code past its deadline.
    AccessCodeExpired,
    /// The supplied code did not match the stored one.
    AccessCodeIncorrect,
    /// The pause budget is spent.
    PauseBudgetExhausted,
}

impl DenialReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SequenceLocked => "sequence-locked",
            Self::AttendanceNoSession => "attendance-no-session",
            Self::AttendanceMissing => "attendance-missing",
            Self::AccessCodeRequired => "access-code-required",
            Self::AccessCodeExpired => "access-code-expired",
            Self::AccessCodeIncorrect => "access-code-incorrect",
            Self::PauseBudgetExhausted => "pause-budget-exhausted",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
