use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::{SessionId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttendanceError {
    #[error("invalid persisted attendance: {0}")]
    InvalidPersistedState(String),
}

/// Roster status of a learner within one onsite class session.
///
/// Learners enter the roster as `Pending`; the facilitator marks them
/// `Present` or `Absent` during the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttendanceStatus {
    Pending,
    Present,
    Absent,
}

impl AttendanceStatus {
    /// Stable string form used by storage adapters.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Present => "present",
            Self::Absent => "absent",
        }
    }

    /// Parse the stable string form.
    ///
    /// # Errors
    ///
    /// Returns `AttendanceError::InvalidPersistedState` for unknown values.
    pub fn parse(value: &str) -> Result<Self, AttendanceError> {
        match value {
            "pending" => Ok(Self::Pending),
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            other => Err(AttendanceError::InvalidPersistedState(format!(
                "unknown attendance status: {other}"
            ))),
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One learner's attendance row for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    session_id: SessionId,
    user_id: UserId,
    status: AttendanceStatus,
    marked_at: Option<DateTime<Utc>>,
}

impl AttendanceRecord {
    /// Fresh roster entry, not yet marked.
    #[must_use]
    pub fn pending(session_id: SessionId, user_id: UserId) -> Self {
        Self {
            session_id,
            user_id,
            status: AttendanceStatus::Pending,
            marked_at: None,
        }
    }

    /// Rehydrate a record from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `AttendanceError::InvalidPersistedState` if a marked status
    /// lacks its timestamp or a pending one carries it.
    pub fn from_persisted(
        session_id: SessionId,
        user_id: UserId,
        status: AttendanceStatus,
        marked_at: Option<DateTime<Utc>>,
    ) -> Result<Self, AttendanceError> {
        match (status, marked_at) {
            (AttendanceStatus::Pending, Some(_)) => Err(AttendanceError::InvalidPersistedState(
                "pending attendance with marked_at".into(),
            )),
            (AttendanceStatus::Present | AttendanceStatus::Absent, None) => {
                Err(AttendanceError::InvalidPersistedState(
                    "marked attendance without marked_at".into(),
                ))
            }
            _ => Ok(Self {
                session_id,
                user_id,
                status,
                marked_at,
            }),
        }
    }

    /// Facilitator marks the learner present or absent.
    pub fn mark(&mut self, status: AttendanceStatus, now: DateTime<Utc>) {
        self.status = status;
        self.marked_at = if status == AttendanceStatus::Pending {
            None
        } else {
            Some(now)
        };
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn status(&self) -> AttendanceStatus {
        self.status
    }

    #[must_use]
    pub fn marked_at(&self) -> Option<DateTime<Utc>> {
        self.marked_at
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        self.status == AttendanceStatus::Present
    }
}

/// Outcome of the attendance gate for one learner on one day.
///
/// A trichotomy rather than a boolean: each case needs a different
/// remediation message ("no session scheduled today" vs "ask the facilitator
/// to mark you present").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceEligibility {
    /// Nothing scheduled today for this course.
    NoSession,
    /// A session exists but the learner is not marked present.
    NotMarked,
    /// Marked present; the gate is open.
    Eligible,
}

impl AttendanceEligibility {
    #[must_use]
    pub fn is_eligible(self) -> bool {
        self == Self::Eligible
    }
}
