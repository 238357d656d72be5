use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::LessonId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AccessCodeError {
    #[error("temporary codes require a positive expiry, got {provided} minutes")]
    InvalidExpiry { provided: i64 },

    #[error("access code value must not be empty")]
    EmptyCode,

    #[error("invalid persisted access code: {0}")]
    InvalidPersistedState(String),
}

//
// ─── TYPE ──────────────────────────────────────────────────────────────────────
//

/// Whether a code stays valid forever or lapses at a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessCodeType {
    Permanent,
    Temporary,
}

impl AccessCodeType {
    /// Stable string form used by storage adapters.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::Temporary => "temporary",
        }
    }

    /// Parse the stable string form.
    ///
    /// # Errors
    ///
    /// Returns `AccessCodeError::InvalidPersistedState` for unknown values.
    pub fn parse(value: &str) -> Result<Self, AccessCodeError> {
        match value {
            "permanent" => Ok(Self::Permanent),
            "temporary" => Ok(Self::Temporary),
            other => Err(AccessCodeError::InvalidPersistedState(format!(
                "unknown code type: {other}"
            ))),
        }
    }
}

impl fmt::Display for AccessCodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── ACCESS CODE ───────────────────────────────────────────────────────────────
//

/// The single access code a lesson may carry.
///
/// A lesson keeps at most one code; generating a new one replaces the old
/// without history. The code is shareable by design: verification never
/// consumes it, it only gates entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessCode {
    lesson_id: LessonId,
    code: String,
    code_type: AccessCodeType,
    expires_at: Option<DateTime<Utc>>,
    generated_at: DateTime<Utc>,
}

impl AccessCode {
    /// Issue a permanent code.
    ///
    /// # Errors
    ///
    /// Returns `AccessCodeError::EmptyCode` for an empty code value.
    pub fn permanent(
        lesson_id: LessonId,
        code: impl Into<String>,
        generated_at: DateTime<Utc>,
    ) -> Result<Self, AccessCodeError> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(AccessCodeError::EmptyCode);
        }
        Ok(Self {
            lesson_id,
            code,
            code_type: AccessCodeType::Permanent,
            expires_at: None,
            generated_at,
        })
    }

    /// Issue a temporary code expiring `expires_in_minutes` after issue.
    ///
    /// # Errors
    ///
    /// Returns `AccessCodeError::InvalidExpiry` unless the expiry is at least
    /// one minute, and `AccessCodeError::EmptyCode` for an empty code value.
    pub fn temporary(
        lesson_id: LessonId,
        code: impl Into<String>,
        expires_in_minutes: i64,
        generated_at: DateTime<Utc>,
    ) -> Result<Self, AccessCodeError> {
        if expires_in_minutes < 1 {
            return Err(AccessCodeError::InvalidExpiry {
                provided: expires_in_minutes,
            });
        }
        let code = code.into();
        if code.trim().is_empty() {
            return Err(AccessCodeError::EmptyCode);
        }
        Ok(Self {
            lesson_id,
            code,
            code_type: AccessCodeType::Temporary,
            expires_at: Some(generated_at + chrono::Duration::minutes(expires_in_minutes)),
            generated_at,
        })
    }

    /// Rehydrate a code from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `AccessCodeError::InvalidPersistedState` if the expiry field
    /// disagrees with the code type.
    pub fn from_persisted(
        lesson_id: LessonId,
        code: String,
        code_type: AccessCodeType,
        expires_at: Option<DateTime<Utc>>,
        generated_at: DateTime<Utc>,
    ) -> Result<Self, AccessCodeError> {
        if code.trim().is_empty() {
            return Err(AccessCodeError::EmptyCode);
        }
        match (code_type, expires_at) {
            (AccessCodeType::Temporary, None) => Err(AccessCodeError::InvalidPersistedState(
                "temporary code without expires_at".into(),
            )),
            (AccessCodeType::Permanent, Some(_)) => Err(AccessCodeError::InvalidPersistedState(
                "permanent code with expires_at".into(),
            )),
            _ => Ok(Self {
                lesson_id,
                code,
                code_type,
                expires_at,
                generated_at,
            }),
        }
    }

    /// An expired temporary code gates like an absent one, but it stays
    /// stored until explicitly cleared.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }

    /// Exact, case-sensitive match against a supplied code.
    #[must_use]
    pub fn matches(&self, supplied: &str) -> bool {
        self.code == supplied
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn code_type(&self) -> AccessCodeType {
        self.code_type
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    #[must_use]
    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }
}

//
// ─── ENFORCEMENT STATE ─────────────────────────────────────────────────────────
//

/// Per-lesson access-code gate: the enforcement flag plus the stored code.
///
/// The flag toggles independently of the code value, so clearing the code
/// while enforcement stays on fails closed at verification time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessCodeState {
    enabled: bool,
    code: Option<AccessCode>,
}

impl AccessCodeState {
    #[must_use]
    pub fn new(enabled: bool, code: Option<AccessCode>) -> Self {
        Self { enabled, code }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn code(&self) -> Option<&AccessCode> {
        self.code.as_ref()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
