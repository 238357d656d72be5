//! Access code issuance and verification.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;

use lms_core::model::{
    AccessCode, AccessCodeType, Capability, CapabilitySet, LessonId,
};
use storage::repository::{AccessCodeRepository, CourseRepository};

use crate::error::GovernanceError;
use crate::Clock;

/// Outcome of checking a supplied code against a lesson's stored one.
///
/// Verification never consumes the code: it gates lesson entry, not a
/// single attempt, so the same code is shareable across a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodeVerification {
    Valid,
    /// A temporary code past its deadline, even when the strings match.
    Expired,
    Incorrect,
    /// Enforcement without a usable code. Access stays denied (fail closed).
    NotConfigured,
}

impl CodeVerification {
    #[must_use]
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }
}

/// Admin-facing snapshot of a lesson's code configuration.
///
/// Reports presence and expiry without repeating the code itself anywhere it
/// would be logged; the caller fetches `code` explicitly when rendering it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AccessCodeInfo {
    pub enabled: bool,
    pub code: Option<String>,
    pub code_type: Option<AccessCodeType>,
    pub expires_at: Option<DateTime<Utc>>,
    pub expired: bool,
}

/// Issues, toggles, clears, and verifies per-lesson access codes.
///
/// A lesson carries at most one code; generating a new one replaces the old
/// with no history kept.
#[derive(Clone)]
pub struct AccessCodeManager {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    codes: Arc<dyn AccessCodeRepository>,
}

impl AccessCodeManager {
    #[must_use]
    pub fn new(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        codes: Arc<dyn AccessCodeRepository>,
    ) -> Self {
        Self {
            clock,
            courses,
            codes,
        }
    }

    /// Generate and store a fresh six-digit code for a lesson, replacing any
    /// existing one and enabling enforcement.
    ///
    /// Temporary codes expire `expires_in_minutes` after generation and the
    /// expiry must be positive; permanent codes ignore the argument.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` without `ManageAccessCodes`, `NotFound` for an
    /// unknown lesson, `Validation` for a missing or non-positive expiry on a
    /// temporary code, and storage errors.
    pub async fn generate(
        &self,
        actor: &CapabilitySet,
        lesson: LessonId,
        code_type: AccessCodeType,
        expires_in_minutes: Option<i64>,
    ) -> Result<AccessCode, GovernanceError> {
        require(actor, Capability::ManageAccessCodes)?;
        self.courses.get_lesson(lesson).await?;

        let now = self.clock.now();
        let value = random_code();
        let code = match code_type {
            AccessCodeType::Permanent => AccessCode::permanent(lesson, value, now)?,
            AccessCodeType::Temporary => {
                let minutes = expires_in_minutes.ok_or_else(|| {
                    GovernanceError::Validation(
                        "temporary codes require an expiry in minutes".to_string(),
                    )
                })?;
                AccessCode::temporary(lesson, value, minutes, now)?
            }
        };

        self.codes.put_code(&code).await?;
        tracing::info!(
            lesson = lesson.value(),
            code_type = %code_type,
            expires_at = ?code.expires_at(),
            "access code generated"
        );
        Ok(code)
    }

    /// Flip enforcement for a lesson without changing the stored code.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` without `ManageAccessCodes`, `NotFound` for an
    /// unknown lesson, and storage errors.
    pub async fn toggle(
        &self,
        actor: &CapabilitySet,
        lesson: LessonId,
        enabled: bool,
    ) -> Result<(), GovernanceError> {
        require(actor, Capability::ManageAccessCodes)?;
        self.courses.get_lesson(lesson).await?;
        self.codes.set_enabled(lesson, enabled).await?;
        tracing::info!(lesson = lesson.value(), enabled, "access code enforcement toggled");
        Ok(())
    }

    /// Delete a lesson's stored code. Enforcement keeps its current value,
    /// so a still-enabled lesson denies entry until a new code is generated.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` without `ManageAccessCodes`, `NotFound` for an
    /// unknown lesson, and storage errors.
    pub async fn clear(
        &self,
        actor: &CapabilitySet,
        lesson: LessonId,
    ) -> Result<(), GovernanceError> {
        require(actor, Capability::ManageAccessCodes)?;
        self.courses.get_lesson(lesson).await?;
        self.codes.clear_code(lesson).await?;
        tracing::info!(lesson = lesson.value(), "access code cleared");
        Ok(())
    }

    /// Inspect a lesson's code configuration.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` without `ManageAccessCodes`, `NotFound` for an
    /// unknown lesson, and storage errors.
    pub async fn info(
        &self,
        actor: &CapabilitySet,
        lesson: LessonId,
    ) -> Result<AccessCodeInfo, GovernanceError> {
        require(actor, Capability::ManageAccessCodes)?;
        self.courses.get_lesson(lesson).await?;

        let state = self.codes.get_state(lesson).await?;
        let now = self.clock.now();
        let code = state.code();
        Ok(AccessCodeInfo {
            enabled: state.enabled(),
            code: code.map(|c| c.code().to_string()),
            code_type: code.map(AccessCode::code_type),
            expires_at: code.and_then(AccessCode::expires_at),
            expired: code.is_some_and(|c| c.is_expired(now)),
        })
    }

    /// Enforcement flag plus stored code, read by the start gate.
    pub(crate) async fn state_of(
        &self,
        lesson: LessonId,
    ) -> Result<lms_core::model::AccessCodeState, GovernanceError> {
        Ok(self.codes.get_state(lesson).await?)
    }

    /// Check a supplied code against the lesson's stored one.
    ///
    /// Disabled enforcement, a missing code, or a cleared code all report
    /// `NotConfigured`; expiry is checked before the string comparison so a
    /// stale-but-matching code reports `Expired`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty supplied code, `NotFound` for an
    /// unknown lesson, and storage errors.
    pub async fn verify(
        &self,
        lesson: LessonId,
        supplied: &str,
    ) -> Result<CodeVerification, GovernanceError> {
        if supplied.trim().is_empty() {
            return Err(GovernanceError::Validation(
                "supplied access code must not be empty".to_string(),
            ));
        }
        self.courses.get_lesson(lesson).await?;

        let state = self.codes.get_state(lesson).await?;
        if !state.enabled() {
            return Ok(CodeVerification::NotConfigured);
        }
        let Some(code) = state.code() else {
            return Ok(CodeVerification::NotConfigured);
        };

        if code.is_expired(self.clock.now()) {
            Ok(CodeVerification::Expired)
        } else if code.matches(supplied) {
            Ok(CodeVerification::Valid)
        } else {
            Ok(CodeVerification::Incorrect)
        }
    }
}

fn require(actor: &CapabilitySet, capability: Capability) -> Result<(), GovernanceError> {
    if actor.contains(capability) {
        Ok(())
    } else {
        Err(GovernanceError::Forbidden(capability))
    }
}

/// Six decimal digits, never with a leading zero.
fn random_code() -> String {
    let n: u32 = rand::rng().random_range(100_000..=999_999);
    n.to_string()
}
