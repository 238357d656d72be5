//! Attendance gating for onsite courses.

use std::sync::Arc;

use chrono::NaiveDate;

use lms_core::model::{AttendanceEligibility, CourseId, UserId};
use storage::repository::AttendanceRepository;

use crate::error::GovernanceError;

/// Resolves whether a learner may enter an onsite lesson today.
///
/// The outcome is a trichotomy, not a boolean: "nothing scheduled today",
/// "session exists but the learner is not marked present", and "eligible"
/// each need a different remediation message from the caller.
#[derive(Clone)]
pub struct AttendanceGate {
    attendance: Arc<dyn AttendanceRepository>,
}

impl AttendanceGate {
    #[must_use]
    pub fn new(attendance: Arc<dyn AttendanceRepository>) -> Self {
        Self { attendance }
    }

    /// Resolve the learner's eligibility for a course on the given date.
    ///
    /// A pending or absent mark counts as not marked present; only an
    /// explicit `Present` mark passes the gate.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn eligibility(
        &self,
        course: CourseId,
        user: UserId,
        on: NaiveDate,
    ) -> Result<AttendanceEligibility, GovernanceError> {
        let Some(session) = self.attendance.today_session(course, on).await? else {
            return Ok(AttendanceEligibility::NoSession);
        };

        let marked_present = self
            .attendance
            .get_attendance(session, user)
            .await?
            .is_some_and(|record| record.is_present());

        if marked_present {
            Ok(AttendanceEligibility::Eligible)
        } else {
            Ok(AttendanceEligibility::NotMarked)
        }
    }
}
