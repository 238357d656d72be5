pub mod access_code;
pub mod attendance;
mod capability;
mod ids;
pub mod playback;
pub mod progress;
pub mod sequence;

pub use ids::{CourseId, LessonId, ParseIdError, SessionId, UserId};

pub use access_code::{AccessCode, AccessCodeError, AccessCodeState, AccessCodeType};
pub use attendance::{
    AttendanceEligibility, AttendanceError, AttendanceRecord, AttendanceStatus,
};
pub use capability::{Capability, CapabilitySet};
pub use playback::{PlaybackPolicy, PlaybackPolicyDraft, PlaybackPolicyError};
pub use progress::{LessonProgress, LessonProgressState, ProgressError};
pub use sequence::{Course, CourseDelivery, CourseSequence, Lesson, SequenceError};
