use thiserror::Error;

use crate::model::access_code::AccessCodeError;
use crate::model::attendance::AttendanceError;
use crate::model::playback::PlaybackPolicyError;
use crate::model::progress::ProgressError;
use crate::model::sequence::SequenceError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    AccessCode(#[from] AccessCodeError),
    #[error(transparent)]
    Attendance(#[from] AttendanceError),
    #[error(transparent)]
    Sequence(#[from] SequenceError),
    #[error(transparent)]
    PlaybackPolicy(#[from] PlaybackPolicyError),
}
