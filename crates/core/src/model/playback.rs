use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PlaybackPolicyError {
    #[error("auto-skip delay must be at least 1 second when auto-skip is enabled")]
    ZeroAutoSkipDelay,
}

/// Playback governance knobs, passed explicitly into each engine call.
///
/// The engine never reads these from process-wide state; the caller resolves
/// whatever settings store it uses into a `PlaybackPolicy` value first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackPolicy {
    default_max_pauses: u32,
    auto_skip_on_max_pauses: bool,
    auto_skip_delay_seconds: u32,
}

/// Unvalidated policy input, e.g. deserialized from a settings row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackPolicyDraft {
    pub default_max_pauses: u32,
    pub auto_skip_on_max_pauses: bool,
    pub auto_skip_delay_seconds: u32,
}

impl PlaybackPolicyDraft {
    /// Validate the draft into a usable policy.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackPolicyError::ZeroAutoSkipDelay` if auto-skip is
    /// enabled with a zero delay.
    pub fn validate(self) -> Result<PlaybackPolicy, PlaybackPolicyError> {
        if self.auto_skip_on_max_pauses && self.auto_skip_delay_seconds == 0 {
            return Err(PlaybackPolicyError::ZeroAutoSkipDelay);
        }
        Ok(PlaybackPolicy {
            default_max_pauses: self.default_max_pauses,
            auto_skip_on_max_pauses: self.auto_skip_on_max_pauses,
            auto_skip_delay_seconds: self.auto_skip_delay_seconds,
        })
    }
}

impl PlaybackPolicy {
    /// Platform defaults: 3 pauses, auto-skip after 30 seconds.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            default_max_pauses: 3,
            auto_skip_on_max_pauses: true,
            auto_skip_delay_seconds: 30,
        }
    }

    /// Budget applied when a lesson does not carry its own override.
    #[must_use]
    pub fn default_max_pauses(&self) -> u32 {
        self.default_max_pauses
    }

    #[must_use]
    pub fn auto_skip_on_max_pauses(&self) -> bool {
        self.auto_skip_on_max_pauses
    }

    #[must_use]
    pub fn auto_skip_delay_seconds(&self) -> u32 {
        self.auto_skip_delay_seconds
    }

    #[must_use]
    pub fn auto_skip_delay(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.auto_skip_delay_seconds))
    }
}

impl Default for PlaybackPolicy {
    fn default() -> Self {
        Self::standard()
    }
}
