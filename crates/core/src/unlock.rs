//! Sequential unlock resolution.
//!
//! A lesson's unlock state is a pure function of the course sequence and the
//! per-lesson completion and admin-lock flags. No side effects; callers feed
//! flags read from storage and render or gate on the result.

use std::collections::HashMap;
use std::fmt;

use crate::model::{CourseSequence, LessonId};

/// Derived availability of one lesson for one learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockState {
    Locked,
    Active,
    Completed,
}

impl fmt::Display for UnlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked => f.write_str("locked"),
            Self::Active => f.write_str("active"),
            Self::Completed => f.write_str("completed"),
        }
    }
}

/// Per-lesson input flags, read from the learner's progress rows.
///
/// Lessons without a progress row use the default (nothing completed,
/// nothing locked).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LessonFlags {
    /// Terminal progress: voluntary completion or a forced finish. Both
    /// count for unlocking the next lesson.
    pub completed: bool,
    /// Admin lock; wins over everything and survives re-evaluation until an
    /// explicit reset.
    pub admin_locked: bool,
}

impl LessonFlags {
    #[must_use]
    pub fn completed() -> Self {
        Self {
            completed: true,
            admin_locked: false,
        }
    }

    /// A completed lesson only unlocks its successor while not admin-locked.
    #[must_use]
    fn counts_for_unlock(self) -> bool {
        self.completed && !self.admin_locked
    }
}

/// Unlock states for every lesson in a course, in sequence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockResolution {
    states: Vec<(LessonId, UnlockState)>,
}

impl UnlockResolution {
    /// Sequence-ordered `(lesson, state)` pairs.
    #[must_use]
    pub fn states(&self) -> &[(LessonId, UnlockState)] {
        &self.states
    }

    /// State of one lesson; `None` if it is not in the sequence.
    #[must_use]
    pub fn state_of(&self, lesson: LessonId) -> Option<UnlockState> {
        self.states
            .iter()
            .find(|(id, _)| *id == lesson)
            .map(|(_, state)| *state)
    }

    /// The first lesson currently startable, if any.
    #[must_use]
    pub fn first_active(&self) -> Option<LessonId> {
        self.states
            .iter()
            .find(|(_, state)| *state == UnlockState::Active)
            .map(|(id, _)| *id)
    }

    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.states
            .iter()
            .filter(|(_, state)| *state == UnlockState::Completed)
            .count()
    }
}

/// Resolve unlock states for a whole course.
///
/// Rules, in priority order per lesson:
/// 1. admin lock forces `Locked`, even over a completion flag;
/// 2. a completed lesson is `Completed`;
/// 3. lesson 0, or a lesson whose predecessor counts as completed, is
///    `Active`;
/// 4. everything else is `Locked`.
#[must_use]
pub fn resolve(
    sequence: &CourseSequence,
    flags: &HashMap<LessonId, LessonFlags>,
) -> UnlockResolution {
    let mut states = Vec::with_capacity(sequence.len());
    let mut prev_counts = true; // lesson 0 is unlocked by sequence

    for id in sequence.lessons() {
        let here = flags.get(id).copied().unwrap_or_default();

        let state = if here.admin_locked {
            UnlockState::Locked
        } else if here.completed {
            UnlockState::Completed
        } else if prev_counts {
            UnlockState::Active
        } else {
            UnlockState::Locked
        };

        states.push((*id, state));
        prev_counts = here.counts_for_unlock();
    }

    UnlockResolution { states }
}
