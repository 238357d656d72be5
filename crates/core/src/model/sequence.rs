use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use crate::model::{CourseId, LessonId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SequenceError {
    #[error("lesson {0} appears more than once in course {1}")]
    DuplicateLesson(LessonId, CourseId),

    #[error("invalid persisted course: {0}")]
    InvalidPersistedState(String),
}

/// How a course is delivered. Onsite courses gate lesson starts on
/// attendance; remote courses do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CourseDelivery {
    Onsite,
    Remote,
}

impl CourseDelivery {
    /// Stable string form used by storage adapters.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Onsite => "onsite",
            Self::Remote => "remote",
        }
    }

    /// Parse the stable string form.
    ///
    /// # Errors
    ///
    /// Returns `SequenceError::InvalidPersistedState` for unknown values.
    pub fn parse(value: &str) -> Result<Self, SequenceError> {
        match value {
            "onsite" => Ok(Self::Onsite),
            "remote" => Ok(Self::Remote),
            other => Err(SequenceError::InvalidPersistedState(format!(
                "unknown delivery: {other}"
            ))),
        }
    }
}

impl fmt::Display for CourseDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Course metadata the engine needs: identity and delivery mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    id: CourseId,
    delivery: CourseDelivery,
}

impl Course {
    #[must_use]
    pub fn new(id: CourseId, delivery: CourseDelivery) -> Self {
        Self { id, delivery }
    }

    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
    }

    #[must_use]
    pub fn delivery(&self) -> CourseDelivery {
        self.delivery
    }

    #[must_use]
    pub fn is_onsite(&self) -> bool {
        self.delivery == CourseDelivery::Onsite
    }
}

/// Lesson metadata the engine needs. Content fields (title, media URL,
/// duration) stay with the content collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    id: LessonId,
    course_id: CourseId,
    order_index: u32,
    max_pauses: u32,
}

impl Lesson {
    #[must_use]
    pub fn new(id: LessonId, course_id: CourseId, order_index: u32, max_pauses: u32) -> Self {
        Self {
            id,
            course_id,
            order_index,
            max_pauses,
        }
    }

    #[must_use]
    pub fn id(&self) -> LessonId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn order_index(&self) -> u32 {
        self.order_index
    }

    /// Pause budget a fresh progress row starts with.
    #[must_use]
    pub fn max_pauses(&self) -> u32 {
        self.max_pauses
    }
}

/// The ordered lesson list of a course, derived from lesson ordering.
/// Read-only to the governance engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseSequence {
    course_id: CourseId,
    lessons: Vec<LessonId>,
}

impl CourseSequence {
    /// Build a sequence from lessons already sorted by order index.
    ///
    /// # Errors
    ///
    /// Returns `SequenceError::DuplicateLesson` if a lesson id repeats.
    pub fn new(course_id: CourseId, lessons: Vec<LessonId>) -> Result<Self, SequenceError> {
        let mut seen = HashSet::with_capacity(lessons.len());
        for id in &lessons {
            if !seen.insert(*id) {
                return Err(SequenceError::DuplicateLesson(*id, course_id));
            }
        }
        Ok(Self { course_id, lessons })
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn lessons(&self) -> &[LessonId] {
        &self.lessons
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lessons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lessons.is_empty()
    }

    /// Zero-based position of a lesson within the course.
    #[must_use]
    pub fn position(&self, lesson: LessonId) -> Option<usize> {
        self.lessons.iter().position(|l| *l == lesson)
    }

    #[must_use]
    pub fn contains(&self, lesson: LessonId) -> bool {
        self.position(lesson).is_some()
    }

    /// The lesson immediately after the given one, if any.
    #[must_use]
    pub fn next_after(&self, lesson: LessonId) -> Option<LessonId> {
        let pos = self.position(lesson)?;
        self.lessons.get(pos + 1).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(ids: &[u64]) -> CourseSequence {
        CourseSequence::new(
            CourseId::new(1),
            ids.iter().map(|i| LessonId::new(*i)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn position_and_next() {
        let s = seq(&[10, 20, 30]);
        assert_eq!(s.position(LessonId::new(20)), Some(1));
        assert_eq!(s.next_after(LessonId::new(20)), Some(LessonId::new(30)));
        assert_eq!(s.next_after(LessonId::new(30)), None);
        assert_eq!(s.next_after(LessonId::new(99)), None);
    }

    #[test]
    fn duplicate_lessons_rejected() {
        let err = CourseSequence::new(
            CourseId::new(1),
            vec![LessonId::new(1), LessonId::new(1)],
        )
        .unwrap_err();
        assert!(matches!(err, SequenceError::DuplicateLesson(_, _)));
    }

    #[test]
    fn empty_sequence_is_allowed() {
        let s = seq(&[]);
        assert!(s.is_empty());
    }

    #[test]
    fn delivery_string_roundtrip() {
        for delivery in [CourseDelivery::Onsite, CourseDelivery::Remote] {
            assert_eq!(CourseDelivery::parse(delivery.as_str()).unwrap(), delivery);
        }
        assert!(CourseDelivery::parse("hybrid").is_err());
    }
}
