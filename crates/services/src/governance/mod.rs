//! Lesson start gating, progress transitions, and admin overrides.

mod admin;
mod engine;

pub use admin::AdminOverrides;
pub use engine::{CompletionOutcome, CourseOverview, GovernanceEngine, StartDecision};
