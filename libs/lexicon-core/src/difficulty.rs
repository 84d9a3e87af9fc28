//! Difficulty scoring rules.
//!
//! Pure arithmetic over a per-word integer score. Callers supply the deltas (see
//! [`crate::types::ScoreDeltas`]); nothing here knows which quiz produced them.

use serde::{Deserialize, Serialize};

/// Lowest score a word can reach.
pub const MIN_SCORE: i32 = -50;
/// Highest score a word can reach.
pub const MAX_SCORE: i32 = 100;
/// Score at which an attempted word counts as mastered.
pub const MASTERY_THRESHOLD: i32 = 50;

/// Mastery classification. Declaration order is mastery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryLevel {
    NeedsReview,
    New,
    InProgress,
    Mastered,
}

impl MasteryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeedsReview => "needs_review",
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::Mastered => "mastered",
        }
    }
}

/// Apply a delta, saturating into `[MIN_SCORE, MAX_SCORE]`.
pub fn apply_delta(score: i32, delta: i32) -> i32 {
    score.saturating_add(delta).clamp(MIN_SCORE, MAX_SCORE)
}

/// Classify a score. Words nobody has attempted are `New` regardless of score.
pub fn classify(score: i32, has_attempts: bool) -> MasteryLevel {
    if !has_attempts {
        MasteryLevel::New
    } else if score < 0 {
        MasteryLevel::NeedsReview
    } else if score >= MASTERY_THRESHOLD {
        MasteryLevel::Mastered
    } else {
        MasteryLevel::InProgress
    }
}
