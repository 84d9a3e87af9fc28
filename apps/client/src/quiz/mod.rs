//! Quiz sessions.
//!
//! A [`QuizSessionCoordinator`] owns one run of a quiz: item selection, answer scoring,
//! score routing (private words through SQLite, shared words through a field-path write)
//! and persistence of the finished [`QuizSession`](lexicon_core::QuizSession).

pub mod judge;
pub mod pool;
pub mod session;

use lexicon_core::{MasteryLevel, SharedWord, Word};
use thiserror::Error;
use uuid::Uuid;

use crate::db::DbError;
use crate::sync::SyncError;

pub use judge::{Judge, JudgeError, ScriptedJudge, SentenceSubmission};
pub use pool::{select_items, ItemPool, StoreItemPool};
pub use session::{
    AnswerOutcome, AttemptResult, PendingEvaluation, QuizPhase, QuizSessionCoordinator,
    SessionProgress,
};

#[derive(Debug, Error)]
pub enum QuizError {
    #[error("not enough words for this quiz: {required} required, {available} available")]
    InsufficientItems { required: usize, available: usize },

    #[error("a quiz needs at least one item")]
    EmptyPreset,

    #[error("sentence evaluation failed: {0}")]
    Evaluation(String),

    #[error("cannot {action} while the session is {phase}")]
    InvalidState {
        action: &'static str,
        phase: &'static str,
    },

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// A word being quizzed, from either collection.
#[derive(Debug, Clone, PartialEq)]
pub enum QuizItem {
    Private(Word),
    Shared(SharedWord),
}

impl QuizItem {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Private(word) => word.id,
            Self::Shared(word) => word.id,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Private(word) => &word.text,
            Self::Shared(word) => &word.text,
        }
    }

    pub fn definition(&self) -> &str {
        match self {
            Self::Private(word) => word.primary_definition(),
            Self::Shared(word) => &word.definition,
        }
    }

    pub fn examples(&self) -> &[String] {
        match self {
            Self::Private(word) => &word.examples,
            Self::Shared(word) => &word.examples,
        }
    }

    /// Mastery as seen by `email`. Private words have a single score.
    pub fn mastery_for(&self, email: &str) -> MasteryLevel {
        match self {
            Self::Private(word) => word.mastery(),
            Self::Shared(word) => word.mastery_for(email),
        }
    }
}
