//! Core vocabulary library shared by the client and backend applications.
//!
//! Provides:
//! - Difficulty scoring and mastery classification
//! - Collaborator role rules for shared dictionaries
//! - Field-path updates for per-user keys on shared words
//! - Answer matching for typed spelling quizzes
//! - Shared types (Word, SharedWord, SharedDictionary, QuizSession, etc.)

pub mod difficulty;
pub mod error;
pub mod field;
pub mod matching;
pub mod permissions;
pub mod types;

pub use difficulty::{apply_delta, classify, MasteryLevel, MASTERY_THRESHOLD, MAX_SCORE, MIN_SCORE};
pub use error::{PermissionError, Result};
pub use field::{FieldPatch, FieldUpdate, FieldValue};
pub use matching::{check_answer, levenshtein_distance, normalized_similarity, MatchResult};
pub use permissions::Action;
pub use types::{
    DictionarySelection, DictionaryState, Evaluation, MatchingMode, QuizPreset, QuizSession,
    QuizType, Role, ScoreDeltas, SharedDictionary, SharedWord, SyncState, Word, WordDraft,
};
