//! Core types for the vocabulary application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use crate::difficulty::{classify, MasteryLevel};

/// Local synchronization state of a private word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    LocalDirty,
    PushPending,
    Synced,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::LocalDirty
    }
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalDirty => "local_dirty",
            Self::PushPending => "push_pending",
            Self::Synced => "synced",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "local_dirty" => Some(Self::LocalDirty),
            "push_pending" => Some(Self::PushPending),
            "synced" => Some(Self::Synced),
            _ => None,
        }
    }
}

/// A word in the user's private collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub id: Uuid,
    pub text: String,
    pub definitions: Vec<String>,
    pub examples: Vec<String>,
    pub tags: Vec<String>,
    pub difficulty_score: i32,
    /// Number of quiz attempts recorded against this word.
    pub attempt_count: u32,
    pub is_favorite: bool,
    pub language_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub sync_state: SyncState,
}

impl Word {
    /// Create a fresh, never-quizzed word.
    pub fn new(text: impl Into<String>, definition: impl Into<String>, language_code: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            definitions: vec![definition.into()],
            examples: Vec::new(),
            tags: Vec::new(),
            difficulty_score: 0,
            attempt_count: 0,
            is_favorite: false,
            language_code: language_code.into(),
            created_at: now,
            updated_at: now,
            sync_state: SyncState::LocalDirty,
        }
    }

    pub fn mastery(&self) -> MasteryLevel {
        classify(self.difficulty_score, self.attempt_count > 0)
    }

    /// First definition, or an empty string for a word without one.
    pub fn primary_definition(&self) -> &str {
        self.definitions.first().map(String::as_str).unwrap_or_default()
    }
}

/// A word inside a shared dictionary.
///
/// `difficulties` and `likes` are keyed by collaborator email. Each collaborator only ever
/// writes their own key; sibling keys are owned by other people.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedWord {
    pub id: Uuid,
    pub dictionary_id: Uuid,
    pub text: String,
    pub definition: String,
    #[serde(default)]
    pub examples: Vec<String>,
    pub added_by_email: String,
    pub added_by_display_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes: BTreeSet<String>,
    #[serde(default)]
    pub difficulties: BTreeMap<String, i32>,
}

impl SharedWord {
    /// Difficulty recorded by `email`, or 0 when they never attempted the word.
    pub fn difficulty_for(&self, email: &str) -> i32 {
        self.difficulties.get(email).copied().unwrap_or(0)
    }

    pub fn has_attempts_by(&self, email: &str) -> bool {
        self.difficulties.contains_key(email)
    }

    pub fn mastery_for(&self, email: &str) -> MasteryLevel {
        classify(self.difficulty_for(email), self.has_attempts_by(email))
    }

    pub fn is_liked_by(&self, email: &str) -> bool {
        self.likes.contains(email)
    }
}

/// Editable content of a shared word. Per-user maps are never part of a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordDraft {
    pub text: String,
    pub definition: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

impl WordDraft {
    pub fn new(text: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            definition: definition.into(),
            examples: Vec::new(),
        }
    }
}

/// Collaborator role on a shared dictionary.
///
/// Declaration order is privilege order: `Viewer < Editor < Owner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Editor,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::Owner => "owner",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "viewer" => Some(Self::Viewer),
            "editor" => Some(Self::Editor),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A collaborative vocabulary collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedDictionary {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub collaborators: BTreeMap<String, Role>,
}

impl SharedDictionary {
    /// Create a dictionary owned by `owner_email`.
    pub fn new(name: impl Into<String>, owner_email: impl Into<String>) -> Self {
        let mut collaborators = BTreeMap::new();
        collaborators.insert(owner_email.into(), Role::Owner);
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
            collaborators,
        }
    }

    pub fn role_of(&self, email: &str) -> Option<Role> {
        self.collaborators.get(email).copied()
    }

    pub fn owner_email(&self) -> Option<&str> {
        self.collaborators
            .iter()
            .find(|(_, role)| **role == Role::Owner)
            .map(|(email, _)| email.as_str())
    }
}

/// Everything a remote subscription delivers for one dictionary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictionaryState {
    pub dictionary: SharedDictionary,
    pub words: Vec<SharedWord>,
}

/// Quiz kinds offered by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizType {
    /// Pick the matching definition from several options.
    ChooseDefinition,
    /// Type the word from its definition.
    Spelling,
    /// Write a sentence using the word; judged externally at session end.
    Sentence,
}

impl QuizType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChooseDefinition => "choose_definition",
            Self::Spelling => "spelling",
            Self::Sentence => "sentence",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "choose_definition" => Some(Self::ChooseDefinition),
            "spelling" => Some(Self::Spelling),
            "sentence" => Some(Self::Sentence),
            _ => None,
        }
    }

    /// Whether scoring is deferred to an external judge at session end.
    pub fn is_batched(&self) -> bool {
        matches!(self, Self::Sentence)
    }
}

/// Point values a quiz applies per outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreDeltas {
    pub correct: i32,
    pub incorrect: i32,
    pub skipped: i32,
}

impl ScoreDeltas {
    /// Point table for a quiz type. Timed spelling punishes skips harder.
    pub fn for_quiz(quiz_type: QuizType, timed: bool) -> Self {
        match (quiz_type, timed) {
            (QuizType::Spelling, true) => Self {
                correct: 5,
                incorrect: -2,
                skipped: -5,
            },
            _ => Self {
                correct: 5,
                incorrect: -2,
                skipped: -2,
            },
        }
    }
}

/// Which collection a quiz draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "dictionary_id", rename_all = "snake_case")]
pub enum DictionarySelection {
    Private,
    Shared(Uuid),
}

impl Default for DictionarySelection {
    fn default() -> Self {
        Self::Private
    }
}

/// Parameters chosen before a quiz starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizPreset {
    pub item_count: usize,
    pub hard_only: bool,
    pub selection: DictionarySelection,
    #[serde(default)]
    pub timed: bool,
}

impl Default for QuizPreset {
    fn default() -> Self {
        Self {
            item_count: 10,
            hard_only: false,
            selection: DictionarySelection::Private,
            timed: false,
        }
    }
}

/// Finished (or abandoned) quiz run. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizSession {
    pub id: Uuid,
    pub quiz_type: QuizType,
    pub score: i32,
    pub correct_answers: u32,
    pub total_items: u32,
    pub duration_seconds: u64,
    pub accuracy: f64,
    pub item_ids: Vec<Uuid>,
    pub correct_item_ids: Vec<Uuid>,
    pub timestamp: DateTime<Utc>,
}

/// Verdict returned by the sentence judge for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub target_word: String,
    pub is_correct: bool,
    pub feedback: String,
}

/// Matching mode for typed answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingMode {
    Exact,
    CaseInsensitive,
    Fuzzy,
}

impl Default for MatchingMode {
    fn default() -> Self {
        Self::CaseInsensitive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn shared_word() -> SharedWord {
        SharedWord {
            id: Uuid::new_v4(),
            dictionary_id: Uuid::new_v4(),
            text: "perro".to_string(),
            definition: "dog".to_string(),
            examples: vec![],
            added_by_email: "ana@example.com".to_string(),
            added_by_display_name: "Ana".to_string(),
            created_at: Utc::now(),
            likes: BTreeSet::new(),
            difficulties: BTreeMap::new(),
        }
    }

    #[test]
    fn new_word_is_new_and_dirty() {
        let word = Word::new("gato", "cat", "es");
        assert_eq!(word.mastery(), MasteryLevel::New);
        assert_eq!(word.sync_state, SyncState::LocalDirty);
        assert_eq!(word.primary_definition(), "cat");
    }

    #[test]
    fn missing_difficulty_reads_as_zero_without_inserting() {
        let word = shared_word();
        assert_eq!(word.difficulty_for("ben@example.com"), 0);
        assert_eq!(word.mastery_for("ben@example.com"), MasteryLevel::New);
        assert!(word.difficulties.is_empty());
    }

    #[test]
    fn attempted_word_classifies_from_own_key() {
        let mut word = shared_word();
        word.difficulties.insert("ana@example.com".to_string(), -4);
        word.difficulties.insert("ben@example.com".to_string(), 60);
        assert_eq!(word.mastery_for("ana@example.com"), MasteryLevel::NeedsReview);
        assert_eq!(word.mastery_for("ben@example.com"), MasteryLevel::Mastered);
    }

    #[test]
    fn dictionary_has_single_owner() {
        let dict = SharedDictionary::new("Spanish", "ana@example.com");
        assert_eq!(dict.owner_email(), Some("ana@example.com"));
        assert_eq!(dict.role_of("ana@example.com"), Some(Role::Owner));
        assert_eq!(dict.role_of("ben@example.com"), None);
    }

    #[test]
    fn role_order_follows_privilege() {
        assert!(Role::Viewer < Role::Editor);
        assert!(Role::Editor < Role::Owner);
        assert_eq!(Role::from_str("editor"), Some(Role::Editor));
        assert_eq!(Role::from_str("admin"), None);
    }

    #[test]
    fn timed_spelling_has_harsher_skip() {
        let relaxed = ScoreDeltas::for_quiz(QuizType::Spelling, false);
        let timed = ScoreDeltas::for_quiz(QuizType::Spelling, true);
        assert_eq!(relaxed.skipped, -2);
        assert_eq!(timed.skipped, -5);
        assert_eq!(timed.correct, relaxed.correct);
    }

    #[test]
    fn selection_serializes_tagged() {
        let id = Uuid::nil();
        let json = serde_json::to_value(DictionarySelection::Shared(id)).unwrap();
        assert_eq!(json["kind"], "shared");
        assert_eq!(json["dictionary_id"], id.to_string());
    }
}
