//! Field-path updates on shared words.
//!
//! A field update targets exactly one key inside a shared word's per-user maps, e.g.
//! `dictionaries/<d>/words/<w>/difficulties/<email>`. Writers never send the whole word, so
//! two collaborators updating their own keys at the same time cannot overwrite each other.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::SharedWord;

const DIFFICULTIES: &str = "difficulties";
const LIKES: &str = "likes";

/// A single-key write against a shared word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum FieldUpdate {
    SetDifficulty { email: String, score: i32 },
    SetLike { email: String, liked: bool },
}

/// Wire form of a field update: `{"path": "difficulties/ana@example.com", "value": 5}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPatch {
    pub path: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i32),
    Bool(bool),
}

impl FieldUpdate {
    /// Email whose key this update touches.
    pub fn email(&self) -> &str {
        match self {
            Self::SetDifficulty { email, .. } | Self::SetLike { email, .. } => email,
        }
    }

    /// Path relative to the word document.
    pub fn field_path(&self) -> String {
        match self {
            Self::SetDifficulty { email, .. } => format!("{DIFFICULTIES}/{email}"),
            Self::SetLike { email, .. } => format!("{LIKES}/{email}"),
        }
    }

    /// Fully qualified path, used in logs and error messages.
    pub fn document_path(&self, dictionary_id: Uuid, word_id: Uuid) -> String {
        format!(
            "dictionaries/{}/words/{}/{}",
            dictionary_id,
            word_id,
            self.field_path()
        )
    }

    pub fn to_patch(&self) -> FieldPatch {
        let value = match self {
            Self::SetDifficulty { score, .. } => FieldValue::Int(*score),
            Self::SetLike { liked, .. } => FieldValue::Bool(*liked),
        };
        FieldPatch {
            path: self.field_path(),
            value,
        }
    }

    /// Parse a wire patch. Unknown fields, empty keys and mismatched values yield `None`.
    pub fn from_patch(patch: &FieldPatch) -> Option<Self> {
        let (field, email) = patch.path.split_once('/')?;
        if email.is_empty() || email.contains('/') {
            return None;
        }
        let email = email.to_string();
        match (field, patch.value) {
            (DIFFICULTIES, FieldValue::Int(score)) => Some(Self::SetDifficulty { email, score }),
            (LIKES, FieldValue::Bool(liked)) => Some(Self::SetLike { email, liked }),
            _ => None,
        }
    }

    /// Apply to an in-memory word. Only the addressed key changes.
    pub fn apply_to(&self, word: &mut SharedWord) {
        match self {
            Self::SetDifficulty { email, score } => {
                word.difficulties.insert(email.clone(), *score);
            }
            Self::SetLike { email, liked: true } => {
                word.likes.insert(email.clone());
            }
            Self::SetLike { email, liked: false } => {
                word.likes.remove(email);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::collections::{BTreeMap, BTreeSet};

    fn word() -> SharedWord {
        SharedWord {
            id: Uuid::new_v4(),
            dictionary_id: Uuid::new_v4(),
            text: "chien".to_string(),
            definition: "dog".to_string(),
            examples: vec![],
            added_by_email: "ana@example.com".to_string(),
            added_by_display_name: "Ana".to_string(),
            created_at: Utc::now(),
            likes: BTreeSet::new(),
            difficulties: BTreeMap::from([("ben@example.com".to_string(), 12)]),
        }
    }

    #[test]
    fn difficulty_path_addresses_one_key() {
        let update = FieldUpdate::SetDifficulty {
            email: "ana@example.com".to_string(),
            score: 5,
        };
        let dictionary_id = Uuid::nil();
        let word_id = Uuid::nil();
        assert_eq!(
            update.document_path(dictionary_id, word_id),
            format!("dictionaries/{dictionary_id}/words/{word_id}/difficulties/ana@example.com")
        );
    }

    #[test]
    fn apply_leaves_sibling_keys_alone() {
        let mut word = word();
        FieldUpdate::SetDifficulty {
            email: "ana@example.com".to_string(),
            score: 5,
        }
        .apply_to(&mut word);

        assert_eq!(word.difficulties.len(), 2);
        assert_eq!(word.difficulties["ben@example.com"], 12);
        assert_eq!(word.difficulties["ana@example.com"], 5);
    }

    #[test]
    fn like_toggles_only_own_entry() {
        let mut word = word();
        word.likes.insert("ben@example.com".to_string());

        let like = FieldUpdate::SetLike {
            email: "ana@example.com".to_string(),
            liked: true,
        };
        like.apply_to(&mut word);
        assert!(word.is_liked_by("ana@example.com"));

        FieldUpdate::SetLike {
            email: "ana@example.com".to_string(),
            liked: false,
        }
        .apply_to(&mut word);
        assert!(!word.is_liked_by("ana@example.com"));
        assert!(word.is_liked_by("ben@example.com"));
    }

    #[test]
    fn patch_parses_back() {
        let update = FieldUpdate::SetLike {
            email: "ana@example.com".to_string(),
            liked: true,
        };
        let json = serde_json::to_string(&update.to_patch()).unwrap();
        assert_eq!(json, r#"{"path":"likes/ana@example.com","value":true}"#);

        let patch: FieldPatch = serde_json::from_str(&json).unwrap();
        assert_eq!(FieldUpdate::from_patch(&patch), Some(update));
    }

    #[test]
    fn unknown_or_malformed_paths_are_rejected() {
        let bad = [
            FieldPatch {
                path: "text/ana@example.com".to_string(),
                value: FieldValue::Int(1),
            },
            FieldPatch {
                path: "difficulties/".to_string(),
                value: FieldValue::Int(1),
            },
            FieldPatch {
                path: "difficulties/a/b".to_string(),
                value: FieldValue::Int(1),
            },
            FieldPatch {
                path: "difficulties/ana@example.com".to_string(),
                value: FieldValue::Bool(true),
            },
        ];
        for patch in &bad {
            assert_eq!(FieldUpdate::from_patch(patch), None, "{}", patch.path);
        }
    }
}
