//! Database models and API types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

// Re-export shared types from lexicon-core
pub use lexicon_core::{
    DictionaryState, FieldPatch, FieldUpdate, Role, SharedDictionary, SharedWord, Word, WordDraft,
};

// === Database Entity Types ===

/// Registered account
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub email: String,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbDictionary {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbCollaborator {
    pub email: String,
    pub role: String,
}

/// Shared word row. `likes` maps email to `true`; absent keys mean "not liked".
#[derive(Debug, Clone, FromRow)]
pub struct DbSharedWord {
    pub id: Uuid,
    pub dictionary_id: Uuid,
    pub text: String,
    pub definition: String,
    pub examples: Json<Vec<String>>,
    pub added_by_email: String,
    pub added_by_display_name: String,
    pub created_at: DateTime<Utc>,
    pub likes: Json<BTreeMap<String, bool>>,
    pub difficulties: Json<BTreeMap<String, i32>>,
}

impl DbSharedWord {
    /// Convert to API word type
    pub fn into_shared_word(self) -> SharedWord {
        SharedWord {
            id: self.id,
            dictionary_id: self.dictionary_id,
            text: self.text,
            definition: self.definition,
            examples: self.examples.0,
            added_by_email: self.added_by_email,
            added_by_display_name: self.added_by_display_name,
            created_at: self.created_at,
            likes: self
                .likes
                .0
                .into_iter()
                .filter(|(_, liked)| *liked)
                .map(|(email, _)| email)
                .collect(),
            difficulties: self.difficulties.0,
        }
    }
}

/// Assemble a dictionary from its row and collaborator rows. Unknown roles are skipped.
pub fn build_dictionary(row: DbDictionary, collaborators: Vec<DbCollaborator>) -> SharedDictionary {
    SharedDictionary {
        id: row.id,
        name: row.name,
        created_at: row.created_at,
        collaborators: collaborators
            .into_iter()
            .filter_map(|c| Role::from_str(&c.role).map(|role| (c.email, role)))
            .collect(),
    }
}

// === API Request/Response Types ===

/// User registration request
#[derive(Debug, Deserialize, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub display_name: String,
}

/// User registration response
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub email: String,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateDictionaryRequest {
    pub name: String,
}

/// One entry of the caller's dictionary list
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DictionarySummary {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AddCollaboratorRequest {
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SetRoleRequest {
    pub role: Role,
}
