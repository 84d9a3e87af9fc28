//! Remote document store.
//!
//! [`RemoteStore`] is the seam between the client and whatever holds the shared copy of the
//! data. [`HttpRemoteStore`] talks to the backend; [`MemoryRemoteStore`] keeps everything in
//! process and is used by tests and offline demos.
//!
//! A store handle is bound to one signed-in user: authorship, private words and field-path
//! writes are all attributed to that user.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use lexicon_core::{DictionaryState, FieldUpdate, Role, SharedDictionary, SharedWord, Word, WordDraft};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

pub use http::HttpRemoteStore;
pub use memory::{MemoryBackend, MemoryRemoteStore};

/// Remote store errors.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend error: {status} - {message}")]
    Backend { status: u16, message: String },

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not authenticated - register an account first")]
    NotAuthenticated,
}

/// Live updates for one dictionary. Every message is the complete current state.
pub type DictionaryUpdates = mpsc::UnboundedReceiver<DictionaryState>;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn create_dictionary(&self, name: &str) -> Result<SharedDictionary, RemoteError>;
    async fn fetch_dictionary(&self, dictionary_id: Uuid) -> Result<DictionaryState, RemoteError>;
    async fn delete_dictionary(&self, dictionary_id: Uuid) -> Result<(), RemoteError>;

    /// Add a collaborator or change an existing collaborator's role.
    async fn set_collaborator(
        &self,
        dictionary_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<(), RemoteError>;
    async fn remove_collaborator(&self, dictionary_id: Uuid, email: &str) -> Result<(), RemoteError>;

    async fn add_word(&self, dictionary_id: Uuid, draft: &WordDraft) -> Result<SharedWord, RemoteError>;
    async fn update_word(
        &self,
        dictionary_id: Uuid,
        word_id: Uuid,
        draft: &WordDraft,
    ) -> Result<(), RemoteError>;
    async fn delete_word(&self, dictionary_id: Uuid, word_id: Uuid) -> Result<(), RemoteError>;

    /// Write a single key of a shared word. Sibling keys are never touched.
    async fn update_word_field(
        &self,
        dictionary_id: Uuid,
        word_id: Uuid,
        update: &FieldUpdate,
    ) -> Result<(), RemoteError>;

    /// Open a live subscription. The current state is delivered first.
    async fn watch_dictionary(&self, dictionary_id: Uuid) -> Result<DictionaryUpdates, RemoteError>;

    async fn list_private_words(&self) -> Result<Vec<Word>, RemoteError>;
    async fn upsert_private_word(&self, word: &Word) -> Result<(), RemoteError>;
    async fn delete_private_word(&self, word_id: Uuid) -> Result<(), RemoteError>;
}
