//! In-process remote store.
//!
//! [`MemoryBackend`] plays the part of the server: it holds every dictionary and private word,
//! enforces the same role rules the backend does and pushes the full dictionary state to every
//! watcher after each change. Each user talks to it through their own [`MemoryRemoteStore`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use lexicon_core::permissions::{self, Action};
use lexicon_core::{
    DictionaryState, FieldUpdate, PermissionError, Role, SharedDictionary, SharedWord, Word,
    WordDraft,
};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{DictionaryUpdates, RemoteError, RemoteStore};
use crate::identity::{normalize_email, CurrentUser};

#[derive(Default)]
struct BackendState {
    offline: bool,
    dictionaries: HashMap<Uuid, DictionaryState>,
    private_words: HashMap<String, HashMap<Uuid, Word>>,
    watchers: HashMap<Uuid, Vec<mpsc::UnboundedSender<DictionaryState>>>,
}

impl BackendState {
    fn ensure_online(&self) -> Result<(), RemoteError> {
        if self.offline {
            return Err(RemoteError::Network("remote store unreachable".to_string()));
        }
        Ok(())
    }

    fn dictionary(&self, id: Uuid) -> Result<&DictionaryState, RemoteError> {
        self.dictionaries
            .get(&id)
            .ok_or_else(|| RemoteError::NotFound(format!("dictionary {id}")))
    }

    fn dictionary_mut(&mut self, id: Uuid) -> Result<&mut DictionaryState, RemoteError> {
        self.dictionaries
            .get_mut(&id)
            .ok_or_else(|| RemoteError::NotFound(format!("dictionary {id}")))
    }

    /// Push the current state to every live watcher, dropping closed ones.
    fn publish(&mut self, id: Uuid) {
        let Some(state) = self.dictionaries.get(&id) else {
            return;
        };
        if let Some(watchers) = self.watchers.get_mut(&id) {
            watchers.retain(|watcher| watcher.send(state.clone()).is_ok());
        }
    }
}

fn forbidden(err: PermissionError) -> RemoteError {
    RemoteError::Forbidden(err.to_string())
}

fn word_mut(state: &mut DictionaryState, word_id: Uuid) -> Result<&mut SharedWord, RemoteError> {
    state
        .words
        .iter_mut()
        .find(|word| word.id == word_id)
        .ok_or_else(|| RemoteError::NotFound(format!("word {word_id}")))
}

/// Shared in-memory server state.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<BackendState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store handle acting as `user`.
    pub fn store_for(&self, user: CurrentUser) -> MemoryRemoteStore {
        MemoryRemoteStore {
            backend: self.clone(),
            user,
        }
    }

    /// While offline every call fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn dictionary_state(&self, id: Uuid) -> Option<DictionaryState> {
        self.lock().dictionaries.get(&id).cloned()
    }

    pub fn private_words(&self, email: &str) -> Vec<Word> {
        let mut words: Vec<Word> = self
            .lock()
            .private_words
            .get(email)
            .map(|words| words.values().cloned().collect())
            .unwrap_or_default();
        words.sort_by_key(|word| (word.created_at, word.id));
        words
    }

    /// Number of open subscriptions on a dictionary.
    pub fn watcher_count(&self, id: Uuid) -> usize {
        let mut state = self.lock();
        state
            .watchers
            .get_mut(&id)
            .map(|watchers| {
                watchers.retain(|watcher| !watcher.is_closed());
                watchers.len()
            })
            .unwrap_or(0)
    }

    /// Close every subscription on a dictionary, as a dropped connection would.
    pub fn disconnect_watchers(&self, id: Uuid) {
        self.lock().watchers.remove(&id);
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// [`RemoteStore`] over a [`MemoryBackend`], bound to one user.
#[derive(Clone)]
pub struct MemoryRemoteStore {
    backend: MemoryBackend,
    user: CurrentUser,
}

impl MemoryRemoteStore {
    pub fn user(&self) -> &CurrentUser {
        &self.user
    }

    fn email(&self) -> &str {
        &self.user.email
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn create_dictionary(&self, name: &str) -> Result<SharedDictionary, RemoteError> {
        let mut state = self.backend.lock();
        state.ensure_online()?;
        let dictionary = SharedDictionary::new(name, self.email());
        state.dictionaries.insert(
            dictionary.id,
            DictionaryState {
                dictionary: dictionary.clone(),
                words: Vec::new(),
            },
        );
        Ok(dictionary)
    }

    async fn fetch_dictionary(&self, dictionary_id: Uuid) -> Result<DictionaryState, RemoteError> {
        let state = self.backend.lock();
        state.ensure_online()?;
        let current = state.dictionary(dictionary_id)?;
        permissions::authorize(&current.dictionary, self.email(), Action::React).map_err(forbidden)?;
        Ok(current.clone())
    }

    async fn delete_dictionary(&self, dictionary_id: Uuid) -> Result<(), RemoteError> {
        let mut state = self.backend.lock();
        state.ensure_online()?;
        let current = state.dictionary(dictionary_id)?;
        permissions::authorize(&current.dictionary, self.email(), Action::DeleteDictionary)
            .map_err(forbidden)?;
        state.dictionaries.remove(&dictionary_id);
        state.watchers.remove(&dictionary_id);
        Ok(())
    }

    async fn set_collaborator(
        &self,
        dictionary_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<(), RemoteError> {
        let email = normalize_email(email);
        let mut state = self.backend.lock();
        state.ensure_online()?;
        let current = state.dictionary_mut(dictionary_id)?;
        let check = if current.dictionary.role_of(&email).is_some() {
            permissions::check_update_role(&current.dictionary, &self.user.email, &email, role)
        } else {
            permissions::check_add_collaborator(&current.dictionary, &self.user.email, role)
        };
        check.map_err(forbidden)?;
        current.dictionary.collaborators.insert(email, role);
        state.publish(dictionary_id);
        Ok(())
    }

    async fn remove_collaborator(&self, dictionary_id: Uuid, email: &str) -> Result<(), RemoteError> {
        let email = normalize_email(email);
        let mut state = self.backend.lock();
        state.ensure_online()?;
        let current = state.dictionary_mut(dictionary_id)?;
        permissions::check_remove_collaborator(&current.dictionary, &self.user.email, &email)
            .map_err(forbidden)?;
        current.dictionary.collaborators.remove(&email);
        state.publish(dictionary_id);
        Ok(())
    }

    async fn add_word(&self, dictionary_id: Uuid, draft: &WordDraft) -> Result<SharedWord, RemoteError> {
        let mut state = self.backend.lock();
        state.ensure_online()?;
        let current = state.dictionary_mut(dictionary_id)?;
        permissions::authorize(&current.dictionary, &self.user.email, Action::EditWords)
            .map_err(forbidden)?;
        let word = SharedWord {
            id: Uuid::new_v4(),
            dictionary_id,
            text: draft.text.clone(),
            definition: draft.definition.clone(),
            examples: draft.examples.clone(),
            added_by_email: self.user.email.clone(),
            added_by_display_name: self.user.display_name.clone(),
            created_at: Utc::now(),
            likes: Default::default(),
            difficulties: Default::default(),
        };
        current.words.push(word.clone());
        state.publish(dictionary_id);
        Ok(word)
    }

    async fn update_word(
        &self,
        dictionary_id: Uuid,
        word_id: Uuid,
        draft: &WordDraft,
    ) -> Result<(), RemoteError> {
        let mut state = self.backend.lock();
        state.ensure_online()?;
        let current = state.dictionary_mut(dictionary_id)?;
        permissions::authorize(&current.dictionary, &self.user.email, Action::EditWords)
            .map_err(forbidden)?;
        let word = word_mut(current, word_id)?;
        word.text = draft.text.clone();
        word.definition = draft.definition.clone();
        word.examples = draft.examples.clone();
        state.publish(dictionary_id);
        Ok(())
    }

    async fn delete_word(&self, dictionary_id: Uuid, word_id: Uuid) -> Result<(), RemoteError> {
        let mut state = self.backend.lock();
        state.ensure_online()?;
        let current = state.dictionary_mut(dictionary_id)?;
        permissions::authorize(&current.dictionary, &self.user.email, Action::EditWords)
            .map_err(forbidden)?;
        let before = current.words.len();
        current.words.retain(|word| word.id != word_id);
        if current.words.len() == before {
            return Err(RemoteError::NotFound(format!("word {word_id}")));
        }
        state.publish(dictionary_id);
        Ok(())
    }

    async fn update_word_field(
        &self,
        dictionary_id: Uuid,
        word_id: Uuid,
        update: &FieldUpdate,
    ) -> Result<(), RemoteError> {
        if update.email() != self.email() {
            return Err(RemoteError::Forbidden(format!(
                "{} may not write {}",
                self.email(),
                update.field_path()
            )));
        }
        let mut state = self.backend.lock();
        state.ensure_online()?;
        let current = state.dictionary_mut(dictionary_id)?;
        permissions::authorize(&current.dictionary, &self.user.email, Action::React)
            .map_err(forbidden)?;
        update.apply_to(word_mut(current, word_id)?);
        state.publish(dictionary_id);
        Ok(())
    }

    async fn watch_dictionary(&self, dictionary_id: Uuid) -> Result<DictionaryUpdates, RemoteError> {
        let mut state = self.backend.lock();
        state.ensure_online()?;
        let current = state.dictionary(dictionary_id)?;
        permissions::authorize(&current.dictionary, self.email(), Action::React).map_err(forbidden)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        // The receiver is alive, so the initial send cannot fail.
        let _ = sender.send(current.clone());
        state.watchers.entry(dictionary_id).or_default().push(sender);
        Ok(receiver)
    }

    async fn list_private_words(&self) -> Result<Vec<Word>, RemoteError> {
        self.backend.lock().ensure_online()?;
        Ok(self.backend.private_words(self.email()))
    }

    async fn upsert_private_word(&self, word: &Word) -> Result<(), RemoteError> {
        let mut state = self.backend.lock();
        state.ensure_online()?;
        state
            .private_words
            .entry(self.user.email.clone())
            .or_default()
            .insert(word.id, word.clone());
        Ok(())
    }

    async fn delete_private_word(&self, word_id: Uuid) -> Result<(), RemoteError> {
        let mut state = self.backend.lock();
        state.ensure_online()?;
        let removed = state
            .private_words
            .get_mut(self.email())
            .and_then(|words| words.remove(&word_id));
        match removed {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(format!("word {word_id}"))),
        }
    }
}
