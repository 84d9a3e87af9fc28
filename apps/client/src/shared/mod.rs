//! Shared dictionary service.
//!
//! Keeps live subscriptions to shared dictionaries and publishes one snapshot per dictionary
//! through a `watch` channel. Remote deliveries arrive on per-subscription forwarding tasks
//! and are funnelled into a single update loop, which is the only place snapshots are
//! published. A subscription is tagged with a generation; deliveries from a replaced
//! subscription are dropped by the loop.
//!
//! While paused, deliveries are still received but only the newest state per dictionary is
//! kept. Resuming publishes that state and reopens any subscription whose stream has died.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lexicon_core::permissions::{self, Action};
use lexicon_core::{
    DictionaryState, FieldUpdate, MasteryLevel, PermissionError, Role, SharedDictionary,
    SharedWord, WordDraft,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::identity::{normalize_email, CurrentUser};
use crate::remote::{DictionaryUpdates, RemoteError, RemoteStore};
use crate::sync::overlay::PendingDifficulties;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Permission(#[from] PermissionError),

    #[error("not subscribed to dictionary {0}")]
    NotSubscribed(Uuid),

    #[error("{0} is already a collaborator")]
    AlreadyCollaborator(String),

    #[error("word not found: {0}")]
    WordNotFound(Uuid),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
}

/// Published view of one dictionary. The user's pending difficulties are already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct DictionarySnapshot {
    /// Increases by one with every publish for this dictionary.
    pub revision: u64,
    pub dictionary: SharedDictionary,
    pub words: Vec<SharedWord>,
}

impl DictionarySnapshot {
    pub fn word(&self, word_id: Uuid) -> Option<&SharedWord> {
        self.words.iter().find(|word| word.id == word_id)
    }
}

pub type SnapshotReceiver = watch::Receiver<Option<DictionarySnapshot>>;

enum Delivery {
    Remote {
        dictionary_id: Uuid,
        generation: u64,
        state: DictionaryState,
    },
    Republish {
        dictionary_id: Uuid,
    },
    Flush,
}

struct Subscription {
    generation: u64,
    forwarder: JoinHandle<()>,
    publisher: watch::Sender<Option<DictionarySnapshot>>,
    /// Newest remote state, before the overlay.
    latest: Option<DictionaryState>,
    /// Newer state than the published one is waiting (set while paused).
    dirty: bool,
    revision: u64,
}

#[derive(Default)]
struct Registry {
    paused: bool,
    subscriptions: HashMap<Uuid, Subscription>,
}

impl Registry {
    fn publish(&mut self, dictionary_id: Uuid, overlay: &PendingDifficulties) {
        let Some(subscription) = self.subscriptions.get_mut(&dictionary_id) else {
            return;
        };
        let Some(state) = &subscription.latest else {
            return;
        };
        let mut words = state.words.clone();
        overlay.apply(dictionary_id, &mut words);
        subscription.revision += 1;
        subscription.dirty = false;
        subscription.publisher.send_replace(Some(DictionarySnapshot {
            revision: subscription.revision,
            dictionary: state.dictionary.clone(),
            words,
        }));
    }

    fn handle(&mut self, delivery: Delivery, overlay: &PendingDifficulties) {
        match delivery {
            Delivery::Remote {
                dictionary_id,
                generation,
                state,
            } => {
                let paused = self.paused;
                let Some(subscription) = self.subscriptions.get_mut(&dictionary_id) else {
                    return;
                };
                if subscription.generation != generation {
                    debug!(%dictionary_id, generation, "Dropping delivery from replaced subscription");
                    return;
                }
                overlay.observe_remote(dictionary_id, &state.words);
                subscription.latest = Some(state);
                if paused {
                    subscription.dirty = true;
                } else {
                    self.publish(dictionary_id, overlay);
                }
            }
            Delivery::Republish { dictionary_id } => {
                if self.paused {
                    if let Some(subscription) = self.subscriptions.get_mut(&dictionary_id) {
                        subscription.dirty = true;
                    }
                } else {
                    self.publish(dictionary_id, overlay);
                }
            }
            Delivery::Flush => {
                if self.paused {
                    return;
                }
                let dirty: Vec<Uuid> = self
                    .subscriptions
                    .iter()
                    .filter(|(_, subscription)| subscription.dirty)
                    .map(|(id, _)| *id)
                    .collect();
                for dictionary_id in dirty {
                    self.publish(dictionary_id, overlay);
                }
            }
        }
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_update_loop(
    registry: Arc<Mutex<Registry>>,
    overlay: Arc<PendingDifficulties>,
    mut deliveries: mpsc::UnboundedReceiver<Delivery>,
) {
    while let Some(delivery) = deliveries.recv().await {
        lock(&registry).handle(delivery, &overlay);
    }
    debug!("Shared dictionary update loop stopped");
}

fn spawn_forwarder(
    dictionary_id: Uuid,
    generation: u64,
    mut updates: DictionaryUpdates,
    deliveries: mpsc::UnboundedSender<Delivery>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(state) = updates.recv().await {
            let delivery = Delivery::Remote {
                dictionary_id,
                generation,
                state,
            };
            if deliveries.send(delivery).is_err() {
                return;
            }
        }
        debug!(%dictionary_id, generation, "Remote subscription closed");
    })
}

struct ServiceInner {
    remote: Arc<dyn RemoteStore>,
    user: CurrentUser,
    overlay: Arc<PendingDifficulties>,
    registry: Arc<Mutex<Registry>>,
    deliveries: mpsc::UnboundedSender<Delivery>,
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        // Forwarders hold delivery senders; stopping them lets the update loop exit.
        for subscription in lock(&self.registry).subscriptions.values() {
            subscription.forwarder.abort();
        }
    }
}

/// Live view over the user's shared dictionaries plus role-checked mutations.
///
/// Clone-able; all clones share the same subscriptions. Must be created inside a Tokio runtime.
#[derive(Clone)]
pub struct SharedDictionaryService {
    inner: Arc<ServiceInner>,
}

impl SharedDictionaryService {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        user: CurrentUser,
        overlay: Arc<PendingDifficulties>,
    ) -> Self {
        let registry = Arc::new(Mutex::new(Registry::default()));
        let (deliveries, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_update_loop(registry.clone(), overlay.clone(), receiver));

        Self {
            inner: Arc::new(ServiceInner {
                remote,
                user,
                overlay,
                registry,
                deliveries,
            }),
        }
    }

    pub fn user(&self) -> &CurrentUser {
        &self.inner.user
    }

    // === Subscriptions ===

    /// Subscribe to a dictionary. Subscribing again replaces the previous remote
    /// subscription; the returned receiver keeps observing the same snapshot stream.
    pub async fn subscribe(&self, dictionary_id: Uuid) -> Result<SnapshotReceiver, ServiceError> {
        let updates = self.inner.remote.watch_dictionary(dictionary_id).await?;

        let mut registry = lock(&self.inner.registry);
        if let Some(subscription) = registry.subscriptions.get_mut(&dictionary_id) {
            subscription.forwarder.abort();
            subscription.generation += 1;
            subscription.forwarder = spawn_forwarder(
                dictionary_id,
                subscription.generation,
                updates,
                self.inner.deliveries.clone(),
            );
            info!(%dictionary_id, generation = subscription.generation, "Replaced dictionary subscription");
            return Ok(subscription.publisher.subscribe());
        }

        let (publisher, receiver) = watch::channel(None);
        let forwarder = spawn_forwarder(dictionary_id, 0, updates, self.inner.deliveries.clone());
        registry.subscriptions.insert(
            dictionary_id,
            Subscription {
                generation: 0,
                forwarder,
                publisher,
                latest: None,
                dirty: false,
                revision: 0,
            },
        );
        info!(%dictionary_id, "Subscribed to dictionary");
        Ok(receiver)
    }

    /// Stop listening to a dictionary. Snapshot receivers see the channel close.
    pub fn unsubscribe(&self, dictionary_id: Uuid) -> bool {
        match lock(&self.inner.registry).subscriptions.remove(&dictionary_id) {
            Some(subscription) => {
                subscription.forwarder.abort();
                info!(%dictionary_id, "Unsubscribed from dictionary");
                true
            }
            None => false,
        }
    }

    /// Receiver for an existing subscription.
    pub fn snapshots(&self, dictionary_id: Uuid) -> Option<SnapshotReceiver> {
        lock(&self.inner.registry)
            .subscriptions
            .get(&dictionary_id)
            .map(|subscription| subscription.publisher.subscribe())
    }

    /// Stop publishing; deliveries are coalesced until [`resume_all`](Self::resume_all).
    /// Pausing twice is the same as pausing once.
    pub fn pause_all(&self) {
        let mut registry = lock(&self.inner.registry);
        if !registry.paused {
            registry.paused = true;
            info!("Paused shared dictionary updates");
        }
    }

    /// Resume publishing and publish the newest state buffered while paused.
    pub fn resume_deliveries(&self) {
        {
            let mut registry = lock(&self.inner.registry);
            if registry.paused {
                registry.paused = false;
                info!("Resumed shared dictionary updates");
            }
        }
        let _ = self.inner.deliveries.send(Delivery::Flush);
    }

    /// Resume publishing and reopen subscriptions whose stream has ended. Resuming while
    /// running only revives dead streams.
    pub async fn resume_all(&self) -> Result<(), ServiceError> {
        self.resume_deliveries();
        let dead: Vec<Uuid> = lock(&self.inner.registry)
            .subscriptions
            .iter()
            .filter(|(_, subscription)| subscription.forwarder.is_finished())
            .map(|(id, _)| *id)
            .collect();

        let mut first_error = None;
        for dictionary_id in dead {
            warn!(%dictionary_id, "Reopening closed dictionary subscription");
            if let Err(e) = self.subscribe(dictionary_id).await {
                warn!(%dictionary_id, "Failed to reopen subscription: {}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.inner.registry).paused
    }

    /// Republish a dictionary so a changed overlay becomes visible.
    pub fn republish(&self, dictionary_id: Uuid) {
        let _ = self.inner.deliveries.send(Delivery::Republish { dictionary_id });
    }

    // === Reads ===

    pub fn snapshot(&self, dictionary_id: Uuid) -> Option<DictionarySnapshot> {
        lock(&self.inner.registry)
            .subscriptions
            .get(&dictionary_id)
            .and_then(|subscription| subscription.publisher.borrow().clone())
    }

    /// Words as last published, or empty when nothing has been published yet.
    pub fn words(&self, dictionary_id: Uuid) -> Vec<SharedWord> {
        self.snapshot(dictionary_id)
            .map(|snapshot| snapshot.words)
            .unwrap_or_default()
    }

    pub fn word(&self, dictionary_id: Uuid, word_id: Uuid) -> Option<SharedWord> {
        let registry = lock(&self.inner.registry);
        let subscription = registry.subscriptions.get(&dictionary_id)?;
        let snapshot = subscription.publisher.borrow();
        snapshot.as_ref()?.word(word_id).cloned()
    }

    /// Difficulty `email` has recorded on `word`; 0 when they never attempted it.
    pub fn get_difficulty_for(&self, word: &SharedWord, email: &str) -> i32 {
        word.difficulty_for(&normalize_email(email))
    }

    pub fn mastery_for(&self, word: &SharedWord, email: &str) -> MasteryLevel {
        word.mastery_for(&normalize_email(email))
    }

    /// Newest raw dictionary metadata: the subscription's copy, otherwise a fresh fetch.
    async fn current_dictionary(&self, dictionary_id: Uuid) -> Result<SharedDictionary, ServiceError> {
        let cached = lock(&self.inner.registry)
            .subscriptions
            .get(&dictionary_id)
            .and_then(|subscription| subscription.latest.as_ref())
            .map(|state| state.dictionary.clone());
        match cached {
            Some(dictionary) => Ok(dictionary),
            None => Ok(self.inner.remote.fetch_dictionary(dictionary_id).await?.dictionary),
        }
    }

    async fn current_word(&self, dictionary_id: Uuid, word_id: Uuid) -> Result<SharedWord, ServiceError> {
        if let Some(word) = self.word(dictionary_id, word_id) {
            return Ok(word);
        }
        self.inner
            .remote
            .fetch_dictionary(dictionary_id)
            .await?
            .words
            .into_iter()
            .find(|word| word.id == word_id)
            .ok_or(ServiceError::WordNotFound(word_id))
    }

    // === Mutations ===

    pub async fn create_dictionary(&self, name: &str) -> Result<SharedDictionary, ServiceError> {
        let dictionary = self.inner.remote.create_dictionary(name.trim()).await?;
        info!(dictionary_id = %dictionary.id, "Created shared dictionary {}", dictionary.name);
        Ok(dictionary)
    }

    pub async fn delete_dictionary(&self, dictionary_id: Uuid) -> Result<(), ServiceError> {
        let dictionary = self.current_dictionary(dictionary_id).await?;
        permissions::authorize(&dictionary, &self.inner.user.email, Action::DeleteDictionary)?;
        self.inner.remote.delete_dictionary(dictionary_id).await?;
        self.unsubscribe(dictionary_id);
        info!(%dictionary_id, "Deleted shared dictionary");
        Ok(())
    }

    pub async fn add_collaborator(
        &self,
        dictionary_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<(), ServiceError> {
        let email = normalize_email(email);
        let dictionary = self.current_dictionary(dictionary_id).await?;
        permissions::check_add_collaborator(&dictionary, &self.inner.user.email, role)?;
        if dictionary.role_of(&email).is_some() {
            return Err(ServiceError::AlreadyCollaborator(email));
        }
        self.inner
            .remote
            .set_collaborator(dictionary_id, &email, role)
            .await?;
        info!(%dictionary_id, "Added collaborator {} as {}", email, role);
        Ok(())
    }

    pub async fn update_collaborator_role(
        &self,
        dictionary_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<(), ServiceError> {
        let email = normalize_email(email);
        let dictionary = self.current_dictionary(dictionary_id).await?;
        permissions::check_update_role(&dictionary, &self.inner.user.email, &email, role)?;
        self.inner
            .remote
            .set_collaborator(dictionary_id, &email, role)
            .await?;
        info!(%dictionary_id, "Changed role of {} to {}", email, role);
        Ok(())
    }

    pub async fn remove_collaborator(&self, dictionary_id: Uuid, email: &str) -> Result<(), ServiceError> {
        let email = normalize_email(email);
        let dictionary = self.current_dictionary(dictionary_id).await?;
        permissions::check_remove_collaborator(&dictionary, &self.inner.user.email, &email)?;
        self.inner
            .remote
            .remove_collaborator(dictionary_id, &email)
            .await?;
        info!(%dictionary_id, "Removed collaborator {}", email);
        if email == self.inner.user.email {
            self.unsubscribe(dictionary_id);
        }
        Ok(())
    }

    pub async fn add_word(&self, dictionary_id: Uuid, draft: &WordDraft) -> Result<SharedWord, ServiceError> {
        let dictionary = self.current_dictionary(dictionary_id).await?;
        permissions::authorize(&dictionary, &self.inner.user.email, Action::EditWords)?;
        let word = self.inner.remote.add_word(dictionary_id, draft).await?;
        debug!(%dictionary_id, word_id = %word.id, "Added shared word");
        Ok(word)
    }

    pub async fn update_word(
        &self,
        dictionary_id: Uuid,
        word_id: Uuid,
        draft: &WordDraft,
    ) -> Result<(), ServiceError> {
        let dictionary = self.current_dictionary(dictionary_id).await?;
        permissions::authorize(&dictionary, &self.inner.user.email, Action::EditWords)?;
        self.inner
            .remote
            .update_word(dictionary_id, word_id, draft)
            .await?;
        Ok(())
    }

    pub async fn delete_word(&self, dictionary_id: Uuid, word_id: Uuid) -> Result<(), ServiceError> {
        let dictionary = self.current_dictionary(dictionary_id).await?;
        permissions::authorize(&dictionary, &self.inner.user.email, Action::EditWords)?;
        self.inner.remote.delete_word(dictionary_id, word_id).await?;
        Ok(())
    }

    /// Flip the user's like on a word. Returns whether the word is now liked.
    pub async fn toggle_like(&self, dictionary_id: Uuid, word_id: Uuid) -> Result<bool, ServiceError> {
        let dictionary = self.current_dictionary(dictionary_id).await?;
        permissions::authorize(&dictionary, &self.inner.user.email, Action::React)?;
        let word = self.current_word(dictionary_id, word_id).await?;
        let liked = !word.is_liked_by(&self.inner.user.email);
        let update = FieldUpdate::SetLike {
            email: self.inner.user.email.clone(),
            liked,
        };
        self.inner
            .remote
            .update_word_field(dictionary_id, word_id, &update)
            .await?;
        Ok(liked)
    }

    pub(crate) fn overlay(&self) -> &PendingDifficulties {
        &self.inner.overlay
    }
}
