//! Sync reconciler.
//!
//! Private words live in SQLite and are pushed to the remote store in the background:
//! `LocalDirty -> PushPending -> Synced`, falling back to `LocalDirty` when a push fails.
//! Shared-word difficulties are written as single field paths; the new value is shown
//! immediately through the [`PendingDifficulties`] overlay and stays there until the remote
//! store echoes it back.

pub mod overlay;

use chrono::Utc;
use lexicon_core::{apply_delta, FieldUpdate, SharedWord, Word};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{self, DbError, SharedRepository, SyncRepository, WordRepository};
use crate::identity::CurrentUser;
use crate::remote::{RemoteError, RemoteStore};
use crate::shared::SharedDictionaryService;

pub use overlay::{FailedWrite, PendingDifficulties, PendingDifficulty, PendingStatus};

/// Sync errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Remote write to {path} failed: {message}")]
    Write { path: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Sync already in progress")]
    AlreadyInProgress,
}

/// Sync status for UI.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum SyncStatus {
    Idle,
    Pushing { count: usize },
    Pulling,
    Completed { synced_at: String, stats: SyncStats },
    Failed { error: String },
}

/// Sync statistics.
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub words_pushed: usize,
    pub words_failed: usize,
    pub deletes_pushed: usize,
    pub words_pulled: usize,
    pub shared_writes: usize,
    pub shared_write_failures: usize,
}

/// Inner state shared across clones.
struct SyncReconcilerInner {
    remote: Arc<dyn RemoteStore>,
    repository: SharedRepository,
    shared: SharedDictionaryService,
    user: CurrentUser,
    status: Mutex<SyncStatus>,
    stats: Mutex<SyncStats>,
    wakeup: Notify,
}

/// Moves local changes to the remote store and back.
///
/// Clone-able; every clone drives the same state.
#[derive(Clone)]
pub struct SyncReconciler {
    inner: Arc<SyncReconcilerInner>,
}

impl SyncReconciler {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        repository: SharedRepository,
        shared: SharedDictionaryService,
        user: CurrentUser,
    ) -> Self {
        Self {
            inner: Arc::new(SyncReconcilerInner {
                remote,
                repository,
                shared,
                user,
                status: Mutex::new(SyncStatus::Idle),
                stats: Mutex::new(SyncStats::default()),
                wakeup: Notify::new(),
            }),
        }
    }

    /// Get current sync status.
    pub async fn status(&self) -> SyncStatus {
        self.inner.status.lock().await.clone()
    }

    /// Totals since the reconciler was created.
    pub async fn stats(&self) -> SyncStats {
        self.inner.stats.lock().await.clone()
    }

    pub fn repository(&self) -> &SharedRepository {
        &self.inner.repository
    }

    // === Private words ===

    /// Apply a score delta to a private word. Local and synchronous; the push happens later.
    pub fn record_private_score(&self, word_id: Uuid, delta: i32) -> Result<Word, SyncError> {
        let word = {
            let repo = db::lock(&self.inner.repository);
            let current = repo.get_word(word_id)?.ok_or(DbError::WordNotFound(word_id))?;
            repo.record_attempt(word_id, apply_delta(current.difficulty_score, delta))?
        };
        debug!(%word_id, score = word.difficulty_score, "Recorded private score");
        self.inner.wakeup.notify_one();
        Ok(word)
    }

    /// Save a created or edited private word and queue it for push.
    pub fn save_private_word(&self, word: &Word) -> Result<(), SyncError> {
        db::lock(&self.inner.repository).save_word(word)?;
        self.inner.wakeup.notify_one();
        Ok(())
    }

    /// Delete a private word locally and queue the remote delete.
    pub fn delete_private_word(&self, word_id: Uuid) -> Result<bool, SyncError> {
        let deleted = db::lock(&self.inner.repository).delete_word(word_id)?;
        if deleted {
            self.inner.wakeup.notify_one();
        }
        Ok(deleted)
    }

    /// Push every dirty word and queued delete. Individual failures leave the word dirty and
    /// are counted in the returned stats instead of aborting the run.
    pub async fn push_dirty(&self) -> Result<SyncStats, SyncError> {
        {
            let mut status = self.inner.status.lock().await;
            if matches!(*status, SyncStatus::Pushing { .. } | SyncStatus::Pulling) {
                return Err(SyncError::AlreadyInProgress);
            }
            *status = SyncStatus::Pushing { count: 0 };
        }

        let result = self.push_dirty_inner().await;
        self.finish(&result).await;
        result
    }

    async fn push_dirty_inner(&self) -> Result<SyncStats, SyncError> {
        let (dirty, deletes) = {
            let repo = db::lock(&self.inner.repository);
            (repo.get_dirty_words()?, repo.get_pending_deletes()?)
        };
        self.set_status(SyncStatus::Pushing {
            count: dirty.len() + deletes.len(),
        })
        .await;

        let mut run = SyncStats::default();
        for word in dirty {
            db::lock(&self.inner.repository).mark_push_pending(word.id)?;
            match self.inner.remote.upsert_private_word(&word).await {
                Ok(()) => {
                    let synced = db::lock(&self.inner.repository).mark_synced(word.id, Utc::now())?;
                    if synced {
                        run.words_pushed += 1;
                    } else {
                        debug!(word_id = %word.id, "Word changed during push; keeping it dirty");
                    }
                }
                Err(e) => {
                    warn!(word_id = %word.id, "Failed to push word: {}", e);
                    db::lock(&self.inner.repository).revert_push_pending(word.id)?;
                    run.words_failed += 1;
                }
            }
        }

        for word_id in deletes {
            match self.inner.remote.delete_private_word(word_id).await {
                Ok(()) | Err(RemoteError::NotFound(_)) => {
                    db::lock(&self.inner.repository).clear_pending_delete(word_id)?;
                    run.deletes_pushed += 1;
                }
                Err(e) => {
                    warn!(%word_id, "Failed to push delete: {}", e);
                    run.words_failed += 1;
                }
            }
        }

        if run.words_failed == 0 {
            db::lock(&self.inner.repository).update_sync_state(&Utc::now().to_rfc3339())?;
        }

        let mut stats = self.inner.stats.lock().await;
        stats.words_pushed += run.words_pushed;
        stats.words_failed += run.words_failed;
        stats.deletes_pushed += run.deletes_pushed;
        info!(
            pushed = run.words_pushed,
            deleted = run.deletes_pushed,
            failed = run.words_failed,
            "Private word push finished"
        );
        Ok(run)
    }

    /// Pull the remote copy of private words. Words with local changes are left alone.
    pub async fn pull_private_words(&self) -> Result<usize, SyncError> {
        {
            let mut status = self.inner.status.lock().await;
            if matches!(*status, SyncStatus::Pushing { .. } | SyncStatus::Pulling) {
                return Err(SyncError::AlreadyInProgress);
            }
            *status = SyncStatus::Pulling;
        }

        let result = async {
            let words = self.inner.remote.list_private_words().await?;
            let applied = db::lock(&self.inner.repository).upsert_words_from_sync(&words)?;
            self.inner.stats.lock().await.words_pulled += applied;
            info!(received = words.len(), applied, "Pulled private words");
            Ok::<_, SyncError>(applied)
        }
        .await;

        match &result {
            Ok(_) => self.set_status(SyncStatus::Idle).await,
            Err(e) => self.set_status(SyncStatus::Failed { error: e.to_string() }).await,
        }
        result
    }

    /// Background task pushing whenever a private word changes.
    pub fn spawn_push_worker(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                this.inner.wakeup.notified().await;
                match this.push_dirty().await {
                    Ok(_) | Err(SyncError::AlreadyInProgress) => {}
                    Err(e) => warn!("Background push failed: {}", e),
                }
            }
        })
    }

    // === Shared words ===

    /// Apply a delta to the user's own difficulty on a shared word and write that single
    /// field. The new value is visible immediately and kept if the write fails.
    pub async fn submit_shared_difficulty(&self, word: &SharedWord, delta: i32) -> Result<i32, SyncError> {
        let dictionary_id = word.dictionary_id;
        let email = self.inner.user.email.clone();
        let remote_score = self
            .inner
            .shared
            .word(dictionary_id, word.id)
            .unwrap_or_else(|| word.clone())
            .difficulty_for(&email);

        let overlay = self.inner.shared.overlay();
        let score = overlay.record_delta(dictionary_id, word.id, remote_score, delta);
        self.inner.shared.republish(dictionary_id);

        self.write_difficulty(dictionary_id, word.id, score).await?;
        Ok(score)
    }

    /// Fire-and-forget variant of [`submit_shared_difficulty`](Self::submit_shared_difficulty).
    pub fn queue_shared_difficulty(&self, word: SharedWord, delta: i32) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.submit_shared_difficulty(&word, delta).await {
                debug!("Shared difficulty kept locally for retry: {}", e);
            }
        })
    }

    /// Retry every failed shared-difficulty write. Returns how many succeeded.
    pub async fn retry_failed(&self) -> Result<usize, SyncError> {
        let failed = self.inner.shared.overlay().failed();
        if failed.is_empty() {
            return Ok(0);
        }

        let mut succeeded = 0;
        let mut last_error = None;
        for write in failed {
            match self
                .write_difficulty(write.dictionary_id, write.word_id, write.score)
                .await
            {
                Ok(()) => succeeded += 1,
                Err(e) => last_error = Some(e),
            }
        }
        info!(succeeded, "Retried failed shared difficulty writes");
        match last_error {
            Some(e) if succeeded == 0 => Err(e),
            _ => Ok(succeeded),
        }
    }

    async fn write_difficulty(&self, dictionary_id: Uuid, word_id: Uuid, score: i32) -> Result<(), SyncError> {
        let overlay = self.inner.shared.overlay();
        overlay.mark(dictionary_id, word_id, score, PendingStatus::InFlight);

        let update = FieldUpdate::SetDifficulty {
            email: self.inner.user.email.clone(),
            score,
        };
        match self
            .inner
            .remote
            .update_word_field(dictionary_id, word_id, &update)
            .await
        {
            Ok(()) => {
                overlay.mark(dictionary_id, word_id, score, PendingStatus::Acknowledged);
                self.inner.stats.lock().await.shared_writes += 1;
                Ok(())
            }
            Err(e) => {
                overlay.mark(dictionary_id, word_id, score, PendingStatus::Failed);
                self.inner.stats.lock().await.shared_write_failures += 1;
                let path = update.document_path(dictionary_id, word_id);
                warn!("Shared difficulty write to {} failed: {}", path, e);
                Err(SyncError::Write {
                    path,
                    message: e.to_string(),
                })
            }
        }
    }

    // === Private methods ===

    async fn set_status(&self, status: SyncStatus) {
        *self.inner.status.lock().await = status;
    }

    async fn finish(&self, result: &Result<SyncStats, SyncError>) {
        let status = match result {
            Ok(stats) => SyncStatus::Completed {
                synced_at: Utc::now().to_rfc3339(),
                stats: stats.clone(),
            },
            Err(e) => SyncStatus::Failed { error: e.to_string() },
        };
        self.set_status(status).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteRepository;
    use crate::remote::MemoryBackend;
    use lexicon_core::{SyncState, WordDraft};
    use pretty_assertions::assert_eq;

    const ME: &str = "ana@example.com";

    struct Fixture {
        backend: MemoryBackend,
        shared: SharedDictionaryService,
        sync: SyncReconciler,
    }

    fn fixture() -> Fixture {
        let backend = MemoryBackend::new();
        let user = CurrentUser::new(ME, "Ana");
        let remote: Arc<dyn RemoteStore> = Arc::new(backend.store_for(user.clone()));
        let shared = SharedDictionaryService::new(
            remote.clone(),
            user.clone(),
            Arc::new(PendingDifficulties::new(ME)),
        );
        let repository = db::shared(SqliteRepository::open_in_memory().unwrap());
        let sync = SyncReconciler::new(remote, repository, shared.clone(), user);
        Fixture { backend, shared, sync }
    }

    #[tokio::test]
    async fn push_moves_dirty_words_to_synced() {
        let fx = fixture();
        let word = Word::new("Apfel", "apple", "de");
        fx.sync.save_private_word(&word).unwrap();

        let stats = fx.sync.push_dirty().await.unwrap();
        assert_eq!(stats.words_pushed, 1);

        let stored = db::lock(fx.sync.repository()).get_word(word.id).unwrap().unwrap();
        assert_eq!(stored.sync_state, SyncState::Synced);
        assert_eq!(fx.backend.private_words(ME).len(), 1);
    }

    #[tokio::test]
    async fn failed_push_keeps_word_dirty() {
        let fx = fixture();
        let word = Word::new("Birne", "pear", "de");
        fx.sync.save_private_word(&word).unwrap();
        fx.sync.record_private_score(word.id, 5).unwrap();

        fx.backend.set_offline(true);
        let stats = fx.sync.push_dirty().await.unwrap();
        assert_eq!(stats.words_failed, 1);

        let stored = db::lock(fx.sync.repository()).get_word(word.id).unwrap().unwrap();
        assert_eq!(stored.sync_state, SyncState::LocalDirty);
        assert_eq!(stored.difficulty_score, 5);

        fx.backend.set_offline(false);
        assert_eq!(fx.sync.push_dirty().await.unwrap().words_pushed, 1);
    }

    #[tokio::test]
    async fn private_score_saturates() {
        let fx = fixture();
        let word = Word::new("Kirsche", "cherry", "de");
        fx.sync.save_private_word(&word).unwrap();
        for _ in 0..30 {
            fx.sync.record_private_score(word.id, 5).unwrap();
        }
        let stored = db::lock(fx.sync.repository()).get_word(word.id).unwrap().unwrap();
        assert_eq!(stored.difficulty_score, lexicon_core::MAX_SCORE);
        assert_eq!(stored.attempt_count, 30);
    }

    #[tokio::test]
    async fn deletes_are_pushed_once() {
        let fx = fixture();
        let word = Word::new("Traube", "grape", "de");
        fx.sync.save_private_word(&word).unwrap();
        fx.sync.push_dirty().await.unwrap();

        assert!(fx.sync.delete_private_word(word.id).unwrap());
        let stats = fx.sync.push_dirty().await.unwrap();
        assert_eq!(stats.deletes_pushed, 1);
        assert!(fx.backend.private_words(ME).is_empty());
        assert!(db::lock(fx.sync.repository()).get_pending_deletes().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pull_skips_dirty_words() {
        let fx = fixture();
        let word = Word::new("Zitrone", "lemon", "de");
        fx.sync.save_private_word(&word).unwrap();
        fx.sync.push_dirty().await.unwrap();
        fx.sync.record_private_score(word.id, -2).unwrap();

        assert_eq!(fx.sync.pull_private_words().await.unwrap(), 0);
        let stored = db::lock(fx.sync.repository()).get_word(word.id).unwrap().unwrap();
        assert_eq!(stored.difficulty_score, -2);
    }

    #[tokio::test]
    async fn failed_shared_write_is_retried() {
        let fx = fixture();
        let dictionary = fx.shared.create_dictionary("Deutsch").await.unwrap();
        let word = fx
            .shared
            .add_word(dictionary.id, &WordDraft::new("Hund", "dog"))
            .await
            .unwrap();

        fx.backend.set_offline(true);
        let err = fx.sync.submit_shared_difficulty(&word, 5).await.unwrap_err();
        match err {
            SyncError::Write { path, .. } => {
                assert_eq!(
                    path,
                    format!("dictionaries/{}/words/{}/difficulties/{ME}", dictionary.id, word.id)
                );
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fx.shared.overlay().failed().len(), 1);

        fx.backend.set_offline(false);
        assert_eq!(fx.sync.retry_failed().await.unwrap(), 1);
        let state = fx.backend.dictionary_state(dictionary.id).unwrap();
        assert_eq!(state.words[0].difficulty_for(ME), 5);
    }
}
