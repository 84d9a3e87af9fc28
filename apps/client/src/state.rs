//! Application state.

use std::sync::Arc;

use lexicon_core::{QuizPreset, QuizType};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::db::{self, DbError, SharedRepository, SqliteRepository, SyncRepository};
use crate::identity::CurrentUser;
use crate::quiz::{QuizError, QuizSessionCoordinator, StoreItemPool};
use crate::remote::RemoteStore;
use crate::shared::SharedDictionaryService;
use crate::sync::{PendingDifficulties, SyncError, SyncReconciler, SyncStats};

/// Global application state. Must be created inside a Tokio runtime.
pub struct AppState {
    pub user: CurrentUser,
    pub repository: SharedRepository,
    pub remote: Arc<dyn RemoteStore>,
    pub shared: SharedDictionaryService,
    pub sync: SyncReconciler,
    quiz_seed: Option<u64>,
    push_worker: JoinHandle<()>,
}

impl AppState {
    pub fn new(
        user: CurrentUser,
        repository: SqliteRepository,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Self, DbError> {
        let interrupted = repository.reset_interrupted_pushes()?;
        if interrupted > 0 {
            info!(interrupted, "Requeued words from an interrupted push");
        }

        let repository = db::shared(repository);
        let overlay = Arc::new(PendingDifficulties::new(user.email.clone()));
        let shared = SharedDictionaryService::new(remote.clone(), user.clone(), overlay);
        let sync = SyncReconciler::new(remote.clone(), repository.clone(), shared.clone(), user.clone());
        let push_worker = sync.spawn_push_worker();

        Ok(Self {
            user,
            repository,
            remote,
            shared,
            sync,
            quiz_seed: None,
            push_worker,
        })
    }

    /// Fix the seed used for item selection.
    pub fn with_quiz_seed(mut self, seed: Option<u64>) -> Self {
        self.quiz_seed = seed;
        self
    }

    /// Seed for the next quiz: the configured one, or a fresh random seed.
    pub fn next_quiz_seed(&self) -> u64 {
        self.quiz_seed.unwrap_or_else(rand::random)
    }

    pub fn item_pool(&self) -> StoreItemPool {
        StoreItemPool::new(self.repository.clone(), self.shared.clone())
    }

    /// Start a quiz. Shared dictionary updates are held back until the session ends, so the
    /// words under test do not change mid-session.
    pub fn start_quiz(
        &self,
        quiz_type: QuizType,
        preset: &QuizPreset,
        seed: u64,
    ) -> Result<QuizSessionCoordinator, QuizError> {
        let quiz = QuizSessionCoordinator::start(quiz_type, preset, &self.item_pool(), seed, self.sync.clone())?;
        Ok(quiz.hold_shared_updates(self.shared.clone()))
    }

    /// Reopen dead subscriptions after a quiz and flush what it changed.
    pub async fn finish_quiz(&self) -> Result<SyncStats, SyncError> {
        if let Err(e) = self.shared.resume_all().await {
            warn!("Failed to resume shared dictionaries: {}", e);
        }
        self.flush().await
    }

    /// Catch up after the app returns to the foreground.
    pub async fn on_foreground(&self) -> Result<SyncStats, SyncError> {
        if let Err(e) = self.shared.resume_all().await {
            warn!("Failed to resume shared dictionaries: {}", e);
        }
        match self.sync.pull_private_words().await {
            Ok(_) | Err(SyncError::AlreadyInProgress) => {}
            Err(e) => warn!("Failed to pull private words: {}", e),
        }
        self.flush().await
    }

    async fn flush(&self) -> Result<SyncStats, SyncError> {
        if let Err(e) = self.sync.retry_failed().await {
            warn!("Shared difficulty retry failed: {}", e);
        }
        match self.sync.push_dirty().await {
            Err(SyncError::AlreadyInProgress) => Ok(SyncStats::default()),
            result => result,
        }
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        self.push_worker.abort();
    }
}
