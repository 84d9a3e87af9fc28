//! Local SQLite database operations.

pub mod error;
pub mod repository;
pub mod schema;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use error::DbError;
pub use repository::{
    LocalAccount, LocalSyncState, SessionRepository, SqliteRepository, SyncRepository,
    WordRepository,
};

/// Repository handle shared between the sync reconciler, quiz sessions and the app state.
pub type SharedRepository = Arc<Mutex<SqliteRepository>>;

pub fn shared(repository: SqliteRepository) -> SharedRepository {
    Arc::new(Mutex::new(repository))
}

/// Lock the repository. A poisoned lock still guards a consistent connection, so recover it.
pub fn lock(repository: &SharedRepository) -> MutexGuard<'_, SqliteRepository> {
    repository.lock().unwrap_or_else(PoisonError::into_inner)
}
