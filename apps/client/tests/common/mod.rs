//! Shared setup for client integration tests.
//!
//! Every participant gets their own service stack over one [`MemoryBackend`], the way separate
//! devices would share one server.

use std::sync::Arc;
use std::time::Duration;

use lexicon_client::db::{self, SqliteRepository};
use lexicon_client::remote::{MemoryBackend, RemoteStore};
use lexicon_client::shared::{DictionarySnapshot, SharedDictionaryService, SnapshotReceiver};
use lexicon_client::sync::{PendingDifficulties, SyncReconciler};
use lexicon_client::CurrentUser;

pub const ANA: &str = "ana@example.com";
pub const BEN: &str = "ben@example.com";
pub const VERA: &str = "vera@example.com";

/// One signed-in device.
pub struct Participant {
    pub user: CurrentUser,
    pub shared: SharedDictionaryService,
    pub sync: SyncReconciler,
}

impl Participant {
    pub fn join(backend: &MemoryBackend, email: &str) -> Self {
        let user = CurrentUser::new(email, email.split('@').next().unwrap_or_default());
        let remote: Arc<dyn RemoteStore> = Arc::new(backend.store_for(user.clone()));
        let shared = SharedDictionaryService::new(
            remote.clone(),
            user.clone(),
            Arc::new(PendingDifficulties::new(email)),
        );
        let repository = db::shared(SqliteRepository::open_in_memory().unwrap());
        let sync = SyncReconciler::new(remote, repository, shared.clone(), user.clone());
        Self { user, shared, sync }
    }
}

/// Wait until a published snapshot satisfies `predicate`.
pub async fn snapshot_where(
    receiver: &mut SnapshotReceiver,
    predicate: impl Fn(&DictionarySnapshot) -> bool,
) -> DictionarySnapshot {
    let snapshot = tokio::time::timeout(
        Duration::from_secs(2),
        receiver.wait_for(|snapshot| snapshot.as_ref().is_some_and(&predicate)),
    )
    .await
    .expect("snapshot within timeout")
    .expect("publisher alive")
    .clone();
    snapshot.expect("snapshot published")
}

/// Give spawned tasks time to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Poll `check` until it holds. Background workers make some outcomes eventual.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within timeout");
}
