//! Lexicon client: local word store, shared dictionaries, sync and quizzes.

pub mod config;
pub mod db;
pub mod identity;
pub mod logging;
pub mod quiz;
pub mod remote;
pub mod shared;
pub mod state;
pub mod sync;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::ClientConfig;
use crate::db::{SqliteRepository, SyncRepository};
use crate::remote::{HttpRemoteStore, MemoryBackend, RemoteStore};

pub use identity::CurrentUser;
pub use state::AppState;

/// Open the local database, connect the remote store and build the application state.
///
/// Without a backend url everything runs against an in-process store. With one, the token
/// comes from the configuration, the stored account, or a fresh registration, in that order.
pub async fn bootstrap(config: ClientConfig) -> anyhow::Result<AppState> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let repository = SqliteRepository::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;

    let remote: Arc<dyn RemoteStore> = match &config.backend_url {
        Some(url) => {
            let token = match (&config.api_token, repository.get_account()?) {
                (Some(token), _) => token.clone(),
                (None, Some(account)) if account.email == config.user.email => account.token,
                (None, _) => {
                    info!(email = %config.user.email, "Registering with {}", url);
                    let token = HttpRemoteStore::register(url, &config.user.email, &config.user.display_name)
                        .await
                        .context("registration failed")?;
                    repository.save_account(&token, &config.user.email)?;
                    token
                }
            };
            Arc::new(HttpRemoteStore::new(url, token))
        }
        None => {
            info!("No backend configured; using an in-process store");
            Arc::new(MemoryBackend::new().store_for(config.user.clone()))
        }
    };

    Ok(AppState::new(config.user, repository, remote)?.with_quiz_seed(config.quiz_seed))
}
