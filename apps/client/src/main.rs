use lexicon_client::config::ClientConfig;
use lexicon_client::db::{self, SessionRepository, SyncRepository};
use tracing::info;

/// One sync pass: pull private words, retry shared writes, push local changes.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lexicon_client::logging::init();

    let config = ClientConfig::from_env()?;
    info!(email = %config.user.email, db = %config.database_path.display(), "Starting sync");
    let app = lexicon_client::bootstrap(config).await?;

    let stats = app.on_foreground().await?;
    info!(
        pushed = stats.words_pushed,
        deleted = stats.deletes_pushed,
        failed = stats.words_failed,
        "Sync finished"
    );

    let repo = db::lock(&app.repository);
    let state = repo.get_sync_state()?;
    info!(
        last_sync_at = state.last_sync_at.as_deref().unwrap_or("never"),
        pending = state.pending_changes,
        "Local store"
    );
    for session in repo.list_sessions(5)? {
        info!(
            quiz_type = session.quiz_type.as_str(),
            score = session.score,
            accuracy = session.accuracy,
            "Recent session {}",
            session.timestamp.to_rfc3339()
        );
    }
    Ok(())
}
