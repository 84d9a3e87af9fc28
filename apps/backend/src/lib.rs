pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::db::Database;
use crate::services::changes::ChangeHub;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub changes: Arc<ChangeHub>,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(db),
            changes: Arc::new(ChangeHub::new()),
        }
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        // User routes
        .route("/api/users/me", get(routes::users::me))
        // Dictionary routes
        .route(
            "/api/dictionaries",
            get(routes::dictionaries::list).post(routes::dictionaries::create),
        )
        .route(
            "/api/dictionaries/:id",
            get(routes::dictionaries::get).delete(routes::dictionaries::delete),
        )
        .route(
            "/api/dictionaries/:id/collaborators",
            post(routes::dictionaries::add_collaborator),
        )
        .route(
            "/api/dictionaries/:id/collaborators/:email",
            put(routes::dictionaries::set_collaborator)
                .delete(routes::dictionaries::remove_collaborator),
        )
        .route("/api/dictionaries/:id/changes", get(routes::changes::stream))
        // Shared word routes
        .route("/api/dictionaries/:id/words", post(routes::words::add))
        .route(
            "/api/dictionaries/:id/words/:word_id",
            put(routes::words::update).delete(routes::words::delete),
        )
        .route(
            "/api/dictionaries/:id/words/:word_id/fields",
            patch(routes::words::patch_field),
        )
        // Private word routes
        .route("/api/words", get(routes::private_words::list))
        .route(
            "/api/words/:id",
            put(routes::private_words::upsert).delete(routes::private_words::delete),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            routes::auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/users/register", post(routes::users::register))
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

    tracing::info!("Connecting to database...");
    let db = Database::connect(&database_url).await?;

    tracing::info!("Running migrations...");
    db.run_migrations().await?;

    let app = router(AppState::new(db));

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("{}:{}", host, port);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header::AUTHORIZATION, Request, StatusCode},
    };
    use tower::ServiceExt;

    fn app() -> Router {
        let db = Database::connect_lazy("postgres://lexicon@localhost/unused").unwrap();
        router(AppState::new(db))
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let response = app()
            .oneshot(Request::get("/api/users/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_bearer_token_is_unauthorized() {
        let response = app()
            .oneshot(
                Request::get("/api/dictionaries")
                    .header(AUTHORIZATION, "Basic YW5hOnNlY3JldA==")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
