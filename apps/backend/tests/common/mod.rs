//! Common test utilities for integration tests.
//!
//! # Requirements
//! Integration tests require a PostgreSQL database (set DATABASE_URL env var).

use axum::Router;
use axum_test::TestServer;
use uuid::Uuid;

use lexicon_backend::db::Database;
use lexicon_backend::models::RegisterResponse;
use lexicon_backend::{router, AppState};

/// Test context containing the database connection and the application router.
pub struct TestContext {
    pub db: Database,
    app: Router,
}

impl TestContext {
    /// Create a new test context.
    ///
    /// # Panics
    /// Panics if DATABASE_URL is not set or database connection fails.
    pub async fn new() -> Self {
        dotenvy::dotenv().ok();

        let database_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");

        let db = Database::connect(&database_url)
            .await
            .expect("Failed to connect to test database");

        db.run_migrations()
            .await
            .expect("Failed to run migrations");

        let app = router(AppState::new(db.clone()));

        Self { db, app }
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(self.app.clone()).unwrap()
    }

    /// Register a user with a unique email derived from `name` and return (email, token).
    pub async fn register(&self, server: &TestServer, name: &str) -> (String, String) {
        let email = format!("{}-{}@example.com", name, Uuid::new_v4().simple());
        let response = server
            .post("/api/users/register")
            .json(&serde_json::json!({ "email": email, "display_name": name }))
            .await;
        response.assert_status_ok();
        let body: RegisterResponse = response.json();
        (body.email, body.token)
    }

    /// Format authorization header value.
    pub fn auth_header_value(token: &str) -> String {
        format!("Bearer {}", token)
    }

    /// Remove a user and everything they own.
    pub async fn cleanup_user(&self, email: &str) {
        // Dictionaries go first so their words and collaborators cascade
        let _ = sqlx::query(
            r#"
            DELETE FROM dictionaries
            WHERE id IN (SELECT dictionary_id FROM collaborators WHERE email = $1 AND role = 'owner')
            "#,
        )
        .bind(email)
        .execute(self.db.pool())
        .await;

        let _ = sqlx::query("DELETE FROM collaborators WHERE email = $1")
            .bind(email)
            .execute(self.db.pool())
            .await;

        let _ = sqlx::query("DELETE FROM private_words WHERE owner_email = $1")
            .bind(email)
            .execute(self.db.pool())
            .await;

        let _ = sqlx::query("DELETE FROM users WHERE email = $1")
            .bind(email)
            .execute(self.db.pool())
            .await;
    }
}
