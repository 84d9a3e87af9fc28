//! Private word API tests.
//!
//! These tests require a running PostgreSQL database.
//! Set DATABASE_URL environment variable before running.

mod common;

use axum::http::{header::AUTHORIZATION, StatusCode};

use common::TestContext;
use lexicon_core::{SyncState, Word};

/// Pushed words come back synced, and only to their owner.
#[tokio::test]
#[ignore = "requires database"]
async fn test_upsert_and_list_private_words() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    let (ana, ana_token) = ctx.register(&server, "ana").await;
    let (ben, ben_token) = ctx.register(&server, "ben").await;

    let mut word = Word::new("gato", "cat", "es");
    word.difficulty_score = 5;
    word.attempt_count = 1;

    let response = server
        .put(&format!("/api/words/{}", word.id))
        .add_header(AUTHORIZATION, TestContext::auth_header_value(&ana_token))
        .json(&word)
        .await;
    response.assert_status(StatusCode::NO_CONTENT);

    let response = server
        .get("/api/words")
        .add_header(AUTHORIZATION, TestContext::auth_header_value(&ana_token))
        .await;
    response.assert_status_ok();
    let words: Vec<Word> = response.json();
    assert_eq!(words.len(), 1);
    assert_eq!(words[0].id, word.id);
    assert_eq!(words[0].difficulty_score, 5);
    assert_eq!(words[0].sync_state, SyncState::Synced);

    let response = server
        .get("/api/words")
        .add_header(AUTHORIZATION, TestContext::auth_header_value(&ben_token))
        .await;
    let words: Vec<Word> = response.json();
    assert!(words.is_empty());

    ctx.cleanup_user(&ana).await;
    ctx.cleanup_user(&ben).await;
}

/// A second push replaces the stored copy.
#[tokio::test]
#[ignore = "requires database"]
async fn test_upsert_overwrites() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    let (ana, token) = ctx.register(&server, "ana").await;

    let mut word = Word::new("perro", "dog", "es");
    for score in [5, 3] {
        word.difficulty_score = score;
        server
            .put(&format!("/api/words/{}", word.id))
            .add_header(AUTHORIZATION, TestContext::auth_header_value(&token))
            .json(&word)
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }

    let words: Vec<Word> = server
        .get("/api/words")
        .add_header(AUTHORIZATION, TestContext::auth_header_value(&token))
        .await
        .json();
    assert_eq!(words.len(), 1);
    assert_eq!(words[0].difficulty_score, 3);

    ctx.cleanup_user(&ana).await;
}

/// The path id must match the body.
#[tokio::test]
#[ignore = "requires database"]
async fn test_upsert_id_mismatch() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    let (ana, token) = ctx.register(&server, "ana").await;

    let word = Word::new("gato", "cat", "es");
    let response = server
        .put(&format!("/api/words/{}", uuid::Uuid::new_v4()))
        .add_header(AUTHORIZATION, TestContext::auth_header_value(&token))
        .json(&word)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    ctx.cleanup_user(&ana).await;
}

/// Deleting removes the word; deleting again is not found.
#[tokio::test]
#[ignore = "requires database"]
async fn test_delete_private_word() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    let (ana, token) = ctx.register(&server, "ana").await;

    let word = Word::new("gato", "cat", "es");
    server
        .put(&format!("/api/words/{}", word.id))
        .add_header(AUTHORIZATION, TestContext::auth_header_value(&token))
        .json(&word)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let response = server
        .delete(&format!("/api/words/{}", word.id))
        .add_header(AUTHORIZATION, TestContext::auth_header_value(&token))
        .await;
    response.assert_status(StatusCode::NO_CONTENT);

    let response = server
        .delete(&format!("/api/words/{}", word.id))
        .add_header(AUTHORIZATION, TestContext::auth_header_value(&token))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    ctx.cleanup_user(&ana).await;
}
