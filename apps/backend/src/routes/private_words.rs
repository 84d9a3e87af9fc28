//! Private word endpoints
//!
//! Each user's private collection is stored as whole documents; the client is the source of
//! truth and pushes complete words.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::Word;
use crate::routes::auth::AuthenticatedUser;
use crate::AppState;

/// GET /api/words
pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<Word>>> {
    let words = state.db.list_private_words(&auth.email).await?;
    Ok(Json(words))
}

/// PUT /api/words/:id
pub async fn upsert(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(word_id): Path<Uuid>,
    Json(word): Json<Word>,
) -> Result<StatusCode> {
    if word.id != word_id {
        return Err(ApiError::BadRequest(format!(
            "word id {} does not match path {}",
            word.id, word_id
        )));
    }
    state.db.upsert_private_word(&auth.email, &word).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/words/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(word_id): Path<Uuid>,
) -> Result<StatusCode> {
    if !state.db.delete_private_word(&auth.email, word_id).await? {
        return Err(ApiError::NotFound(format!("word {word_id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}
