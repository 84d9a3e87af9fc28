//! Shared word endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use lexicon_core::permissions::Action;
use lexicon_core::{MAX_SCORE, MIN_SCORE};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::routes::auth::AuthenticatedUser;
use crate::routes::dictionaries::load_dictionary;
use crate::AppState;

fn validate_draft(draft: &WordDraft) -> Result<()> {
    if draft.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".to_string()));
    }
    if draft.definition.trim().is_empty() {
        return Err(ApiError::BadRequest("definition must not be empty".to_string()));
    }
    Ok(())
}

/// Check that a field write only touches the caller's own key and stays in range.
pub fn validate_field_update(update: &FieldUpdate, caller: &str) -> Result<()> {
    if update.email() != caller {
        return Err(ApiError::Forbidden(format!(
            "{caller} may not write {}",
            update.field_path()
        )));
    }
    if let FieldUpdate::SetDifficulty { score, .. } = update {
        if !(MIN_SCORE..=MAX_SCORE).contains(score) {
            return Err(ApiError::BadRequest(format!(
                "difficulty {score} outside {MIN_SCORE}..={MAX_SCORE}"
            )));
        }
    }
    Ok(())
}

/// POST /api/dictionaries/:id/words
pub async fn add(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(dictionary_id): Path<Uuid>,
    Json(draft): Json<WordDraft>,
) -> Result<Json<SharedWord>> {
    validate_draft(&draft)?;
    load_dictionary(&state, dictionary_id, &auth, Action::EditWords).await?;

    let word = state
        .db
        .insert_word(dictionary_id, &draft, &auth.email, &auth.display_name)
        .await?;
    state.changes.notify(dictionary_id);
    Ok(Json(word))
}

/// PUT /api/dictionaries/:id/words/:word_id
pub async fn update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path((dictionary_id, word_id)): Path<(Uuid, Uuid)>,
    Json(draft): Json<WordDraft>,
) -> Result<StatusCode> {
    validate_draft(&draft)?;
    load_dictionary(&state, dictionary_id, &auth, Action::EditWords).await?;

    if !state.db.update_word(dictionary_id, word_id, &draft).await? {
        return Err(ApiError::NotFound(format!("word {word_id}")));
    }
    state.changes.notify(dictionary_id);
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/dictionaries/:id/words/:word_id
pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path((dictionary_id, word_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    load_dictionary(&state, dictionary_id, &auth, Action::EditWords).await?;

    if !state.db.delete_word(dictionary_id, word_id).await? {
        return Err(ApiError::NotFound(format!("word {word_id}")));
    }
    state.changes.notify(dictionary_id);
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /api/dictionaries/:id/words/:word_id/fields
/// Single-key write: `{"path": "difficulties/<email>", "value": 5}` or
/// `{"path": "likes/<email>", "value": true}`.
pub async fn patch_field(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path((dictionary_id, word_id)): Path<(Uuid, Uuid)>,
    Json(patch): Json<FieldPatch>,
) -> Result<StatusCode> {
    let update = FieldUpdate::from_patch(&patch)
        .ok_or_else(|| ApiError::BadRequest(format!("unsupported field path: {}", patch.path)))?;
    validate_field_update(&update, &auth.email)?;
    load_dictionary(&state, dictionary_id, &auth, Action::React).await?;

    if !state.db.apply_field_update(dictionary_id, word_id, &update).await? {
        return Err(ApiError::NotFound(format!("word {word_id}")));
    }
    tracing::debug!("{}", update.document_path(dictionary_id, word_id));
    state.changes.notify(dictionary_id);
    Ok(StatusCode::NO_CONTENT)
}
