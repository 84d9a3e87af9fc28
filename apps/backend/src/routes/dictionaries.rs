//! Shared dictionary and collaborator endpoints
//!
//! Every mutation reloads the dictionary, checks the caller's role with the same rules the
//! client applies, writes, then wakes the dictionary's change streams.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use lexicon_core::permissions::{self, Action};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::routes::auth::AuthenticatedUser;
use crate::routes::users::normalize_email;
use crate::AppState;

/// Load a dictionary the caller may at least read.
pub(crate) async fn load_dictionary(
    state: &AppState,
    dictionary_id: Uuid,
    auth: &AuthenticatedUser,
    action: Action,
) -> Result<SharedDictionary> {
    let dictionary = state
        .db
        .get_dictionary(dictionary_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("dictionary {dictionary_id}")))?;
    permissions::authorize(&dictionary, &auth.email, action)?;
    Ok(dictionary)
}

/// GET /api/dictionaries
pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<DictionarySummary>>> {
    let dictionaries = state.db.list_dictionaries(&auth.email).await?;
    Ok(Json(dictionaries))
}

/// POST /api/dictionaries
pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(payload): Json<CreateDictionaryRequest>,
) -> Result<Json<SharedDictionary>> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }

    let dictionary = state.db.create_dictionary(name, &auth.email).await?;
    tracing::info!("{} created dictionary {}", auth.email, dictionary.id);
    Ok(Json(dictionary))
}

/// GET /api/dictionaries/:id
pub async fn get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(dictionary_id): Path<Uuid>,
) -> Result<Json<DictionaryState>> {
    load_dictionary(&state, dictionary_id, &auth, Action::React).await?;
    let current = state
        .db
        .get_dictionary_state(dictionary_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("dictionary {dictionary_id}")))?;
    Ok(Json(current))
}

/// DELETE /api/dictionaries/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(dictionary_id): Path<Uuid>,
) -> Result<StatusCode> {
    load_dictionary(&state, dictionary_id, &auth, Action::DeleteDictionary).await?;
    state.db.delete_dictionary(dictionary_id).await?;
    state.changes.close(dictionary_id);
    tracing::info!("{} deleted dictionary {}", auth.email, dictionary_id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/dictionaries/:id/collaborators
pub async fn add_collaborator(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(dictionary_id): Path<Uuid>,
    Json(payload): Json<AddCollaboratorRequest>,
) -> Result<StatusCode> {
    let email = normalize_email(&payload.email);
    let dictionary = load_dictionary(&state, dictionary_id, &auth, Action::React).await?;
    permissions::check_add_collaborator(&dictionary, &auth.email, payload.role)?;
    if dictionary.role_of(&email).is_some() {
        return Err(ApiError::Conflict(format!("{email} is already a collaborator")));
    }

    state.db.set_collaborator(dictionary_id, &email, payload.role).await?;
    state.changes.notify(dictionary_id);
    Ok(StatusCode::CREATED)
}

/// PUT /api/dictionaries/:id/collaborators/:email
/// Adds the collaborator, or changes their role when they already are one.
pub async fn set_collaborator(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path((dictionary_id, email)): Path<(Uuid, String)>,
    Json(payload): Json<SetRoleRequest>,
) -> Result<StatusCode> {
    let email = normalize_email(&email);
    let dictionary = load_dictionary(&state, dictionary_id, &auth, Action::React).await?;
    if dictionary.role_of(&email).is_some() {
        permissions::check_update_role(&dictionary, &auth.email, &email, payload.role)?;
    } else {
        permissions::check_add_collaborator(&dictionary, &auth.email, payload.role)?;
    }

    state.db.set_collaborator(dictionary_id, &email, payload.role).await?;
    state.changes.notify(dictionary_id);
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/dictionaries/:id/collaborators/:email
pub async fn remove_collaborator(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path((dictionary_id, email)): Path<(Uuid, String)>,
) -> Result<StatusCode> {
    let email = normalize_email(&email);
    let dictionary = load_dictionary(&state, dictionary_id, &auth, Action::React).await?;
    permissions::check_remove_collaborator(&dictionary, &auth.email, &email)?;

    if !state.db.remove_collaborator(dictionary_id, &email).await? {
        return Err(ApiError::NotFound(format!("collaborator {email}")));
    }
    state.changes.notify(dictionary_id);
    Ok(StatusCode::NO_CONTENT)
}
