//! Account registration and lookup

use axum::{extract::State, Extension, Json};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::{RegisterRequest, RegisterResponse, UserResponse};
use crate::routes::auth::{hash_token, AuthenticatedUser};
use crate::AppState;

/// Emails key the per-user maps on shared words, so they are stored in one canonical form.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// POST /api/users/register
/// Creates an account and returns its token. The token is not retrievable later.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>> {
    let email = normalize_email(&payload.email);
    if !email.contains('@') || email.contains('/') {
        return Err(ApiError::BadRequest(format!("invalid email: {}", payload.email)));
    }
    let display_name = payload.display_name.trim();
    if display_name.is_empty() {
        return Err(ApiError::BadRequest("display_name must not be empty".to_string()));
    }

    let token = Uuid::new_v4().to_string();
    state
        .db
        .create_user(&email, display_name, &hash_token(&token))
        .await?
        .ok_or_else(|| ApiError::Conflict(format!("{email} is already registered")))?;

    tracing::info!("Registered user {}", email);

    Ok(Json(RegisterResponse { email, token }))
}

/// GET /api/users/me
pub async fn me(Extension(auth): Extension<AuthenticatedUser>) -> Json<UserResponse> {
    Json(UserResponse {
        email: auth.email,
        display_name: auth.display_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_lowercased_and_trimmed() {
        assert_eq!(normalize_email("  Ana@Example.COM "), "ana@example.com");
    }
}
