//! Live dictionary stream (Server-Sent Events)
//!
//! The first event is the current state; every change notification is followed by a fresh
//! load of the full state. The stream ends when the dictionary is deleted or the caller
//! loses access to it.

use std::future::ready;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use futures_util::{stream, Stream, StreamExt};
use lexicon_core::permissions::Action;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::DictionaryState;
use crate::routes::auth::AuthenticatedUser;
use crate::routes::dictionaries::load_dictionary;
use crate::AppState;

const EVENT_NAME: &str = "dictionary";

fn state_event(state: &DictionaryState) -> std::result::Result<Event, axum::Error> {
    Event::default().event(EVENT_NAME).json_data(state)
}

/// GET /api/dictionaries/:id/changes
pub async fn stream(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(dictionary_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    // Subscribe before loading so no change between the two is missed.
    let notifications = state.changes.subscribe(dictionary_id);
    load_dictionary(&state, dictionary_id, &auth, Action::React).await?;
    let initial = state
        .db
        .get_dictionary_state(dictionary_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("dictionary {dictionary_id}")))?;

    tracing::debug!("{} watching dictionary {}", auth.email, dictionary_id);

    let db = state.db.clone();
    let email = auth.email;
    let updates = BroadcastStream::new(notifications)
        .then(move |_| {
            // Lagged notifications are treated like any other: the reload covers them.
            let db = db.clone();
            let email = email.clone();
            async move {
                match db.get_dictionary_state(dictionary_id).await {
                    Ok(Some(current)) if current.dictionary.role_of(&email).is_some() => {
                        Some(state_event(&current))
                    }
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!("Failed to load dictionary {}: {}", dictionary_id, e);
                        None
                    }
                }
            }
        })
        .take_while(|event| ready(event.is_some()))
        .filter_map(ready);

    let events = stream::once(ready(state_event(&initial))).chain(updates);
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
