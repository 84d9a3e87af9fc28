//! Backend-backed remote store.
//!
//! Plain REST calls for mutations and a server-sent event stream per watched dictionary. Every
//! event on the stream carries the full dictionary state as JSON.

use async_trait::async_trait;
use futures_util::StreamExt;
use lexicon_core::{DictionaryState, FieldUpdate, Role, SharedDictionary, SharedWord, Word, WordDraft};
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{DictionaryUpdates, RemoteError, RemoteStore};

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    display_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    token: String,
}

#[derive(Debug, Serialize)]
struct CreateDictionaryRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct SetRoleRequest {
    role: Role,
}

/// [`RemoteStore`] speaking to the backend over HTTP.
#[derive(Clone)]
pub struct HttpRemoteStore {
    client: Client,
    backend_url: String,
    token: String,
}

impl HttpRemoteStore {
    pub fn new(backend_url: &str, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            backend_url: backend_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Register an account and return its API token.
    pub async fn register(
        backend_url: &str,
        email: &str,
        display_name: &str,
    ) -> Result<String, RemoteError> {
        let url = format!("{}/api/users/register", backend_url.trim_end_matches('/'));
        let resp = Client::new()
            .post(&url)
            .json(&RegisterRequest { email, display_name })
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let response: RegisterResponse = check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;
        Ok(response.token)
    }

    /// Check if backend is reachable.
    pub async fn check_connectivity(&self) -> Result<bool, RemoteError> {
        let url = format!("{}/health", self.backend_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(e) => Err(RemoteError::Network(e.to_string())),
        }
    }

    /// Build an API url from raw path segments. Segments are percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.backend_url)
            .map_err(|e| RemoteError::Network(format!("invalid backend url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| RemoteError::Network(format!("invalid backend url: {}", self.backend_url)))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let resp = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        check_status(resp).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))
    }
}

async fn check_status(resp: Response) -> Result<Response, RemoteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED => RemoteError::NotAuthenticated,
        StatusCode::FORBIDDEN => RemoteError::Forbidden(message),
        StatusCode::NOT_FOUND => RemoteError::NotFound(message),
        _ => RemoteError::Backend {
            status: status.as_u16(),
            message,
        },
    })
}

/// Extract the dictionary state from one SSE event block.
fn parse_event(block: &str) -> Option<DictionaryState> {
    let data = block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|line| line.strip_prefix(' ').unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n");
    if data.is_empty() {
        return None;
    }
    match serde_json::from_str(&data) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!("Discarding malformed dictionary event: {}", e);
            None
        }
    }
}

/// Split complete event blocks off the front of `buffer`.
fn drain_events(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut events = Vec::new();
    while let Some(end) = buffer.windows(2).position(|window| window == b"\n\n") {
        let block: Vec<u8> = buffer.drain(..end + 2).collect();
        events.push(String::from_utf8_lossy(&block).into_owned());
    }
    events
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn create_dictionary(&self, name: &str) -> Result<SharedDictionary, RemoteError> {
        let url = self.url(&["dictionaries"])?;
        self.send_json(self.client.post(url).json(&CreateDictionaryRequest { name }))
            .await
    }

    async fn fetch_dictionary(&self, dictionary_id: Uuid) -> Result<DictionaryState, RemoteError> {
        let url = self.url(&["dictionaries", &dictionary_id.to_string()])?;
        self.send_json(self.client.get(url)).await
    }

    async fn delete_dictionary(&self, dictionary_id: Uuid) -> Result<(), RemoteError> {
        let url = self.url(&["dictionaries", &dictionary_id.to_string()])?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn set_collaborator(
        &self,
        dictionary_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<(), RemoteError> {
        let url = self.url(&["dictionaries", &dictionary_id.to_string(), "collaborators", email])?;
        self.send(self.client.put(url).json(&SetRoleRequest { role }))
            .await?;
        Ok(())
    }

    async fn remove_collaborator(&self, dictionary_id: Uuid, email: &str) -> Result<(), RemoteError> {
        let url = self.url(&["dictionaries", &dictionary_id.to_string(), "collaborators", email])?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn add_word(&self, dictionary_id: Uuid, draft: &WordDraft) -> Result<SharedWord, RemoteError> {
        let url = self.url(&["dictionaries", &dictionary_id.to_string(), "words"])?;
        self.send_json(self.client.post(url).json(draft)).await
    }

    async fn update_word(
        &self,
        dictionary_id: Uuid,
        word_id: Uuid,
        draft: &WordDraft,
    ) -> Result<(), RemoteError> {
        let url = self.url(&[
            "dictionaries",
            &dictionary_id.to_string(),
            "words",
            &word_id.to_string(),
        ])?;
        self.send(self.client.put(url).json(draft)).await?;
        Ok(())
    }

    async fn delete_word(&self, dictionary_id: Uuid, word_id: Uuid) -> Result<(), RemoteError> {
        let url = self.url(&[
            "dictionaries",
            &dictionary_id.to_string(),
            "words",
            &word_id.to_string(),
        ])?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn update_word_field(
        &self,
        dictionary_id: Uuid,
        word_id: Uuid,
        update: &FieldUpdate,
    ) -> Result<(), RemoteError> {
        let url = self.url(&[
            "dictionaries",
            &dictionary_id.to_string(),
            "words",
            &word_id.to_string(),
            "fields",
        ])?;
        self.send(self.client.patch(url).json(&update.to_patch()))
            .await?;
        Ok(())
    }

    async fn watch_dictionary(&self, dictionary_id: Uuid) -> Result<DictionaryUpdates, RemoteError> {
        let url = self.url(&["dictionaries", &dictionary_id.to_string(), "changes"])?;
        let resp = self
            .send(self.client.get(url).header(ACCEPT, "text/event-stream"))
            .await?;

        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            let mut buffer = Vec::new();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(%dictionary_id, "Dictionary stream failed: {}", e);
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);
                for block in drain_events(&mut buffer) {
                    if let Some(state) = parse_event(&block) {
                        if sender.send(state).is_err() {
                            return;
                        }
                    }
                }
            }
            debug!(%dictionary_id, "Dictionary stream ended");
        });
        Ok(receiver)
    }

    async fn list_private_words(&self) -> Result<Vec<Word>, RemoteError> {
        let url = self.url(&["words"])?;
        self.send_json(self.client.get(url)).await
    }

    async fn upsert_private_word(&self, word: &Word) -> Result<(), RemoteError> {
        let url = self.url(&["words", &word.id.to_string()])?;
        self.send(self.client.put(url).json(word)).await?;
        Ok(())
    }

    async fn delete_private_word(&self, word_id: Uuid) -> Result<(), RemoteError> {
        let url = self.url(&["words", &word_id.to_string()])?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }
}
