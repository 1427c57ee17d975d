//! REST client for the hosted realtime database.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::models::{EntryId, JournalRecord};
use crate::util::{compact_text, is_http_url};

use super::listener;
use super::{DbError, DbResult, JournalBackend, SnapshotReceiver};

const SNAPSHOT_CHANNEL_CAPACITY: usize = 16;

/// Journal backend speaking the realtime database REST protocol.
///
/// Records live under `users/{uid}/journals/{entry-id}`. Every request
/// carries the signed-in user's ID token in the `auth` query parameter, so
/// one client instance is bound to one authenticated session. When the
/// token expires mid-stream the server revokes the watch and the stream
/// ends; callers open a fresh client after refreshing.
#[derive(Clone)]
pub struct FirebaseJournal {
    base_url: String,
    id_token: String,
    client: Client,
}

impl FirebaseJournal {
    pub fn new(database_url: impl AsRef<str>, id_token: impl Into<String>) -> DbResult<Self> {
        let base_url = normalize_database_url(database_url.as_ref())?;
        let id_token = id_token.into().trim().to_string();
        if id_token.is_empty() {
            return Err(DbError::InvalidConfiguration(
                "ID token must not be empty".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            id_token,
            client: Client::builder().build()?,
        })
    }

    fn collection_url(&self, user_id: &str) -> String {
        format!("{}/users/{user_id}/journals.json", self.base_url)
    }

    fn record_url(&self, user_id: &str, id: &EntryId) -> String {
        format!("{}/users/{user_id}/journals/{id}.json", self.base_url)
    }
}

#[async_trait]
impl JournalBackend for FirebaseJournal {
    async fn put(&self, user_id: &str, id: &EntryId, record: &JournalRecord) -> DbResult<()> {
        let response = self
            .client
            .put(self.record_url(user_id, id))
            .query(&[("auth", self.id_token.as_str())])
            .json(record)
            .send()
            .await?;
        check_status(response).await
    }

    async fn remove(&self, user_id: &str, id: &EntryId) -> DbResult<()> {
        let response = self
            .client
            .delete(self.record_url(user_id, id))
            .query(&[("auth", self.id_token.as_str())])
            .send()
            .await?;
        check_status(response).await
    }

    async fn watch(&self, user_id: &str) -> DbResult<SnapshotReceiver> {
        let response = self
            .client
            .get(self.collection_url(user_id))
            .query(&[("auth", self.id_token.as_str())])
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DbError::Api(parse_api_error(status, &body)));
        }

        let (sender, receiver) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);
        tokio::spawn(listener::pump_snapshots(response.bytes_stream(), sender));
        Ok(receiver)
    }
}

async fn check_status(response: reqwest::Response) -> DbResult<()> {
    if response.status().is_success() {
        return Ok(());
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(DbError::Api(parse_api_error(status, &body)))
}

fn normalize_database_url(url: &str) -> DbResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(DbError::InvalidConfiguration(
            "Database URL must not be empty".to_string(),
        ));
    }
    if !is_http_url(trimmed) {
        return Err(DbError::InvalidConfiguration(
            "Database URL must include http:// or https://".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Deserialize)]
struct DatabaseErrorResponse {
    error: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<DatabaseErrorResponse>(body) {
        if let Some(message) = payload.error {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}
