//! Remote journal collection clients.

mod firebase;
mod listener;
mod memory;

pub use firebase::FirebaseJournal;
pub use memory::MemoryJournal;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::{EntryId, JournalRecord};

/// A full point-in-time copy of one user's journal collection, keyed by
/// entry id. Values are raw JSON; parsing happens during reconciliation.
pub type Snapshot = serde_json::Map<String, serde_json::Value>;

/// Stream of collection snapshots produced by a standing listener.
pub type SnapshotReceiver = mpsc::Receiver<Snapshot>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Invalid database configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Journal HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to encode journal record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Journal API error: {0}")]
    Api(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Operations against one user's remote journal collection.
///
/// `watch` opens a standing subscription that delivers the entire
/// collection on the initial load and again after every remote change.
/// Consumers always receive whole snapshots, never deltas. The stream ends
/// when the receiver is dropped or the transport closes; it is not
/// reconnected here.
#[async_trait]
pub trait JournalBackend: Send + Sync + 'static {
    async fn put(&self, user_id: &str, id: &EntryId, record: &JournalRecord) -> DbResult<()>;
    async fn remove(&self, user_id: &str, id: &EntryId) -> DbResult<()>;
    async fn watch(&self, user_id: &str) -> DbResult<SnapshotReceiver>;
}
