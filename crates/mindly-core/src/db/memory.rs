//! In-process journal backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::models::{EntryId, JournalRecord};

use super::{DbResult, JournalBackend, Snapshot, SnapshotReceiver};

const SNAPSHOT_CHANNEL_CAPACITY: usize = 16;

/// In-memory stand-in for the hosted realtime database.
///
/// Clones share one store. Every write fans the owner's full collection
/// snapshot out to all live watchers, matching the level-triggered delivery
/// of the hosted listener. Useful for tests and offline development.
#[derive(Clone, Default)]
pub struct MemoryJournal {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, Snapshot>,
    watchers: HashMap<String, Vec<mpsc::Sender<Snapshot>>>,
}

impl MemoryState {
    fn snapshot(&self, user_id: &str) -> Snapshot {
        self.collections.get(user_id).cloned().unwrap_or_default()
    }
}

impl MemoryJournal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw value under `id`, bypassing the typed write path.
    ///
    /// Simulates another client writing to the same collection, including
    /// clients that write malformed records.
    pub async fn insert_raw(&self, user_id: &str, id: &str, value: Value) {
        let mut state = self.inner.lock().await;
        state
            .collections
            .entry(user_id.to_string())
            .or_default()
            .insert(id.to_string(), value);
        drop(state);
        self.broadcast(user_id).await;
    }

    /// Remove a record as if another client had deleted it.
    pub async fn remove_raw(&self, user_id: &str, id: &str) {
        let mut state = self.inner.lock().await;
        if let Some(collection) = state.collections.get_mut(user_id) {
            collection.remove(id);
        }
        drop(state);
        self.broadcast(user_id).await;
    }

    /// Current raw contents of one user's collection.
    pub async fn records(&self, user_id: &str) -> Snapshot {
        self.inner.lock().await.snapshot(user_id)
    }

    async fn broadcast(&self, user_id: &str) {
        let (snapshot, senders) = {
            let mut state = self.inner.lock().await;
            if let Some(watchers) = state.watchers.get_mut(user_id) {
                watchers.retain(|sender| !sender.is_closed());
            }
            (
                state.snapshot(user_id),
                state.watchers.get(user_id).cloned().unwrap_or_default(),
            )
        };
        for sender in senders {
            let _ = sender.send(snapshot.clone()).await;
        }
    }
}

#[async_trait]
impl JournalBackend for MemoryJournal {
    async fn put(&self, user_id: &str, id: &EntryId, record: &JournalRecord) -> DbResult<()> {
        let value = serde_json::to_value(record)?;
        self.insert_raw(user_id, id.as_str(), value).await;
        Ok(())
    }

    async fn remove(&self, user_id: &str, id: &EntryId) -> DbResult<()> {
        self.remove_raw(user_id, id.as_str()).await;
        Ok(())
    }

    async fn watch(&self, user_id: &str) -> DbResult<SnapshotReceiver> {
        let (sender, receiver) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);
        let mut state = self.inner.lock().await;
        // Deliver the initial snapshot before registering, so the first
        // value a watcher sees is the collection as of subscription time.
        let _ = sender.try_send(state.snapshot(user_id));
        state
            .watchers
            .entry(user_id.to_string())
            .or_default()
            .push(sender);
        Ok(receiver)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::models::{Entry, Mood};

    use super::*;

    #[tokio::test]
    async fn watch_delivers_the_initial_snapshot() {
        let journal = MemoryJournal::new();
        journal
            .insert_raw("user-1", "entry-1", json!({"title": "Great Start"}))
            .await;

        let mut snapshots = journal.watch("user-1").await.unwrap();
        let initial = snapshots.recv().await.unwrap();
        assert_eq!(initial.len(), 1);
        assert!(initial.contains_key("entry-1"));
    }

    #[tokio::test]
    async fn writes_fan_out_to_every_watcher() {
        let journal = MemoryJournal::new();
        let mut first = journal.watch("user-1").await.unwrap();
        let mut second = journal.watch("user-1").await.unwrap();
        assert!(first.recv().await.unwrap().is_empty());
        assert!(second.recv().await.unwrap().is_empty());

        let entry = Entry::new("user-1", "Great Start", "Morning run.", Mood::happy());
        journal
            .put("user-1", &entry.id, &entry.to_record())
            .await
            .unwrap();

        assert_eq!(first.recv().await.unwrap().len(), 1);
        assert_eq!(second.recv().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn writes_are_scoped_per_user() {
        let journal = MemoryJournal::new();
        let mut other = journal.watch("user-2").await.unwrap();
        assert!(other.recv().await.unwrap().is_empty());

        journal
            .insert_raw("user-1", "entry-1", json!({"title": "Great Start"}))
            .await;

        assert!(other.try_recv().is_err());
        assert!(journal.records("user-2").await.is_empty());
    }

    #[tokio::test]
    async fn remove_broadcasts_the_shrunken_collection() {
        let journal = MemoryJournal::new();
        journal
            .insert_raw("user-1", "entry-1", json!({"title": "Great Start"}))
            .await;

        let mut snapshots = journal.watch("user-1").await.unwrap();
        snapshots.recv().await.unwrap();

        journal.remove_raw("user-1", "entry-1").await;
        assert!(snapshots.recv().await.unwrap().is_empty());
    }
}
