//! Journal store: a live, ordered mirror of one user's remote collection.

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::{JournalBackend, Snapshot};
use crate::models::{Entry, EntryId, Mood};

/// Rebuild the ordered entry list from a collection snapshot.
///
/// Records that fail to parse are dropped without failing the rest. The
/// result is sorted newest first.
#[must_use]
pub fn reconcile(snapshot: &Snapshot) -> Vec<Entry> {
    let mut entries: Vec<Entry> = snapshot
        .iter()
        .filter_map(|(id, value)| {
            let entry = Entry::from_record(id, value);
            if entry.is_none() {
                tracing::debug!(id, "Dropping malformed journal record");
            }
            entry
        })
        .collect();
    sort_newest_first(&mut entries);
    entries
}

fn sort_newest_first(entries: &mut [Entry]) {
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// In-memory ordered view of one signed-in user's journal.
///
/// Opening the store starts a standing collection listener; every snapshot
/// it delivers replaces the list wholesale. Mutations write to the backend
/// and edit the local list optimistically without waiting for the snapshot
/// to confirm. Opened without a user, the store is inert: the list stays
/// empty and every mutation is a silent no-op.
pub struct JournalStore<B> {
    backend: B,
    user_id: Option<String>,
    entries: watch::Sender<Vec<Entry>>,
    loaded: watch::Sender<bool>,
    listener: Option<JoinHandle<()>>,
}

impl<B: JournalBackend> JournalStore<B> {
    /// Open the store for `user_id` and start its collection listener.
    ///
    /// A listener that cannot be opened is logged and skipped; the store
    /// still accepts writes, it just never hears about remote changes.
    pub async fn open(backend: B, user_id: Option<String>) -> Self {
        let entries = watch::Sender::new(Vec::new());
        let loaded = watch::Sender::new(false);
        let listener = match user_id.as_deref() {
            Some(uid) => open_listener(&backend, uid, &entries, &loaded).await,
            None => None,
        };
        if listener.is_none() {
            // No listener means no initial snapshot is coming.
            loaded.send_replace(true);
        }

        Self {
            backend,
            user_id,
            entries,
            loaded,
            listener,
        }
    }

    /// The user this store was opened for.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Current ordered entry list.
    #[must_use]
    pub fn entries(&self) -> Vec<Entry> {
        self.entries.borrow().clone()
    }

    /// Subscribe to list snapshots.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Vec<Entry>> {
        self.entries.subscribe()
    }

    /// Resolve once the listener has applied its first collection snapshot.
    ///
    /// Resolves immediately when the store has no listener. Carries no
    /// deadline; callers that cannot wait forever wrap it in a timeout.
    pub async fn wait_loaded(&self) {
        let mut loaded = self.loaded.subscribe();
        let _ = loaded.wait_for(|ready| *ready).await;
    }

    /// Create a new entry and persist it.
    ///
    /// The entry joins the local list immediately; a failed remote write is
    /// logged and the entry stays until the next snapshot says otherwise.
    pub async fn add(
        &self,
        title: impl Into<String>,
        content: impl Into<String>,
        mood: Mood,
    ) -> Option<Entry> {
        let user_id = self.user_id.as_deref()?;
        let entry = Entry::new(user_id, title, content, mood);

        if let Err(error) = self
            .backend
            .put(user_id, &entry.id, &entry.to_record())
            .await
        {
            tracing::warn!(id = %entry.id, "Journal write failed: {error}");
        }

        self.edit_list(|list| match list.iter_mut().find(|existing| existing.id == entry.id) {
            Some(existing) => *existing = entry.clone(),
            None => list.push(entry.clone()),
        });
        Some(entry)
    }

    /// Replace an entry's title, content, and mood, keeping its identity.
    ///
    /// The remote record is rewritten whether or not the entry is present
    /// locally; the local list only changes when a matching id is found.
    pub async fn update(
        &self,
        entry: &Entry,
        title: impl Into<String>,
        content: impl Into<String>,
        mood: Mood,
    ) -> Option<Entry> {
        let user_id = self.user_id.as_deref()?;
        let replacement = entry.with_changes(title, content, mood);

        if let Err(error) = self
            .backend
            .put(user_id, &replacement.id, &replacement.to_record())
            .await
        {
            tracing::warn!(id = %replacement.id, "Journal write failed: {error}");
        }

        self.edit_list(|list| {
            if let Some(existing) = list.iter_mut().find(|existing| existing.id == replacement.id) {
                *existing = replacement.clone();
            }
        });
        Some(replacement)
    }

    /// Delete an entry remotely and drop it from the local list.
    pub async fn delete(&self, entry: &Entry) {
        let Some(user_id) = self.user_id.as_deref() else {
            return;
        };

        if let Err(error) = self.backend.remove(user_id, &entry.id).await {
            tracing::warn!(id = %entry.id, "Journal delete failed: {error}");
        }

        self.remove_local(&entry.id);
    }

    fn remove_local(&self, id: &EntryId) {
        self.edit_list(|list| list.retain(|existing| existing.id != *id));
    }

    /// Apply one optimistic edit to a copy of the list and publish it.
    ///
    /// Edits race with snapshot arrivals; whichever publishes last wins,
    /// and the next snapshot settles the matter.
    fn edit_list(&self, edit: impl FnOnce(&mut Vec<Entry>)) {
        let mut list = self.entries.borrow().clone();
        edit(&mut list);
        sort_newest_first(&mut list);
        self.entries.send_replace(list);
    }
}

impl<B> Drop for JournalStore<B> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

async fn open_listener<B: JournalBackend>(
    backend: &B,
    user_id: &str,
    entries: &watch::Sender<Vec<Entry>>,
    loaded: &watch::Sender<bool>,
) -> Option<JoinHandle<()>> {
    match backend.watch(user_id).await {
        Ok(mut snapshots) => {
            let entries = entries.clone();
            let loaded = loaded.clone();
            Some(tokio::spawn(async move {
                while let Some(snapshot) = snapshots.recv().await {
                    let list = reconcile(&snapshot);
                    tracing::debug!(count = list.len(), "Applying journal snapshot");
                    entries.send_replace(list);
                    loaded.send_replace(true);
                }
                tracing::debug!("Journal listener finished");
            }))
        }
        Err(error) => {
            tracing::warn!("Could not open the journal listener: {error}");
            None
        }
    }
}
