//! Journal entry model and its remote wire format

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::Mood;
use crate::util::unix_timestamp_now;

/// A unique identifier for a journal entry.
///
/// Entries created locally use UUID v7 strings, which sort by creation time.
/// Remote collection keys written by other clients are accepted as-is, so the
/// id is stored as an opaque string rather than a parsed UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryId(String);

impl EntryId {
    /// Create a new unique entry ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One journal entry as held in memory
///
/// Not a wire shape: entries cross the network only as [`JournalRecord`]s
/// keyed by their id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Unique identifier, also the remote collection key
    pub id: EntryId,
    /// Owning user's id
    pub user_id: String,
    /// Creation time as Unix seconds; never changes after creation
    pub created_at: i64,
    /// Mood recorded with the entry
    pub mood: Mood,
    /// Short headline
    pub title: String,
    /// Body text
    pub content: String,
}

impl Entry {
    /// Create a new entry owned by `user_id`, stamped with a fresh id and
    /// the current time.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        mood: Mood,
    ) -> Self {
        Self {
            id: EntryId::new(),
            user_id: user_id.into(),
            created_at: unix_timestamp_now(),
            mood,
            title: title.into(),
            content: content.into(),
        }
    }

    /// Build the replacement for an edit.
    ///
    /// Id, owner, and creation time carry over unchanged; only title,
    /// content, and mood are replaced.
    #[must_use]
    pub fn with_changes(
        &self,
        title: impl Into<String>,
        content: impl Into<String>,
        mood: Mood,
    ) -> Self {
        Self {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            created_at: self.created_at,
            mood,
            title: title.into(),
            content: content.into(),
        }
    }

    /// Wire form of this entry.
    #[must_use]
    pub fn to_record(&self) -> JournalRecord {
        JournalRecord {
            title: self.title.clone(),
            content: self.content.clone(),
            timestamp: self.created_at,
            mood: self.mood.clone(),
            user_id: self.user_id.clone(),
        }
    }

    /// Parse one remote record keyed by `id`.
    ///
    /// Returns `None` when any required field is missing or has the wrong
    /// type; callers drop such records rather than failing the whole
    /// collection.
    #[must_use]
    pub fn from_record(id: &str, value: &Value) -> Option<Self> {
        let record: JournalRecord = serde_json::from_value(value.clone()).ok()?;
        Some(record.into_entry(EntryId::from(id)))
    }
}

/// One record as stored in the remote collection.
///
/// The collection key is the entry id. `userId` repeats the owner already
/// named by the collection path; it is persisted anyway so a record is
/// self-describing when read outside its path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub title: String,
    pub content: String,
    /// Creation time as Unix seconds
    pub timestamp: i64,
    pub mood: Mood,
    #[serde(rename = "userId")]
    pub user_id: String,
}

impl JournalRecord {
    /// Rehydrate the in-memory entry for the record stored under `id`.
    #[must_use]
    pub fn into_entry(self, id: EntryId) -> Entry {
        Entry {
            id,
            user_id: self.user_id,
            created_at: self.timestamp,
            mood: self.mood,
            title: self.title,
            content: self.content,
        }
    }
}
