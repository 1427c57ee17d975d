//! Mood model

use serde::{Deserialize, Serialize};

/// A mood attached to a journal entry.
///
/// The entry form offers the closed catalog of [`Mood::happy`] through
/// [`Mood::anxious`], but the store persists whatever mood it is handed
/// without validating the id, so records written by newer clients stay
/// readable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mood {
    /// Stable identifier, e.g. `"happy"`
    pub id: String,
    /// Human-readable label shown next to the emoji
    pub description: String,
    /// Emoji rendered in lists and pickers
    pub emoji: String,
}

impl Mood {
    /// Create a mood from its parts
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        emoji: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            emoji: emoji.into(),
        }
    }

    #[must_use]
    pub fn happy() -> Self {
        Self::new("happy", "Happy", "\u{1f60a}")
    }

    #[must_use]
    pub fn sad() -> Self {
        Self::new("sad", "Sad", "\u{1f622}")
    }

    #[must_use]
    pub fn angry() -> Self {
        Self::new("angry", "Angry", "\u{1f620}")
    }

    #[must_use]
    pub fn anxious() -> Self {
        Self::new("anxious", "Anxious", "\u{1f630}")
    }
}
