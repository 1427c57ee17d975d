//! Data models for Mindly

mod entry;
mod mood;

pub use entry::{Entry, EntryId, JournalRecord};
pub use mood::Mood;
