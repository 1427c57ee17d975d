//! mindly-core - Core library for Mindly
//!
//! This crate contains the shared models, auth and database clients, and the
//! session and journal services used by all Mindly interfaces.

pub mod auth;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod util;

pub use models::{Entry, EntryId, Mood};
pub use services::{JournalStore, Session, SessionManager};
