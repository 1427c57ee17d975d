//! Application services
//!
//! Stateful services composing the auth and database clients into the
//! session and journal surfaces the UI layers consume.

pub mod journal;
pub mod session;

pub use journal::JournalStore;
pub use session::{Session, SessionManager};
