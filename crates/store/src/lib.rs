//! SQLite conversation store for Brook.
//!
//! Implements [`brook_core::ConversationStore`] over a sqlx connection pool.

pub mod sqlite;

pub use sqlite::SqliteStore;
