//! ConversationStore trait — the abstraction over durable conversation state.
//!
//! The store exclusively owns conversation and message rows; the agent loop
//! and session controller only ever hold identifiers and strings passed by
//! value. Every operation is a single short-lived read or write — the store
//! is never asked to hold a transaction open across a model or tool call.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted conversation row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Opaque thread identifier (UUID v4, client-opaque)
    pub thread_id: String,

    /// Short display title; starts as a placeholder, mutated by the
    /// title summarizer or an explicit rename
    pub title: String,

    /// Creation timestamp, immutable once set
    pub created_at: DateTime<Utc>,
}

/// A persisted message row.
///
/// `id` is the store-wide auto-increment sequence number: messages of one
/// conversation ordered by `id` are in chronological order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub thread_id: String,
    pub content: String,
    pub from_user: bool,
    pub created_at: DateTime<Utc>,
}

/// The durable conversation store.
///
/// Implementations must guarantee:
/// - a conversation row exists before any message row referencing it
/// - deleting a conversation cascades to its messages
/// - `append_content` is atomic with respect to concurrent appends
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation row if none exists for `thread_id`.
    ///
    /// Idempotent: an existing row (and its title) is left untouched, so a
    /// client-supplied identifier for an unknown thread becomes valid with
    /// empty history instead of an error.
    async fn create_conversation(
        &self,
        thread_id: &str,
        title: &str,
    ) -> std::result::Result<(), StoreError>;

    /// Fetch one conversation row.
    async fn conversation(
        &self,
        thread_id: &str,
    ) -> std::result::Result<Option<ConversationRecord>, StoreError>;

    /// List all conversations, newest first.
    async fn list_conversations(&self) -> std::result::Result<Vec<ConversationRecord>, StoreError>;

    /// Set a conversation's title. Returns `false` if the thread is unknown.
    async fn rename_conversation(
        &self,
        thread_id: &str,
        title: &str,
    ) -> std::result::Result<bool, StoreError>;

    /// Delete a conversation and all its messages. Returns `false` if the
    /// thread is unknown.
    async fn delete_conversation(&self, thread_id: &str)
    -> std::result::Result<bool, StoreError>;

    /// Insert a message row and return its sequence number.
    async fn insert_message(
        &self,
        thread_id: &str,
        content: &str,
        from_user: bool,
    ) -> std::result::Result<i64, StoreError>;

    /// Append a content delta to an existing message row.
    async fn append_content(
        &self,
        message_id: i64,
        delta: &str,
    ) -> std::result::Result<(), StoreError>;

    /// All messages of a conversation, ordered by sequence number.
    /// Unknown threads yield an empty list.
    async fn messages(
        &self,
        thread_id: &str,
    ) -> std::result::Result<Vec<MessageRecord>, StoreError>;

    /// How many user-authored messages the conversation holds.
    async fn count_user_messages(&self, thread_id: &str)
    -> std::result::Result<u32, StoreError>;

    /// Contents of all user-authored messages, in chronological order.
    async fn user_messages(&self, thread_id: &str)
    -> std::result::Result<Vec<String>, StoreError>;
}
