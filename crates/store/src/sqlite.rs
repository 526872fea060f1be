//! SQLite conversation store.
//!
//! Two tables:
//! - `conversations` — thread id, title, creation timestamp
//! - `messages` — auto-increment id, thread id (FK, cascade delete),
//!   content, author flag, creation timestamp
//!
//! Every operation is one pooled statement in auto-commit mode. Nothing
//! here holds a transaction open across an await on the model or a tool;
//! the streaming turn appends assistant content one short write at a time,
//! so a turn killed mid-stream leaves a valid partial row behind.

use async_trait::async_trait;
use brook_core::error::StoreError;
use brook_core::store::{ConversationRecord, ConversationStore, MessageRecord};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A SQLite-backed conversation store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new store from a file path.
    ///
    /// The database and all tables are created automatically.
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database
    /// (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite conversation store initialized at {path}");
        Ok(store)
    }

    /// Run schema migrations — creates both tables.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                thread_id   TEXT PRIMARY KEY,
                title       TEXT NOT NULL DEFAULT 'New Chat',
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversations table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id   TEXT NOT NULL
                            REFERENCES conversations(thread_id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                from_user   INTEGER NOT NULL,
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id, id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationRecord, StoreError> {
        let thread_id: String = row
            .try_get("thread_id")
            .map_err(|e| StoreError::QueryFailed(format!("thread_id column: {e}")))?;
        let title: String = row
            .try_get("title")
            .map_err(|e| StoreError::QueryFailed(format!("title column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(ConversationRecord {
            thread_id,
            title,
            created_at,
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<MessageRecord, StoreError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let thread_id: String = row
            .try_get("thread_id")
            .map_err(|e| StoreError::QueryFailed(format!("thread_id column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))?;
        let from_user: i64 = row
            .try_get("from_user")
            .map_err(|e| StoreError::QueryFailed(format!("from_user column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(MessageRecord {
            id,
            thread_id,
            content,
            from_user: from_user != 0,
            created_at,
        })
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn create_conversation(&self, thread_id: &str, title: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO conversations (thread_id, title, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(thread_id) DO NOTHING
            "#,
        )
        .bind(thread_id)
        .bind(title)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT conversation failed: {e}")))?;

        Ok(())
    }

    async fn conversation(
        &self,
        thread_id: &str,
    ) -> Result<Option<ConversationRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE thread_id = ?1")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("SELECT conversation: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(Self::row_to_conversation(r)?)),
            None => Ok(None),
        }
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM conversations ORDER BY created_at DESC, thread_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("SELECT conversations: {e}")))?;

        rows.iter().map(Self::row_to_conversation).collect()
    }

    async fn rename_conversation(&self, thread_id: &str, title: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE conversations SET title = ?2 WHERE thread_id = ?1")
            .bind(thread_id)
            .bind(title)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE title failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_conversation(&self, thread_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM conversations WHERE thread_id = ?1")
            .bind(thread_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE conversation failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_message(
        &self,
        thread_id: &str,
        content: &str,
        from_user: bool,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO messages (thread_id, content, from_user, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(thread_id)
        .bind(content)
        .bind(from_user as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT message failed: {e}")))?;

        Ok(result.last_insert_rowid())
    }

    async fn append_content(&self, message_id: i64, delta: &str) -> Result<(), StoreError> {
        // Single-statement append: concurrent appends to different rows can
        // interleave freely, appends to the same row serialize in SQLite.
        sqlx::query("UPDATE messages SET content = content || ?2 WHERE id = ?1")
            .bind(message_id)
            .bind(delta)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE content failed: {e}")))?;

        Ok(())
    }

    async fn messages(&self, thread_id: &str) -> Result<Vec<MessageRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM messages WHERE thread_id = ?1 ORDER BY id")
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("SELECT messages: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn count_user_messages(&self, thread_id: &str) -> Result<u32, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM messages WHERE thread_id = ?1 AND from_user = 1",
        )
        .bind(thread_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("COUNT user messages: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| StoreError::QueryFailed(format!("cnt column: {e}")))?;

        Ok(cnt as u32)
    }

    async fn user_messages(&self, thread_id: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT content FROM messages WHERE thread_id = ?1 AND from_user = 1 ORDER BY id",
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("SELECT user messages: {e}")))?;

        rows.iter()
            .map(|row| {
                row.try_get("content")
                    .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn create_and_fetch_conversation() {
        let store = test_store().await;
        store.create_conversation("t1", "New Chat").await.unwrap();

        let conv = store.conversation("t1").await.unwrap().unwrap();
        assert_eq!(conv.thread_id, "t1");
        assert_eq!(conv.title, "New Chat");
    }

    #[tokio::test]
    async fn create_conversation_is_idempotent() {
        let store = test_store().await;
        store.create_conversation("t1", "First Title").await.unwrap();
        store.create_conversation("t1", "Second Title").await.unwrap();

        let conv = store.conversation("t1").await.unwrap().unwrap();
        assert_eq!(conv.title, "First Title");
        assert_eq!(store.list_conversations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_conversation_is_none() {
        let store = test_store().await;
        assert!(store.conversation("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_conversations_newest_first() {
        let store = test_store().await;
        store.create_conversation("older", "A").await.unwrap();
        // Same-second timestamps tie-break on thread_id; pick ids that
        // exercise the secondary ordering deterministically.
        store.create_conversation("newer", "B").await.unwrap();

        let all = store.list_conversations().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].created_at >= all[1].created_at);
    }

    #[tokio::test]
    async fn messages_ordered_by_id() {
        let store = test_store().await;
        store.create_conversation("t1", "New Chat").await.unwrap();

        let first = store.insert_message("t1", "hello", true).await.unwrap();
        let second = store.insert_message("t1", "hi there", false).await.unwrap();
        assert!(second > first);

        let msgs = store.messages("t1").await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content, "hello");
        assert!(msgs[0].from_user);
        assert_eq!(msgs[1].content, "hi there");
        assert!(!msgs[1].from_user);
    }

    #[tokio::test]
    async fn listing_messages_is_idempotent() {
        let store = test_store().await;
        store.create_conversation("t1", "New Chat").await.unwrap();
        store.insert_message("t1", "one", true).await.unwrap();
        store.insert_message("t1", "two", false).await.unwrap();

        let a = store.messages("t1").await.unwrap();
        let b = store.messages("t1").await.unwrap();
        let ids_a: Vec<i64> = a.iter().map(|m| m.id).collect();
        let ids_b: Vec<i64> = b.iter().map(|m| m.id).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(
            a.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            b.iter().map(|m| m.content.as_str()).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn append_content_grows_row() {
        let store = test_store().await;
        store.create_conversation("t1", "New Chat").await.unwrap();
        let id = store.insert_message("t1", "", false).await.unwrap();

        store.append_content(id, "Hello").await.unwrap();
        store.append_content(id, ", ").await.unwrap();
        store.append_content(id, "world").await.unwrap();

        let msgs = store.messages("t1").await.unwrap();
        assert_eq!(msgs[0].content, "Hello, world");
    }

    #[tokio::test]
    async fn delete_cascades_to_messages() {
        let store = test_store().await;
        store.create_conversation("t1", "New Chat").await.unwrap();
        store.insert_message("t1", "hello", true).await.unwrap();
        store.insert_message("t1", "reply", false).await.unwrap();

        let deleted = store.delete_conversation("t1").await.unwrap();
        assert!(deleted);

        assert!(store.messages("t1").await.unwrap().is_empty());
        assert!(store.conversation("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_unknown_returns_false() {
        let store = test_store().await;
        assert!(!store.delete_conversation("nope").await.unwrap());
    }

    #[tokio::test]
    async fn rename_conversation_works() {
        let store = test_store().await;
        store.create_conversation("t1", "New Chat").await.unwrap();

        assert!(store.rename_conversation("t1", "Weather Talk").await.unwrap());
        let conv = store.conversation("t1").await.unwrap().unwrap();
        assert_eq!(conv.title, "Weather Talk");
    }

    #[tokio::test]
    async fn rename_unknown_returns_false() {
        let store = test_store().await;
        assert!(!store.rename_conversation("nope", "X").await.unwrap());
    }

    #[tokio::test]
    async fn rename_after_delete_returns_false() {
        let store = test_store().await;
        store.create_conversation("t1", "New Chat").await.unwrap();
        store.delete_conversation("t1").await.unwrap();
        assert!(!store.rename_conversation("t1", "X").await.unwrap());
        assert!(!store.delete_conversation("t1").await.unwrap());
    }

    #[tokio::test]
    async fn user_message_counting() {
        let store = test_store().await;
        store.create_conversation("t1", "New Chat").await.unwrap();
        store.insert_message("t1", "q1", true).await.unwrap();
        store.insert_message("t1", "a1", false).await.unwrap();
        store.insert_message("t1", "q2", true).await.unwrap();

        assert_eq!(store.count_user_messages("t1").await.unwrap(), 2);
        assert_eq!(
            store.user_messages("t1").await.unwrap(),
            vec!["q1".to_string(), "q2".to_string()]
        );
    }

    #[tokio::test]
    async fn unknown_thread_has_empty_history() {
        let store = test_store().await;
        assert!(store.messages("ghost").await.unwrap().is_empty());
        assert_eq!(store.count_user_messages("ghost").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn message_ids_are_store_wide_monotonic() {
        let store = test_store().await;
        store.create_conversation("a", "New Chat").await.unwrap();
        store.create_conversation("b", "New Chat").await.unwrap();

        let m1 = store.insert_message("a", "1", true).await.unwrap();
        let m2 = store.insert_message("b", "2", true).await.unwrap();
        let m3 = store.insert_message("a", "3", false).await.unwrap();
        assert!(m1 < m2 && m2 < m3);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("sqlite://{}/chat.db", dir.path().display());

        {
            let store = SqliteStore::new(&path).await.unwrap();
            store.create_conversation("t1", "New Chat").await.unwrap();
            store.insert_message("t1", "hello", true).await.unwrap();
        }

        let store = SqliteStore::new(&path).await.unwrap();
        let msgs = store.messages("t1").await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "hello");
    }
}
