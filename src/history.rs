//! Per-user chat history persistence.
//!
//! History is stored as one JSON array of [`MessageRecord`]s per user. Every
//! read and write goes through the message codec, so a stored record with an
//! unknown role surfaces as [`StoreError::Codec`] instead of being dropped.

use async_trait::async_trait;

use crate::db::Database;
use crate::error::StoreError;
use crate::message::{decode_all, encode_all, ChatTurn, MessageRecord};

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Stored turns for `user_id`, oldest first. Unknown users have none.
    async fn get_history(&self, user_id: &str) -> Result<Vec<ChatTurn>, StoreError>;

    /// Replace the stored history for `user_id`.
    async fn save_history(&self, user_id: &str, history: &[ChatTurn]) -> Result<(), StoreError>;
}

pub struct SqliteHistoryStore {
    db: Database,
}

impl SqliteHistoryStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn get_history(&self, user_id: &str) -> Result<Vec<ChatTurn>, StoreError> {
        let row: Option<String> =
            sqlx::query_scalar("SELECT messages_json FROM chat_history WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(self.db.pool())
                .await?;

        let Some(json) = row else {
            return Ok(Vec::new());
        };
        let records: Vec<MessageRecord> = serde_json::from_str(&json)?;
        Ok(decode_all(&records)?)
    }

    async fn save_history(&self, user_id: &str, history: &[ChatTurn]) -> Result<(), StoreError> {
        let records = encode_all(history)?;
        let json = serde_json::to_string(&records)?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO chat_history (user_id, messages_json, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                messages_json = excluded.messages_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(&json)
        .bind(now)
        .execute(self.db.pool())
        .await?;

        tracing::debug!(user_id, turns = history.len(), "saved chat history");
        Ok(())
    }
}
