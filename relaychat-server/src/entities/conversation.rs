use std::future::Future;

use chrono::{DateTime, Utc};

use crate::entities::{ConversationRecord, SqliteStore, decode_ts, encode_ts};

/// Conversations are always scoped to their owner; a row owned by someone
/// else is indistinguishable from a missing one.
pub trait ConversationStore: Send + Sync + 'static {
    fn create_conversation(
        &self,
        conversation: ConversationRecord,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn get_conversation(
        &self,
        id: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<ConversationRecord>, sqlx::Error>> + Send;

    /// Most recently updated first.
    fn list_conversations(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<ConversationRecord>, sqlx::Error>> + Send;

    /// Set `updated_at` to `now`. `None` when not found for this owner.
    fn touch_conversation(
        &self,
        id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<ConversationRecord>, sqlx::Error>> + Send;
}

type ConversationRow = (String, String, String, String, String);

fn conversation_from_row(
    (id, user_id, title, created_at, updated_at): ConversationRow,
) -> ConversationRecord {
    ConversationRecord {
        id,
        user_id,
        title,
        created_at: decode_ts(&created_at, "conversations.created_at"),
        updated_at: decode_ts(&updated_at, "conversations.updated_at"),
    }
}

impl ConversationStore for SqliteStore {
    async fn create_conversation(&self, conversation: ConversationRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO conversations (id, user_id, title, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&conversation.id)
        .bind(&conversation.user_id)
        .bind(&conversation.title)
        .bind(encode_ts(conversation.created_at))
        .bind(encode_ts(conversation.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_conversation(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<ConversationRecord>, sqlx::Error> {
        let row: Option<ConversationRow> = sqlx::query_as(
            "SELECT id, user_id, title, created_at, updated_at \
             FROM conversations WHERE id = ?1 AND user_id = ?2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(conversation_from_row))
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationRecord>, sqlx::Error> {
        let rows: Vec<ConversationRow> = sqlx::query_as(
            "SELECT id, user_id, title, created_at, updated_at \
             FROM conversations WHERE user_id = ?1 \
             ORDER BY updated_at DESC, rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(conversation_from_row).collect())
    }

    async fn touch_conversation(
        &self,
        id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ConversationRecord>, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2 AND user_id = ?3",
        )
        .bind(encode_ts(now))
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_conversation(id, user_id).await
    }
}
