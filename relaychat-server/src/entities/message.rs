use std::future::Future;
use std::str::FromStr;

use relaychat_types::Role;

use crate::entities::{MessageRecord, SqliteStore, decode_ts, encode_ts};

pub trait MessageStore: Send + Sync + 'static {
    fn insert_message(&self, message: MessageRecord) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Oldest first.
    fn list_messages(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<Vec<MessageRecord>, sqlx::Error>> + Send;
}

impl MessageStore for SqliteStore {
    async fn insert_message(&self, message: MessageRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(encode_ts(message.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, sqlx::Error> {
        let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT id, conversation_id, role, content, created_at \
             FROM messages WHERE conversation_id = ?1 \
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(id, conversation_id, role, content, created_at)| {
                let role = Role::from_str(&role).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
                Ok(MessageRecord {
                    id,
                    conversation_id,
                    role,
                    content,
                    created_at: decode_ts(&created_at, "messages.created_at"),
                })
            })
            .collect()
    }
}
