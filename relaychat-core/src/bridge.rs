//! Conversation persistence bridge.
//!
//! The only writer of durable conversation and message records on the
//! client side. A reply is committed only after its stream ended cleanly.
//! Commit failures are logged and swallowed: the UI keeps the unconfirmed
//! placeholder and carries on.

use std::future::Future;

use relaychat_types::{Conversation, Message, Role};
use tracing::{info, warn};

use crate::error::ClientError;
use crate::text::generate_title;

/// Access to the durable conversation/message tables.
///
/// [`crate::client::ApiClient`] is the production implementation.
pub trait HistoryStore: Send + Sync {
    fn create_conversation(
        &self,
        title: &str,
    ) -> impl Future<Output = Result<Conversation, ClientError>> + Send;

    fn save_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> impl Future<Output = Result<Message, ClientError>> + Send;

    /// Refresh `updated_at`.
    fn touch_conversation(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<Conversation, ClientError>> + Send;

    /// Newest activity first.
    fn list_conversations(
        &self,
    ) -> impl Future<Output = Result<Vec<Conversation>, ClientError>> + Send;

    /// Oldest first.
    fn list_messages(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<Vec<Message>, ClientError>> + Send;
}

#[derive(Debug, Clone)]
pub struct PersistenceBridge<S> {
    store: S,
}

impl<S: HistoryStore> PersistenceBridge<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create the conversation for an exchange whose first user message is
    /// `first_message`. The title is derived from it once.
    pub async fn open_conversation(&self, first_message: &str) -> Result<Conversation, ClientError> {
        let conversation = self
            .store
            .create_conversation(&generate_title(first_message))
            .await?;
        info!(conversation_id = %conversation.id, title = %conversation.title, "conversation created");
        Ok(conversation)
    }

    pub async fn save_user_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<Message, ClientError> {
        self.store
            .save_message(conversation_id, Role::User, content)
            .await
    }

    /// Persist the settled reply and refresh the conversation timestamp.
    ///
    /// Returns the persisted record, or `None` when saving failed. The
    /// timestamp is refreshed either way.
    pub async fn commit_reply(&self, conversation_id: &str, text: &str) -> Option<Message> {
        let saved = match self
            .store
            .save_message(conversation_id, Role::Assistant, text)
            .await
        {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(error = %e, %conversation_id, "failed to persist assistant message");
                None
            }
        };
        if let Err(e) = self.store.touch_conversation(conversation_id).await {
            warn!(error = %e, %conversation_id, "failed to refresh conversation timestamp");
        }
        saved
    }
}
