use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One history entry posted to the relay.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatTurnSchema {
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
}

/// Body of `POST /api/chat`. Oldest first; the last entry is the new user
/// message.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub messages: Vec<ChatTurnSchema>,
}
