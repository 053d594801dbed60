//! Shared data model for relaychat.
//!
//! These types travel between the server's JSON API, the core client, and
//! the CLI. Server-side OpenAPI schemas mirror their JSON shape.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

// ── Roles ─────────────────────────────────────────────────────────────────────

/// Author of a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

// ── Persisted records ─────────────────────────────────────────────────────────

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Prefix of the temporary id carried by an unpersisted placeholder message.
pub const PLACEHOLDER_ID_PREFIX: &str = "temp-";

impl Message {
    /// Build the locally synthesised assistant placeholder for an in-flight
    /// reply. Its id is `temp-<unix millis>` and its content starts empty.
    pub fn placeholder(conversation_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("{PLACEHOLDER_ID_PREFIX}{}", now.timestamp_millis()),
            conversation_id: conversation_id.into(),
            role: Role::Assistant,
            content: String::new(),
            created_at: now,
        }
    }

    /// `true` while this message has not been replaced by a persisted record.
    pub fn is_placeholder(&self) -> bool {
        self.id.starts_with(PLACEHOLDER_ID_PREFIX)
    }

    /// The `{role, content}` pair submitted to the relay.
    pub fn to_turn(&self) -> ChatTurn {
        ChatTurn {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// A conversation owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    /// Derived once from the first user message; never changes.
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Relay wire types ──────────────────────────────────────────────────────────

/// One entry of the history posted to `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Request body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayRequest {
    pub messages: Vec<ChatTurn>,
}

// ── Streaming stats ───────────────────────────────────────────────────────────

/// Live throughput figures, recomputed on every received chunk. Never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamingStats {
    /// Heuristic token estimate of the accumulated text.
    pub token_count: u64,
    /// Milliseconds since the request was started.
    pub elapsed_ms: u64,
    /// Always finite and non-negative.
    pub tokens_per_second: f64,
}

impl fmt::Display for StreamingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tokens · {:.1} tokens/s · {:.2}s",
            self.token_count,
            self.tokens_per_second,
            self.elapsed_ms as f64 / 1000.0
        )
    }
}

// ── Auth ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
}

/// Returned by sign-up and sign-in. `token` is sent back as a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// JSON body of every non-2xx API response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
