//! Upstream LLM adapter.
//!
//! [`ChatModel`] is the seam between the relay endpoint and a hosted model:
//! given the conversation history it opens a stream and hands back a lazy,
//! finite sequence of text fragments. Fragment size and cadence are entirely
//! up to the provider. Errors during setup are returned from
//! [`ChatModel::stream_chat`]; errors after that arrive as an `Err` item and
//! end the stream. Nothing is retried.

pub mod gemini;

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use relaychat_types::{ChatTurn, Role};

use crate::error::LlmError;

pub use gemini::GeminiAdapter;

/// Lazy sequence of text fragments, in the order the provider produced them.
pub type FragmentStream = BoxStream<'static, Result<String, LlmError>>;

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2048;
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Model parameters, fixed when the adapter is constructed.
#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Provider origin without a trailing slash.
    pub base_url: String,
}

impl LlmConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_owned(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            base_url: DEFAULT_BASE_URL.to_owned(),
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// A hosted model that streams a reply to a conversation.
#[async_trait]
pub trait ChatModel: Send + Sync + 'static {
    /// Open a reply stream for `history` (oldest first, last entry is the
    /// new prompt).
    async fn stream_chat(&self, history: &[ChatTurn]) -> Result<FragmentStream, LlmError>;
}

/// Split `history` into the prior turns and the new prompt.
///
/// `system` turns have no mapping onto the provider's two-party vocabulary
/// and are rejected.
pub fn split_history(history: &[ChatTurn]) -> Result<(&[ChatTurn], &ChatTurn), LlmError> {
    if let Some(turn) = history.iter().find(|t| t.role == Role::System) {
        return Err(LlmError::UnsupportedRole(turn.role));
    }
    let (last, prior) = history.split_last().ok_or(LlmError::EmptyHistory)?;
    Ok((prior, last))
}
