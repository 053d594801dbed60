use relaychat_types::Role;
use thiserror::Error;

/// Errors raised by the upstream LLM adapter, before or during a stream.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network failure, or the body stream was cut off.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered the initial request with a non-2xx status.
    #[error("provider returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The body was not a well-formed event stream.
    #[error("malformed event stream: {0}")]
    Event(String),

    /// An event in the stream was not valid provider JSON.
    #[error("malformed stream event: {0}")]
    Json(#[from] serde_json::Error),

    /// The provider reported an error inside the stream.
    #[error("provider error: {0}")]
    Api(String),

    /// The prompt or the candidate was blocked by the provider.
    #[error("response blocked: {0}")]
    Blocked(String),

    #[error("conversation history is empty")]
    EmptyHistory,

    #[error("role `{0}` is not supported in the streaming path")]
    UnsupportedRole(Role),
}

/// Errors raised by [`crate::client::ApiClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx status. `message` is the `error`
    /// field of the JSON body when present, the raw body otherwise.
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

/// An operation was attempted in a state that does not allow it.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot {op} while {state}")]
pub struct ConsumerError {
    pub op: &'static str,
    pub state: &'static str,
}

/// Why [`crate::consumer::StreamConsumer::consume`] stopped early.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The transport failed mid-body.
    #[error("reading the reply failed: {0}")]
    Read(#[from] ClientError),

    #[error(transparent)]
    State(#[from] ConsumerError),
}
