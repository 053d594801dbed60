//! relaychat-core: the streaming relay pipeline.
//!
//! Server side, [`llm`] turns a conversation history into a lazy stream of
//! text fragments from the hosted model. Client side, [`client`] opens the
//! relay, [`consumer`] accumulates the chunked body into a placeholder
//! message while [`stats`] derives live throughput, and [`bridge`] persists
//! the settled reply. [`session`] ties the client pieces into one send flow.

pub mod bridge;
pub mod client;
pub mod consumer;
pub mod error;
pub mod llm;
pub mod session;
pub mod stats;
pub mod text;

pub use bridge::{HistoryStore, PersistenceBridge};
pub use client::ApiClient;
pub use consumer::{ByteStream, ChatTransport, StreamConsumer, StreamObserver, StreamState};
pub use error::{ClientError, ConsumerError, LlmError, StreamError};
pub use llm::{ChatModel, FragmentStream, LlmConfig};
pub use session::{ChatSession, SendError};
