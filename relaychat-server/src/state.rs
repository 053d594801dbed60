//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use relaychat_core::ChatModel;

use crate::config::Config;
use crate::entities::SqliteStore;

/// State shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Users, sessions, conversations and messages.
    pub store: Arc<SqliteStore>,
    /// Upstream model used by the relay endpoint.
    pub llm: Arc<dyn ChatModel>,
}
