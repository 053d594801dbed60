//! Liveness of the relay and its history database.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::warn;
use utoipa::{OpenApi, ToSchema};

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_health), components(schemas(HealthResponse)))]
pub struct HealthApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the database does not answer.
    pub status: String,
    pub version: String,
    /// Upstream model the relay streams from.
    pub model: String,
    pub database: String,
}

/// 200 when the history database answers, 503 otherwise. The upstream model
/// is not called.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Relay and database are up", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn get_health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let (status, database) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            warn!(error = %e, "health check: database unreachable");
            (StatusCode::SERVICE_UNAVAILABLE, "unreachable")
        }
    };
    let body = HealthResponse {
        status: if status.is_success() { "ok" } else { "degraded" }.to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        model: state.config.model.clone(),
        database: database.to_owned(),
    };
    (status, Json(body))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    use async_trait::async_trait;
    use relaychat_core::{ChatModel, FragmentStream, LlmError};
    use relaychat_types::ChatTurn;

    use crate::config::Config;
    use crate::entities::SqliteStore;

    struct UnusedModel;

    #[async_trait]
    impl ChatModel for UnusedModel {
        async fn stream_chat(&self, _: &[ChatTurn]) -> Result<FragmentStream, LlmError> {
            panic!("health must not call the model");
        }
    }

    async fn state() -> Arc<AppState> {
        let config = Config::from_lookup(|key| match key {
            "GEMINI_API_KEY" => Some("test".to_owned()),
            "RELAYCHAT_MODEL" => Some("gemini-test".to_owned()),
            _ => None,
        })
        .unwrap();
        Arc::new(AppState {
            config: Arc::new(config),
            store: Arc::new(SqliteStore::in_memory().await.unwrap()),
            llm: Arc::new(UnusedModel),
        })
    }

    #[tokio::test]
    async fn reports_model_and_database() {
        let (status, Json(body)) = get_health(State(state().await)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert_eq!(body.database, "ok");
        assert_eq!(body.model, "gemini-test");
        assert!(!body.version.is_empty());
    }

    #[tokio::test]
    async fn closed_database_is_degraded() {
        let state = state().await;
        state.store.close().await;
        let (status, Json(body)) = get_health(State(state)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "degraded");
        assert_eq!(body.database, "unreachable");
    }
}
