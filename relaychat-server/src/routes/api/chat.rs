//! `POST /api/chat`: the streaming relay.
//!
//! The body is validated by hand so every malformed request gets a 400 with
//! a JSON error before the model is called. After that, each fragment the
//! model yields is written to the response as soon as it arrives, raw and
//! unframed. A model error mid-stream aborts the connection instead of
//! closing it cleanly, so a client can never mistake a partial reply for a
//! complete one.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use futures::StreamExt;
use relaychat_types::{ChatTurn, Role};
use serde_json::Value;
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::api::chat::{ChatRequest, ChatTurnSchema};
use crate::state::AppState;

pub const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";

#[derive(OpenApi)]
#[openapi(paths(relay_chat), components(schemas(ChatRequest, ChatTurnSchema)))]
pub struct ChatApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/chat", post(relay_chat))
}

#[utoipa::path(
    post,
    path = "/api/chat",
    tag = "chat",
    security(("bearer" = [])),
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Reply text, streamed in chunks as the model produces it", content_type = "text/plain", body = String),
        (status = 400, description = "Malformed message list"),
        (status = 401, description = "Missing or unknown token"),
        (status = 500, description = "The model could not be reached"),
    )
)]
pub async fn relay_chat(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ServerError> {
    let history = parse_history(&body)?;
    let turns = history.len();

    let fragments = state.llm.stream_chat(&history).await?;
    info!(turns, "relay stream opened");

    let body = Body::from_stream(fragments.map(|fragment| {
        fragment.map(Bytes::from).inspect_err(|e| {
            warn!(error = %e, "model failed mid-stream; aborting response");
        })
    }));
    Ok(([(CONTENT_TYPE, TEXT_PLAIN_UTF8)], body).into_response())
}

/// Parse and validate a relay body into the model history.
pub fn parse_history(body: &[u8]) -> Result<Vec<ChatTurn>, ServerError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| ServerError::BadRequest("request body is not valid JSON".into()))?;
    let entries = match value.get("messages") {
        None => return Err(ServerError::BadRequest("messages is required".into())),
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(ServerError::BadRequest("messages must be an array".into())),
    };
    if entries.is_empty() {
        return Err(ServerError::BadRequest("messages must not be empty".into()));
    }

    let history = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let turn: ChatTurn = serde_json::from_value(entry.clone()).map_err(|_| {
                ServerError::BadRequest(format!(
                    "messages[{i}] must be {{role, content}} with role user or assistant"
                ))
            })?;
            if turn.role == Role::System {
                return Err(ServerError::BadRequest(format!(
                    "messages[{i}]: role `system` is not supported"
                )));
            }
            Ok(turn)
        })
        .collect::<Result<Vec<_>, _>>()?;

    if history.last().is_some_and(|t| t.role != Role::User) {
        return Err(ServerError::BadRequest(
            "the last message must be from the user".into(),
        ));
    }
    Ok(history)
}
