use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use relaychat_types::Role;
use tracing::info;
use utoipa::OpenApi;
use uuid::Uuid;

use crate::entities::{
    ConversationRecord, ConversationStore, MessageRecord, MessageStore, SqliteStore,
};
use crate::error::{ApiJson, ServerError};
use crate::middleware::CurrentUser;
use crate::schemas::api::conversation::{
    ConversationResponse, CreateConversationRequest, CreateMessageRequest, MessageResponse,
};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        list_conversations,
        create_conversation,
        list_messages,
        create_message,
        touch_conversation
    ),
    components(schemas(
        CreateConversationRequest,
        CreateMessageRequest,
        ConversationResponse,
        MessageResponse
    ))
)]
pub struct ConversationsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/api/conversations/{id}/messages",
            get(list_messages).post(create_message),
        )
        .route("/api/conversations/{id}/touch", post(touch_conversation))
}

// ── Conversation handlers ─────────────────────────────────────────────────────

#[utoipa::path(
    get,
    path = "/api/conversations",
    tag = "conversations",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Caller's conversations, latest activity first", body = Vec<ConversationResponse>),
        (status = 401, description = "Missing or unknown token"),
    )
)]
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<ConversationResponse>>, ServerError> {
    let conversations = state.store.list_conversations(&current.user.id).await?;
    Ok(Json(conversations.iter().map(ConversationRecord::to_response).collect()))
}

#[utoipa::path(
    post,
    path = "/api/conversations",
    tag = "conversations",
    security(("bearer" = [])),
    request_body = CreateConversationRequest,
    responses(
        (status = 200, description = "Conversation created", body = ConversationResponse),
        (status = 400, description = "Empty title"),
        (status = 401, description = "Missing or unknown token"),
    )
)]
pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(req): ApiJson<CreateConversationRequest>,
) -> Result<Json<ConversationResponse>, ServerError> {
    if req.title.trim().is_empty() {
        return Err(ServerError::BadRequest("title must not be empty".into()));
    }
    let now = Utc::now();
    let conversation = ConversationRecord {
        id: Uuid::new_v4().to_string(),
        user_id: current.user.id.clone(),
        title: req.title,
        created_at: now,
        updated_at: now,
    };
    state.store.create_conversation(conversation.clone()).await?;
    info!(conversation_id = %conversation.id, user_id = %current.user.id, "conversation created");
    Ok(Json(conversation.to_response()))
}

#[utoipa::path(
    post,
    path = "/api/conversations/{id}/touch",
    tag = "conversations",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "updated_at refreshed", body = ConversationResponse),
        (status = 404, description = "No such conversation"),
    )
)]
pub async fn touch_conversation(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<ConversationResponse>, ServerError> {
    let conversation = state
        .store
        .touch_conversation(&id, &current.user.id, Utc::now())
        .await?
        .ok_or_else(|| not_found(&id))?;
    Ok(Json(conversation.to_response()))
}

// ── Message handlers ──────────────────────────────────────────────────────────

#[utoipa::path(
    get,
    path = "/api/conversations/{id}/messages",
    tag = "conversations",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Messages, oldest first", body = Vec<MessageResponse>),
        (status = 404, description = "No such conversation"),
    )
)]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageResponse>>, ServerError> {
    owned_conversation(&state.store, &id, &current).await?;
    let messages = state.store.list_messages(&id).await?;
    Ok(Json(messages.iter().map(MessageRecord::to_response).collect()))
}

#[utoipa::path(
    post,
    path = "/api/conversations/{id}/messages",
    tag = "conversations",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Conversation id")),
    request_body = CreateMessageRequest,
    responses(
        (status = 200, description = "Message persisted", body = MessageResponse),
        (status = 400, description = "Unknown role"),
        (status = 404, description = "No such conversation"),
    )
)]
pub async fn create_message(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<CreateMessageRequest>,
) -> Result<Json<MessageResponse>, ServerError> {
    let role = Role::from_str(&req.role)
        .map_err(|_| ServerError::BadRequest(format!("unknown role `{}`", req.role)))?;
    owned_conversation(&state.store, &id, &current).await?;

    let message = MessageRecord {
        id: Uuid::new_v4().to_string(),
        conversation_id: id,
        role,
        content: req.content,
        created_at: Utc::now(),
    };
    state.store.insert_message(message.clone()).await?;
    Ok(Json(message.to_response()))
}

// ── private helpers ──────────────────────────────────────────────────────────

fn not_found(id: &str) -> ServerError {
    ServerError::NotFound(format!("conversation {id} not found"))
}

async fn owned_conversation(
    store: &SqliteStore,
    id: &str,
    current: &CurrentUser,
) -> Result<ConversationRecord, ServerError> {
    store
        .get_conversation(id, &current.user.id)
        .await?
        .ok_or_else(|| not_found(id))
}
