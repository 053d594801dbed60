pub mod auth;
pub mod chat;
pub mod conversations;

use std::sync::Arc;

use axum::Router;
use utoipa::OpenApi;

use crate::state::AppState;

/// Routes reachable without a bearer token.
pub fn public_router() -> Router<Arc<AppState>> {
    auth::public_router()
}

/// Routes that require [`crate::middleware::auth::require_user`].
pub fn protected_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(auth::protected_router())
        .merge(chat::router())
        .merge(conversations::router())
}

pub fn api_docs() -> utoipa::openapi::OpenApi {
    let mut spec = auth::AuthApi::openapi();
    spec.merge(chat::ChatApi::openapi());
    spec.merge(conversations::ConversationsApi::openapi());
    spec
}
