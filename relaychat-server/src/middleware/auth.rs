use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use crate::entities::{UserRecord, UserStore};
use crate::error::ServerError;
use crate::state::AppState;

/// The authenticated caller, inserted as a request extension by
/// [`require_user`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: UserRecord,
    pub token: String,
}

/// Reject requests without a live bearer token with 401.
pub async fn require_user(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| ServerError::Unauthorized("missing bearer token".into()))?;

    let user = state
        .store
        .find_user_by_token(&token)
        .await?
        .ok_or_else(|| ServerError::Unauthorized("invalid or expired token".into()))?;

    debug!(user_id = %user.id, "request authenticated");
    req.extensions_mut().insert(CurrentUser { user, token });
    Ok(next.run(req).await)
}
