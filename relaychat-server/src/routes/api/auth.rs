use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;
use utoipa::OpenApi;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{UserRecord, UserStore, is_unique_violation};
use crate::error::{ApiJson, ServerError};
use crate::middleware::CurrentUser;
use crate::schemas::api::auth::{AuthSessionResponse, CredentialsRequest, UserResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(sign_up, sign_in, sign_out, current_user),
    components(schemas(CredentialsRequest, AuthSessionResponse, UserResponse))
)]
pub struct AuthApi;

pub fn public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/signup", post(sign_up))
        .route("/api/auth/signin", post(sign_in))
}

pub fn protected_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/signout", post(sign_out))
        .route("/api/auth/user", get(current_user))
}

// ── Handlers ──────────────────────────────────────────────────────────────────

#[utoipa::path(
    post,
    path = "/api/auth/signup",
    tag = "auth",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Account created and signed in", body = AuthSessionResponse),
        (status = 400, description = "Invalid email or password too short"),
        (status = 409, description = "Email already registered"),
    )
)]
pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CredentialsRequest>,
) -> Result<Json<AuthSessionResponse>, ServerError> {
    req.validate()?;
    let user = UserRecord::new(&normalize_email(&req.email), &req.password)?;
    match state.store.create_user(user.clone()).await {
        Ok(()) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(ServerError::Conflict("email already registered".into()));
        }
        Err(e) => return Err(e.into()),
    }
    info!(user_id = %user.id, "user signed up");
    issue_session(&state, &user).await
}

#[utoipa::path(
    post,
    path = "/api/auth/signin",
    tag = "auth",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthSessionResponse),
        (status = 401, description = "Wrong email or password"),
    )
)]
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CredentialsRequest>,
) -> Result<Json<AuthSessionResponse>, ServerError> {
    let user = state
        .store
        .find_user_by_email(&normalize_email(&req.email))
        .await?
        .filter(|u| u.verify_password(&req.password))
        .ok_or_else(|| ServerError::Unauthorized("invalid email or password".into()))?;
    info!(user_id = %user.id, "user signed in");
    issue_session(&state, &user).await
}

#[utoipa::path(
    post,
    path = "/api/auth/signout",
    tag = "auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Token revoked", body = Value),
        (status = 401, description = "Missing or unknown token"),
    )
)]
pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Value>, ServerError> {
    state.store.delete_auth_session(&current.token).await?;
    info!(user_id = %current.user.id, "user signed out");
    Ok(Json(json!({ "signed_out": true })))
}

#[utoipa::path(
    get,
    path = "/api/auth/user",
    tag = "auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "The signed-in user", body = UserResponse),
        (status = 401, description = "Missing or unknown token"),
    )
)]
pub async fn current_user(Extension(current): Extension<CurrentUser>) -> Json<UserResponse> {
    Json(current.user.to_response())
}

// ── private helpers ──────────────────────────────────────────────────────────

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn issue_session(
    state: &AppState,
    user: &UserRecord,
) -> Result<Json<AuthSessionResponse>, ServerError> {
    let token = Uuid::new_v4().to_string();
    state
        .store
        .create_auth_session(&token, &user.id, Utc::now())
        .await?;
    Ok(Json(AuthSessionResponse {
        token,
        user: user.to_response(),
    }))
}
