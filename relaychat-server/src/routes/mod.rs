//! Axum router construction.
//!
//! [`build`] assembles the complete application router:
//! - Middleware layers (CORS, per-request trace-ID injection)
//! - Optional Swagger UI / OpenAPI document endpoint (disable with `RELAYCHAT_ENABLE_SWAGGER=false`)
//! - Health / heartbeat route
//! - Sign-up / sign-in (public)
//! - Relay, conversations and the rest of `/api` behind bearer auth

mod api;
pub mod doc;
mod health;

use std::sync::Arc;

use axum::{Router, middleware};
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{auth, cors, trace};
use crate::state::AppState;

// ── Router builder ────────────────────────────────────────────────────────────

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let protected = api::protected_router().route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::require_user,
    ));

    let mut app = Router::new()
        .merge(health::router())
        .merge(api::public_router())
        .merge(protected);

    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs()));
    }

    app
        // Outermost layers execute first on the way in.
        .layer(cors::cors_layer(&state.config))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::body::{Body, Bytes};
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use axum::http::{Method, Request, StatusCode};
    use futures::StreamExt;
    use http_body_util::BodyExt;
    use relaychat_core::{ChatModel, FragmentStream, LlmError};
    use relaychat_types::{ChatTurn, Role};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use tracing_test::traced_test;

    use crate::config::Config;
    use crate::entities::SqliteStore;
    use crate::middleware::trace::X_TRACE_ID;

    /// Replays a fixed fragment script. `Err` entries fail the stream there.
    #[derive(Default)]
    struct ScriptedModel {
        script: Vec<Result<&'static str, &'static str>>,
        fail_open: bool,
        calls: AtomicUsize,
        seen: Mutex<Vec<Vec<ChatTurn>>>,
    }

    impl ScriptedModel {
        fn replying(script: Vec<Result<&'static str, &'static str>>) -> Self {
            Self {
                script,
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn stream_chat(&self, history: &[ChatTurn]) -> Result<FragmentStream, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(history.to_vec());
            if self.fail_open {
                return Err(LlmError::Status {
                    status: 503,
                    message: "model overloaded".into(),
                });
            }
            let items: Vec<Result<String, LlmError>> = self
                .script
                .iter()
                .map(|item| match item {
                    Ok(text) => Ok((*text).to_owned()),
                    Err(message) => Err(LlmError::Api((*message).to_owned())),
                })
                .collect();
            Ok(futures::stream::iter(items).boxed())
        }
    }

    async fn app_with(model: Arc<ScriptedModel>) -> Router {
        let config = Config::from_lookup(|key| (key == "GEMINI_API_KEY").then(|| "test".to_owned()))
            .unwrap();
        let state = Arc::new(AppState {
            config: Arc::new(config),
            store: Arc::new(SqliteStore::in_memory().await.unwrap()),
            llm: model,
        });
        build(state)
    }

    fn request(method: Method, uri: &str, token: Option<&str>, body: impl Into<Body>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(body.into()).unwrap()
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::String(
                String::from_utf8_lossy(&bytes).into_owned(),
            ))
        };
        (status, body)
    }

    async fn sign_up(app: &Router, email: &str) -> String {
        let (status, body) = call(
            app,
            request(
                Method::POST,
                "/api/auth/signup",
                None,
                json!({ "email": email, "password": "secret1" }).to_string(),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().unwrap().to_owned()
    }

    fn chat_body(messages: Value) -> String {
        json!({ "messages": messages }).to_string()
    }

    // ── Relay ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn relay_body_is_exact_concatenation_of_fragments() {
        let model = Arc::new(ScriptedModel::replying(vec![Ok("Hel"), Ok("lo "), Ok("there")]));
        let app = app_with(model.clone()).await;
        let token = sign_up(&app, "a@example.com").await;

        let resp = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/chat",
                Some(&token),
                chat_body(json!([
                    { "role": "user", "content": "Hi" },
                    { "role": "assistant", "content": "Hey" },
                    { "role": "user", "content": "How are you?" },
                ])),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
        assert!(resp.headers().contains_key(X_TRACE_ID));
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(b"Hello there"));

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].len(), 3);
        assert_eq!(seen[0][1], ChatTurn::new(Role::Assistant, "Hey"));
    }

    #[tokio::test]
    async fn malformed_relay_bodies_never_reach_the_model() {
        let model = Arc::new(ScriptedModel::replying(vec![Ok("x")]));
        let app = app_with(model.clone()).await;
        let token = sign_up(&app, "a@example.com").await;

        for body in [
            "not json".to_owned(),
            "{}".to_owned(),
            chat_body(json!("hi")),
            chat_body(json!([])),
            chat_body(json!([{ "role": "system", "content": "x" }, { "role": "user", "content": "y" }])),
        ] {
            let (status, json) = call(&app, request(Method::POST, "/api/chat", Some(&token), body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(json["error"].is_string());
        }
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn model_failure_before_streaming_is_a_500() {
        let model = Arc::new(ScriptedModel {
            fail_open: true,
            ..ScriptedModel::default()
        });
        let app = app_with(model.clone()).await;
        let token = sign_up(&app, "a@example.com").await;

        let (status, body) = call(
            &app,
            request(
                Method::POST,
                "/api/chat",
                Some(&token),
                chat_body(json!([{ "role": "user", "content": "Hi" }])),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body["error"].as_str().unwrap().contains("overloaded"));
        assert!(logs_contain("upstream model error"));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn model_failure_mid_stream_aborts_the_body() {
        let model = Arc::new(ScriptedModel::replying(vec![Ok("Par"), Ok("tial"), Err("boom")]));
        let app = app_with(model).await;
        let token = sign_up(&app, "a@example.com").await;

        let resp = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/chat",
                Some(&token),
                chat_body(json!([{ "role": "user", "content": "Hi" }])),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let mut body = resp.into_body();
        let mut received = Vec::new();
        let mut aborted = false;
        while let Some(frame) = body.frame().await {
            match frame {
                Ok(frame) => {
                    if let Ok(data) = frame.into_data() {
                        received.extend_from_slice(&data);
                    }
                }
                Err(_) => {
                    aborted = true;
                    break;
                }
            }
        }
        assert!(aborted);
        assert_eq!(received, b"Partial");
    }

    #[tokio::test]
    async fn relay_requires_a_token() {
        let model = Arc::new(ScriptedModel::replying(vec![Ok("x")]));
        let app = app_with(model.clone()).await;
        let body = chat_body(json!([{ "role": "user", "content": "Hi" }]));

        let (status, _) = call(&app, request(Method::POST, "/api/chat", None, body.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&app, request(Method::POST, "/api/chat", Some("nope"), body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(model.calls(), 0);
    }

    // ── Auth ──────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn auth_lifecycle() {
        let app = app_with(Arc::default()).await;
        let creds = |email: &str, password: &str| {
            json!({ "email": email, "password": password }).to_string()
        };

        let (status, _) = call(
            &app,
            request(Method::POST, "/api/auth/signup", None, creds("a@example.com", "12345")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let token = sign_up(&app, "a@example.com").await;
        let (status, _) = call(
            &app,
            request(Method::POST, "/api/auth/signup", None, creds("A@example.com", "secret1")),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(
            &app,
            request(Method::POST, "/api/auth/signin", None, creds("a@example.com", "wrong!!")),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(
            &app,
            request(Method::POST, "/api/auth/signin", None, creds("a@example.com", "secret1")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(body["token"], token);

        let (status, user) = call(&app, request(Method::GET, "/api/auth/user", Some(&token), ())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["email"], "a@example.com");

        let (status, _) = call(&app, request(Method::POST, "/api/auth/signout", Some(&token), ())).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, request(Method::GET, "/api/auth/user", Some(&token), ())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unreadable_json_bodies_get_the_error_envelope() {
        let app = app_with(Arc::default()).await;
        let token = sign_up(&app, "a@example.com").await;

        for (uri, bearer, body) in [
            ("/api/auth/signup", None, "{not json"),
            ("/api/auth/signin", None, r#"{"email": 5}"#),
            ("/api/conversations", Some(token.as_str()), r#"{"title": 7}"#),
            ("/api/conversations/c1/messages", Some(token.as_str()), ""),
        ] {
            let (status, json) = call(&app, request(Method::POST, uri, bearer, body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(json["error"].as_str().is_some_and(|m| !m.is_empty()), "{uri}: {json}");
        }
    }

    // ── Conversations ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn conversations_are_private_and_ordered() {
        let app = app_with(Arc::default()).await;
        let alice = sign_up(&app, "alice@example.com").await;
        let bob = sign_up(&app, "bob@example.com").await;

        let (status, _) = call(
            &app,
            request(Method::POST, "/api/conversations", Some(&alice), json!({ "title": "  " }).to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut ids = Vec::new();
        for title in ["first", "second"] {
            let (status, conv) = call(
                &app,
                request(Method::POST, "/api/conversations", Some(&alice), json!({ "title": title }).to_string()),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(conv["title"], title);
            ids.push(conv["id"].as_str().unwrap().to_owned());
        }

        let messages_uri = format!("/api/conversations/{}/messages", ids[0]);
        for (role, content) in [("user", "Hi"), ("assistant", "Hello there")] {
            let (status, msg) = call(
                &app,
                request(
                    Method::POST,
                    &messages_uri,
                    Some(&alice),
                    json!({ "role": role, "content": content }).to_string(),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(msg["role"], role);
        }
        let (status, _) = call(
            &app,
            request(
                Method::POST,
                &messages_uri,
                Some(&alice),
                json!({ "role": "robot", "content": "x" }).to_string(),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, messages) = call(&app, request(Method::GET, &messages_uri, Some(&alice), ())).await;
        let contents: Vec<&str> = messages
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["content"].as_str().unwrap())
            .collect();
        assert_eq!(contents, vec!["Hi", "Hello there"]);

        let (_, list) = call(&app, request(Method::GET, "/api/conversations", Some(&alice), ())).await;
        assert_eq!(list[0]["title"], "second");

        let touch_uri = format!("/api/conversations/{}/touch", ids[0]);
        let (status, _) = call(&app, request(Method::POST, &touch_uri, Some(&alice), ())).await;
        assert_eq!(status, StatusCode::OK);
        let (_, list) = call(&app, request(Method::GET, "/api/conversations", Some(&alice), ())).await;
        assert_eq!(list[0]["title"], "first");

        // Someone else's conversation does not exist for bob.
        let (status, _) = call(&app, request(Method::GET, &messages_uri, Some(&bob), ())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, request(Method::POST, &touch_uri, Some(&bob), ())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, list) = call(&app, request(Method::GET, "/api/conversations", Some(&bob), ())).await;
        assert_eq!(list, json!([]));
    }

    #[tokio::test]
    async fn health_and_docs_are_public() {
        let app = app_with(Arc::default()).await;
        let (status, body) = call(&app, request(Method::GET, "/health", None, ())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], "ok");

        let (status, doc) = call(&app, request(Method::GET, "/api-docs/openapi.json", None, ())).await;
        assert_eq!(status, StatusCode::OK);
        assert!(doc["paths"]["/api/chat"].is_object());
    }
}
