//! HTTP client for the relaychat server API.

use futures::StreamExt;
use relaychat_types::{
    AuthSession, ChatTurn, Conversation, Credentials, ErrorBody, Message, RelayRequest, Role, User,
};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::bridge::HistoryStore;
use crate::consumer::{ByteStream, ChatTransport};
use crate::error::ClientError;

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// `base_url` is the server origin, e.g. `http://127.0.0.1:3000`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    // ── Auth ──────────────────────────────────────────────────────────────────

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, ClientError> {
        let creds = Credentials {
            email: email.to_owned(),
            password: password.to_owned(),
        };
        decode(self.request(Method::POST, "/api/auth/signup").json(&creds).send().await?).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, ClientError> {
        let creds = Credentials {
            email: email.to_owned(),
            password: password.to_owned(),
        };
        decode(self.request(Method::POST, "/api/auth/signin").json(&creds).send().await?).await
    }

    pub async fn sign_out(&self) -> Result<(), ClientError> {
        let resp = self.request(Method::POST, "/api/auth/signout").send().await?;
        check(resp).await.map(|_| ())
    }

    pub async fn current_user(&self) -> Result<User, ClientError> {
        decode(self.request(Method::GET, "/api/auth/user").send().await?).await
    }
}

// ── Conversations ─────────────────────────────────────────────────────────────

impl HistoryStore for ApiClient {
    async fn create_conversation(&self, title: &str) -> Result<Conversation, ClientError> {
        let resp = self
            .request(Method::POST, "/api/conversations")
            .json(&json!({ "title": title }))
            .send()
            .await?;
        decode(resp).await
    }

    async fn save_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Message, ClientError> {
        let resp = self
            .request(
                Method::POST,
                &format!("/api/conversations/{conversation_id}/messages"),
            )
            .json(&json!({ "role": role, "content": content }))
            .send()
            .await?;
        decode(resp).await
    }

    async fn touch_conversation(&self, conversation_id: &str) -> Result<Conversation, ClientError> {
        let resp = self
            .request(
                Method::POST,
                &format!("/api/conversations/{conversation_id}/touch"),
            )
            .send()
            .await?;
        decode(resp).await
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        decode(self.request(Method::GET, "/api/conversations").send().await?).await
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, ClientError> {
        let resp = self
            .request(
                Method::GET,
                &format!("/api/conversations/{conversation_id}/messages"),
            )
            .send()
            .await?;
        decode(resp).await
    }
}

// ── Relay ─────────────────────────────────────────────────────────────────────

impl ChatTransport for ApiClient {
    async fn open(&self, history: &[ChatTurn]) -> Result<ByteStream, ClientError> {
        let body = RelayRequest {
            messages: history.to_vec(),
        };
        let resp = self
            .request(Method::POST, "/api/chat")
            .json(&body)
            .send()
            .await?;
        let resp = check(resp).await?;
        debug!(status = resp.status().as_u16(), "relay stream opened");
        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(ClientError::from))
            .boxed())
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

async fn check(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let raw = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&raw)
        .map(|b| b.error)
        .unwrap_or(raw);
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    Ok(check(resp).await?.json::<T>().await?)
}
