//! Google Gemini adapter (`streamGenerateContent` over SSE).
//!
//! Prior turns become the `contents` history, the last turn is appended as
//! the new user prompt. `user` maps to `user`, `assistant` to `model`.

use async_trait::async_trait;
use bytes::Bytes;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use relaychat_types::{ChatTurn, Role};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{split_history, ChatModel, FragmentStream, LlmConfig};
use crate::error::LlmError;

/// Finish reasons for which the candidate text is withheld.
const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "RECITATION", "LANGUAGE"];

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

impl ApiError {
    fn describe(&self) -> String {
        match &self.status {
            Some(status) => format!("{status}: {}", self.message),
            None => self.message.clone(),
        }
    }
}

fn provider_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        _ => "model",
    }
}

// ── Adapter ───────────────────────────────────────────────────────────────────

/// Streams replies from the Gemini `generateContent` API.
#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    http: reqwest::Client,
    config: LlmConfig,
}

impl GeminiAdapter {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self::with_client(http, config))
    }

    pub fn with_client(http: reqwest::Client, config: LlmConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn build_request<'a>(
        &self,
        history: &'a [ChatTurn],
    ) -> Result<GenerateContentRequest<'a>, LlmError> {
        let (prior, prompt) = split_history(history)?;
        let mut contents: Vec<Content<'a>> = prior
            .iter()
            .map(|turn| Content {
                role: provider_role(turn.role),
                parts: vec![Part { text: &turn.content }],
            })
            .collect();
        contents.push(Content {
            role: "user",
            parts: vec![Part {
                text: &prompt.content,
            }],
        });
        Ok(GenerateContentRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        })
    }
}

#[async_trait]
impl ChatModel for GeminiAdapter {
    async fn stream_chat(&self, history: &[ChatTurn]) -> Result<FragmentStream, LlmError> {
        let body = self.build_request(history)?;
        debug!(
            model = %self.config.model,
            turns = history.len(),
            "opening upstream stream"
        );

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = parse_error_body(&raw).unwrap_or(raw);
            warn!(status = status.as_u16(), %message, "upstream rejected request");
            return Err(LlmError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(fragments(response.bytes_stream().boxed()))
    }
}

/// Error responses arrive either as an object or as a one-element array.
fn parse_error_body(raw: &str) -> Option<String> {
    if let Ok(env) = serde_json::from_str::<ErrorEnvelope>(raw) {
        return Some(env.error.describe());
    }
    serde_json::from_str::<Vec<ErrorEnvelope>>(raw)
        .ok()
        .and_then(|v| v.into_iter().next())
        .map(|env| env.error.describe())
}

/// Text carried by one SSE event, or `None` when it carries nothing to show.
fn parse_event(data: &str) -> Result<Option<String>, LlmError> {
    let chunk: StreamChunk = serde_json::from_str(data)?;
    if let Some(err) = chunk.error {
        return Err(LlmError::Api(err.describe()));
    }
    if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(LlmError::Blocked(reason));
    }
    let Some(candidate) = chunk.candidates.into_iter().next() else {
        return Ok(None);
    };
    if let Some(reason) = candidate.finish_reason.as_deref() {
        if BLOCKING_FINISH_REASONS.contains(&reason) {
            return Err(LlmError::Blocked(reason.to_owned()));
        }
    }
    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
        .unwrap_or_default();
    Ok((!text.is_empty()).then_some(text))
}

type EventStream = BoxStream<'static, Result<Event, EventStreamError<reqwest::Error>>>;

/// Pull-based: the body is only polled when the consumer asks for the next
/// fragment, so a slow reader slows the upstream read. The first error ends
/// the stream.
fn fragments(body: BoxStream<'static, reqwest::Result<Bytes>>) -> FragmentStream {
    let events: EventStream = body.eventsource().boxed();
    stream::unfold((events, false), |(mut events, done)| async move {
        if done {
            return None;
        }
        loop {
            let failed = match events.next().await? {
                Ok(event) if event.data.trim().is_empty() => continue,
                Ok(event) => match parse_event(&event.data) {
                    Ok(Some(text)) => return Some((Ok(text), (events, false))),
                    Ok(None) => continue,
                    Err(e) => e,
                },
                Err(EventStreamError::Transport(e)) => LlmError::Http(e),
                Err(e) => LlmError::Event(e.to_string()),
            };
            return Some((Err(failed), (events, true)));
        }
    })
    .boxed()
}

// ── Tests ──────────────────────────────────────────────────────────────────────
