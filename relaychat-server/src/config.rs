//! Server configuration, loaded from environment variables at startup.

use std::fmt;

use relaychat_core::llm::{
    DEFAULT_BASE_URL, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE,
};
use relaychat_core::LlmConfig;
use thiserror::Error;

/// Startup failures. The process exits on any of these.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,
}

/// Runtime configuration for relaychat-server.
///
/// Everything except the provider key has a default.
#[derive(Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// sqlx SQLite URL (default: `"sqlite://relaychat.db"`).
    pub database_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// When set, also write a daily rolling log file into this directory.
    pub log_dir: Option<String>,

    /// Comma-separated CORS origins; wildcard when unset.
    pub cors_allowed_origins: Option<String>,

    pub enable_swagger: bool,

    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Config {
    /// Build [`Config`] from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let gemini_api_key = lookup("GEMINI_API_KEY")
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        Ok(Self {
            bind_address: env_or(&lookup, "RELAYCHAT_BIND", "0.0.0.0:3000"),
            database_url: env_or(&lookup, "RELAYCHAT_DATABASE_URL", "sqlite://relaychat.db"),
            log_level: env_or(&lookup, "RELAYCHAT_LOG", "info"),
            log_json: flag(&lookup, "RELAYCHAT_LOG_JSON", false),
            log_dir: lookup("RELAYCHAT_LOG_DIR").filter(|v| !v.trim().is_empty()),
            cors_allowed_origins: lookup("RELAYCHAT_CORS_ORIGINS"),
            enable_swagger: flag(&lookup, "RELAYCHAT_ENABLE_SWAGGER", true),
            gemini_api_key,
            gemini_base_url: env_or(&lookup, "RELAYCHAT_GEMINI_BASE_URL", DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_owned(),
            model: env_or(&lookup, "RELAYCHAT_MODEL", DEFAULT_MODEL),
            temperature: parse_env(&lookup, "RELAYCHAT_TEMPERATURE", DEFAULT_TEMPERATURE),
            max_output_tokens: parse_env(
                &lookup,
                "RELAYCHAT_MAX_OUTPUT_TOKENS",
                DEFAULT_MAX_OUTPUT_TOKENS,
            ),
        })
    }

    /// Model parameters handed to the upstream adapter.
    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            api_key: self.gemini_api_key.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            base_url: self.gemini_base_url.clone(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("database_url", &self.database_url)
            .field("log_level", &self.log_level)
            .field("log_json", &self.log_json)
            .field("log_dir", &self.log_dir)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("enable_swagger", &self.enable_swagger)
            .field("gemini_api_key", &"<redacted>")
            .field("gemini_base_url", &self.gemini_base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_owned())
}

fn parse_env<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn flag<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
