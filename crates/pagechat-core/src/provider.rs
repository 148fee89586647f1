//! OpenAI-compatible chat completions client.
//!
//! Sends one system + user message pair with `stream: true` and hands the
//! response body to [`DeltaStream`].

use anyhow::{Context, Result};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::stream::{BoxDeltaStream, DeltaStream, StreamError, StreamResult};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// Chat completions configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ChatConfig {
    /// Builds the request configuration from the loaded config.
    ///
    /// Authentication resolution order:
    /// 1. `[provider] api_key` (from config file)
    /// 2. `OPENAI_API_KEY` environment variable
    ///
    /// Base URL resolution order:
    /// 1. `OPENAI_BASE_URL` environment variable
    /// 2. `[provider] base_url`
    /// 3. `https://api.openai.com/v1`
    pub fn from_config(config: &Config, model: Option<&str>) -> Result<Self> {
        let api_key = resolve_api_key(config.provider.effective_api_key())?;
        let base_url = resolve_base_url(config.provider.effective_base_url())?;

        Ok(Self {
            api_key,
            base_url,
            model: model.unwrap_or(config.model.as_str()).to_string(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Chat completions client.
pub struct ChatClient {
    config: ChatConfig,
    http: reqwest::Client,
}

impl ChatClient {
    pub fn new(config: ChatConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Opens a streaming completion for `question` about the page described
    /// by `system`.
    pub async fn send_chat_stream(
        &self,
        system: &str,
        question: &str,
    ) -> StreamResult<BoxDeltaStream> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                RequestMessage {
                    role: Role::System,
                    content: system,
                },
                RequestMessage {
                    role: Role::User,
                    content: question,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: true,
        };

        let url = format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            CHAT_COMPLETIONS_PATH
        );
        debug!(%url, model = %self.config.model, "sending chat completions request");

        let response = self
            .http
            .post(&url)
            .headers(build_headers(&self.config.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let err = StreamError::http_status(status.as_u16(), &error_body);
            warn!(status = status.as_u16(), error = %err, "chat completions request rejected");
            return Err(err);
        }

        Ok(DeltaStream::new(Box::pin(response.bytes_stream())).boxed())
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<RequestMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: Role,
    content: &'a str,
}

fn build_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "Authorization",
        HeaderValue::from_str(&format!("Bearer {api_key}"))
            .unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    headers.insert("accept", HeaderValue::from_static("text/event-stream"));
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    headers
}

fn classify_reqwest_error(e: &reqwest::Error) -> StreamError {
    if e.is_timeout() {
        StreamError::timeout(format!("Request timed out: {e}"))
    } else if e.is_connect() {
        StreamError::transport(format!("Connection failed: {e}"))
    } else if e.is_request() {
        StreamError::transport(format!("Request error: {e}"))
    } else {
        StreamError::transport(format!("Network error: {e}"))
    }
}

fn resolve_base_url(config_base_url: Option<&str>) -> Result<String> {
    let env_url = std::env::var("OPENAI_BASE_URL").ok();
    pick_base_url(env_url.as_deref(), config_base_url)
}

/// Env beats config beats the default; whichever wins must parse as a URL.
fn pick_base_url(env_url: Option<&str>, config_base_url: Option<&str>) -> Result<String> {
    for candidate in [env_url, config_base_url].into_iter().flatten() {
        let trimmed = candidate.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed)?;
            return Ok(trimmed.to_string());
        }
    }

    Ok(DEFAULT_BASE_URL.to_string())
}

fn validate_url(url: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid OpenAI base URL: {url}"))?;
    Ok(())
}

/// Resolves API key with precedence: config > env.
fn resolve_api_key(config_api_key: Option<&str>) -> Result<String> {
    let env_key = std::env::var("OPENAI_API_KEY").ok();
    pick_api_key(config_api_key, env_key.as_deref())
}

fn pick_api_key(config_api_key: Option<&str>, env_key: Option<&str>) -> Result<String> {
    [config_api_key, env_key]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|key| !key.is_empty())
        .map(str::to_string)
        .context("Please enter your OpenAI API key. Set OPENAI_API_KEY or api_key in [provider].")
}
