//! Claude API client for copy generation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use tracing::instrument;

use crate::config::ClaudeConfig;

use super::TextGenerator;
use super::error::{ClaudeError, ErrorBody};
use super::types::{ChatRequest, ChatResponse, Message};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Claude API client.
#[derive(Clone)]
pub struct ClaudeClient {
    inner: Arc<ClaudeClientInner>,
}

struct ClaudeClientInner {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl ClaudeClient {
    /// Create a new Claude client.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key contains invalid header characters
    /// or the HTTP client cannot be built.
    pub fn new(config: &ClaudeConfig) -> Result<Self, ClaudeError> {
        Self::with_base_url(config, ANTHROPIC_API_URL)
    }

    /// Create a client that talks to `base_url` instead of the Anthropic API.
    ///
    /// # Errors
    ///
    /// Same as [`ClaudeClient::new`].
    pub fn with_base_url(config: &ClaudeConfig, base_url: &str) -> Result<Self, ClaudeError> {
        let api_key = config.api_key.expose_secret();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut key_header =
            HeaderValue::from_str(api_key).map_err(|e| ClaudeError::Credentials(e.to_string()))?;
        key_header.set_sensitive(true);
        headers.insert("x-api-key", key_header);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(ClaudeClientInner {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
                model: config.model.clone(),
            }),
        })
    }

    /// Send a single-turn request and get the complete response.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails or returns an error response.
    #[instrument(skip(self, messages, system), fields(model = %self.inner.model))]
    pub async fn chat(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
    ) -> Result<ChatResponse, ClaudeError> {
        let request = ChatRequest {
            model: self.inner.model.clone(),
            max_tokens: DEFAULT_MAX_TOKENS,
            messages,
            system,
        };

        let response = self
            .inner
            .client
            .post(format!("{}/v1/messages", self.inner.base_url))
            .json(&request)
            .send()
            .await?;

        handle_response(response).await
    }
}

#[async_trait]
impl TextGenerator for ClaudeClient {
    async fn generate(&self, prompt: &str) -> Result<String, ClaudeError> {
        let response = self.chat(vec![Message::user(prompt)], None).await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(ClaudeError::NoText {
                stop_reason: response.stop_reason,
            });
        }
        Ok(text)
    }
}

/// Handle a response, successful or not.
async fn handle_response(response: reqwest::Response) -> Result<ChatResponse, ClaudeError> {
    let status = response.status();

    if status.is_success() {
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| ClaudeError::UnreadableReply(e.to_string()))
    } else {
        Err(handle_error_status(status, response).await)
    }
}

/// Handle an error status code.
async fn handle_error_status(status: reqwest::StatusCode, response: reqwest::Response) -> ClaudeError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        return ClaudeError::RateLimited {
            retry_after: Duration::from_secs(retry_after),
        };
    }

    if matches!(
        status,
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN
    ) {
        return ClaudeError::Credentials(format!("API key refused with HTTP {}", status.as_u16()));
    }

    match response.text().await {
        Ok(body) => {
            let (kind, message) = match serde_json::from_str::<ErrorBody>(&body) {
                Ok(parsed) => (parsed.error.kind, parsed.error.message),
                Err(_) => ("unknown".to_string(), body),
            };
            ClaudeError::Refused {
                status: status.as_u16(),
                kind,
                message,
            }
        }
        Err(e) => ClaudeError::Request(e),
    }
}
