use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::error::LlmError;
use super::types::{ChatRequest, ChatResponse};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Anything that can answer a chat completion request.
pub trait CompletionSender {
    async fn send_chat(&self, req: &ChatRequest) -> Result<ChatResponse, LlmError>;
}

pub struct ChatClient {
    api_key: String,
    client: Client,
    base_url: String,
}

impl ChatClient {
    /// Create a client for `base_url`, e.g. `https://api.openai.com/v1`.
    pub fn new(api_key: String, base_url: &str) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            api_key,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl CompletionSender for ChatClient {
    async fn send_chat(&self, req: &ChatRequest) -> Result<ChatResponse, LlmError> {
        debug!(model = %req.model, messages = req.messages.len(), "sending chat completion");
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(LlmError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        // A reply without content is returned as-is; callers decide what an
        // empty completion means.
        Ok(response.json::<ChatResponse>().await?)
    }
}
