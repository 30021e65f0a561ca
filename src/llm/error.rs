//! Errors raised while talking to the classification service.

use thiserror::Error;

use crate::retry::{is_retryable_status, mentions_timeout};

#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP 429. `retry_after_ms` comes from the `retry-after` header when present.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Any other non-success status, with the response body as the message.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl LlmError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status, message } => {
                is_retryable_status(*status) || mentions_timeout(message)
            }
            LlmError::NetworkError(err) => {
                err.is_timeout() || err.is_connect() || err.is_request() || mentions_timeout(&err.to_string())
            }
        }
    }
}
