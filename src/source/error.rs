use thiserror::Error;

use crate::retry::{is_retryable_status, mentions_timeout};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("source returned status {status}")]
    Status { status: u16 },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status } => is_retryable_status(*status),
            FetchError::Network(err) => {
                !err.is_decode() && (err.is_timeout() || err.is_connect() || err.is_request() || mentions_timeout(&err.to_string()))
            }
        }
    }
}
