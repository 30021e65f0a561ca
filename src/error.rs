use thiserror::Error;

use crate::llm::LlmError;
use crate::source::FetchError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum PulseError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Classifier service error: {0}")]
    Llm(#[from] LlmError),

    #[error("Source error: {0}")]
    Fetch(#[from] FetchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_module_errors() {
        let err: PulseError = FetchError::Status { status: 503 }.into();
        assert_eq!(err.to_string(), "Source error: source returned status 503");

        let err: PulseError = LlmError::RateLimited { retry_after_ms: 1000 }.into();
        assert!(matches!(
            err,
            PulseError::Llm(LlmError::RateLimited { retry_after_ms: 1000 })
        ));
    }

    #[test]
    fn config_error_display() {
        let err = PulseError::Config("batch_size must be greater than zero".into());
        assert_eq!(
            err.to_string(),
            "Config error: batch_size must be greater than zero"
        );
    }
}
