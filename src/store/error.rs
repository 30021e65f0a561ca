use thiserror::Error;
use uuid::Uuid;

use crate::record::TransitionError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordStatus;

    #[test]
    fn not_found_display() {
        let id = Uuid::nil();
        assert_eq!(
            StoreError::NotFound(id).to_string(),
            "record not found: 00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn transition_error_is_transparent() {
        let err: StoreError = TransitionError {
            id: Uuid::nil(),
            from: RecordStatus::Completed,
            to: RecordStatus::Processing,
        }
        .into();
        assert!(err.to_string().ends_with("illegal transition completed -> processing"));
    }
}
