use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::item::{Analysis, ItemRecord, RecordStatus};

/// A status change requested for a record. Each patch carries exactly the
/// fields its target status requires.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordPatch {
    /// Take the record into a classification batch.
    Claim,
    /// Store a successful classification.
    Complete {
        analysis: Analysis,
        analyzed_at: DateTime<Utc>,
    },
    /// Record a failure with its diagnostic.
    Fail { message: String },
}

impl RecordPatch {
    pub fn complete(analysis: Analysis) -> Self {
        RecordPatch::Complete {
            analysis,
            analyzed_at: Utc::now(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            "Update failed".to_string()
        } else {
            message
        };
        RecordPatch::Fail { message }
    }

    /// Status the record ends up in once the patch is applied.
    pub fn target(&self) -> RecordStatus {
        match self {
            RecordPatch::Claim => RecordStatus::Processing,
            RecordPatch::Complete { .. } => RecordStatus::Completed,
            RecordPatch::Fail { .. } => RecordStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("record {id}: illegal transition {from} -> {to}")]
pub struct TransitionError {
    pub id: Uuid,
    pub from: RecordStatus,
    pub to: RecordStatus,
}

impl RecordStatus {
    /// The transition table of the record lifecycle.
    pub fn can_transition_to(self, next: RecordStatus) -> bool {
        matches!(
            (self, next),
            (RecordStatus::Pending, RecordStatus::Processing)
                | (RecordStatus::Failed, RecordStatus::Processing)
                | (RecordStatus::Processing, RecordStatus::Completed)
                | (RecordStatus::Processing, RecordStatus::Failed)
        )
    }
}

impl ItemRecord {
    /// Validates `patch` against the current status without applying it.
    pub fn check(&self, patch: &RecordPatch) -> Result<(), TransitionError> {
        let to = patch.target();
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(TransitionError {
                id: self.id,
                from: self.status,
                to,
            })
        }
    }

    /// Applies `patch`, keeping the result fields consistent with the new status.
    pub fn apply(&mut self, patch: RecordPatch) -> Result<(), TransitionError> {
        self.check(&patch)?;
        match patch {
            RecordPatch::Claim => {
                self.status = RecordStatus::Processing;
                self.error_message = None;
            }
            RecordPatch::Complete {
                analysis,
                analyzed_at,
            } => {
                self.status = RecordStatus::Completed;
                self.sentiment = Some(analysis.sentiment);
                self.analysis = Some(analysis);
                self.analyzed_at = Some(analyzed_at);
                self.error_message = None;
            }
            RecordPatch::Fail { message } => {
                self.status = RecordStatus::Failed;
                self.sentiment = None;
                self.analysis = None;
                self.analyzed_at = None;
                self.error_message = Some(message);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{NewRecord, Sentiment};

    fn make_record() -> ItemRecord {
        ItemRecord::new(NewRecord {
            source: "r/aviation".into(),
            content: "Gotta love fast prop-planes".into(),
        })
    }

    fn positive() -> Analysis {
        Analysis {
            sentiment: Sentiment::Positive,
            summary: "Enthusiasm for fast propeller aircraft.".into(),
        }
    }

    #[test]
    fn happy_path_walks_the_lifecycle() {
        let mut record = make_record();

        record.apply(RecordPatch::Claim).unwrap();
        assert_eq!(record.status, RecordStatus::Processing);
        assert!(record.is_consistent());

        record.apply(RecordPatch::complete(positive())).unwrap();
        assert_eq!(record.status, RecordStatus::Completed);
        assert_eq!(record.sentiment, Some(Sentiment::Positive));
        assert!(record.analyzed_at.is_some());
        assert!(record.error_message.is_none());
        assert!(record.is_consistent());
    }

    #[test]
    fn failed_record_can_be_reclaimed_and_completed() {
        let mut record = make_record();
        record.apply(RecordPatch::Claim).unwrap();
        record.apply(RecordPatch::fail("upstream 503")).unwrap();
        assert_eq!(record.status, RecordStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some("upstream 503"));
        assert!(record.is_consistent());

        record.apply(RecordPatch::Claim).unwrap();
        assert_eq!(record.status, RecordStatus::Processing);
        assert!(record.error_message.is_none());

        record.apply(RecordPatch::complete(positive())).unwrap();
        assert!(record.error_message.is_none());
        assert!(record.is_consistent());
    }

    #[test]
    fn completion_requires_a_claim() {
        let mut record = make_record();
        let err = record.apply(RecordPatch::complete(positive())).unwrap_err();
        assert_eq!(err.from, RecordStatus::Pending);
        assert_eq!(err.to, RecordStatus::Completed);
        assert_eq!(record.status, RecordStatus::Pending);
    }

    #[test]
    fn processing_cannot_be_claimed_twice() {
        let mut record = make_record();
        record.apply(RecordPatch::Claim).unwrap();
        assert!(record.apply(RecordPatch::Claim).is_err());
    }

    #[test]
    fn completed_is_terminal() {
        let mut record = make_record();
        record.apply(RecordPatch::Claim).unwrap();
        record.apply(RecordPatch::complete(positive())).unwrap();
        assert!(record.check(&RecordPatch::Claim).is_err());
        assert!(record.check(&RecordPatch::fail("late")).is_err());
    }

    #[test]
    fn transition_table() {
        use RecordStatus::*;
        let allowed: Vec<(RecordStatus, RecordStatus)> = RecordStatus::ALL
            .iter()
            .flat_map(|from| RecordStatus::ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();
        assert_eq!(
            allowed,
            vec![
                (Pending, Processing),
                (Processing, Completed),
                (Processing, Failed),
                (Failed, Processing),
            ]
        );
    }

    #[test]
    fn empty_failure_message_gets_a_default() {
        assert_eq!(
            RecordPatch::fail("  "),
            RecordPatch::Fail {
                message: "Update failed".into()
            }
        );
    }

    #[test]
    fn transition_error_display() {
        let record = make_record();
        let err = record.check(&RecordPatch::fail("x")).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("record {}: illegal transition pending -> failed", record.id)
        );
    }
}
