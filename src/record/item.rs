use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Content at or below this many characters is never stored.
pub const MIN_CONTENT_CHARS: usize = 10;

/// Lifecycle status of an ingested item.
///
/// `Pending → Processing → Completed | Failed`, with `Failed → Processing`
/// reachable only through a retry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RecordStatus {
    #[cfg(test)]
    pub const ALL: [RecordStatus; 4] = [
        RecordStatus::Pending,
        RecordStatus::Processing,
        RecordStatus::Completed,
        RecordStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Processing => "processing",
            RecordStatus::Completed => "completed",
            RecordStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categorical classification result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentiment::Positive => write!(f, "positive"),
            Sentiment::Negative => write!(f, "negative"),
            Sentiment::Neutral => write!(f, "neutral"),
        }
    }
}

/// Structured classification payload stored on a completed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub sentiment: Sentiment,
    pub summary: String,
}

impl Analysis {
    pub const UNAVAILABLE_SUMMARY: &'static str = "Analysis unavailable";

    /// Stand-in used when the classifier returned nothing usable for a record.
    pub fn unavailable() -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            summary: Self::UNAVAILABLE_SUMMARY.to_string(),
        }
    }
}

/// A normalized candidate that passed the content filter, not yet stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub source: String,
    pub content: String,
}

impl NewRecord {
    /// Joins title and body into one trimmed text and drops anything too
    /// short to be worth classifying.
    pub fn from_post(source: &str, title: &str, body: &str) -> Option<Self> {
        let content = if body.is_empty() {
            title.to_string()
        } else {
            format!("{title}\n\n{body}")
        };
        let content = content.trim();

        if content.chars().count() <= MIN_CONTENT_CHARS {
            return None;
        }

        Some(Self {
            source: source.to_string(),
            content: content.to_string(),
        })
    }
}

/// One ingested text item tracked through the classification lifecycle.
///
/// `id`, `source`, `content` and `created_at` are write-once; the remaining
/// fields only change through [`RecordPatch`](super::RecordPatch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: Uuid,
    pub source: String,
    pub content: String,
    pub status: RecordStatus,
    pub sentiment: Option<Sentiment>,
    pub analysis: Option<Analysis>,
    pub error_message: Option<String>,
    pub analyzed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ItemRecord {
    pub fn new(record: NewRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: record.source,
            content: record.content,
            status: RecordStatus::Pending,
            sentiment: None,
            analysis: None,
            error_message: None,
            analyzed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Whether the result fields agree with the status.
    pub fn is_consistent(&self) -> bool {
        let analyzed = self.analysis.is_some() && self.analyzed_at.is_some();
        match self.status {
            RecordStatus::Completed => analyzed && self.error_message.is_none(),
            RecordStatus::Failed => self.error_message.is_some() && self.analysis.is_none(),
            RecordStatus::Pending | RecordStatus::Processing => {
                self.analysis.is_none() && self.analyzed_at.is_none() && self.error_message.is_none()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_title_and_body() {
        let record = NewRecord::from_post("r/aviation", "  Nice view from the tower ", "").unwrap();
        assert_eq!(record.content, "Nice view from the tower");
        assert_eq!(record.source, "r/aviation");

        let record = NewRecord::from_post("r/aviation", "Title here", "and a body  ").unwrap();
        assert_eq!(record.content, "Title here\n\nand a body");
    }

    #[test]
    fn drops_short_or_empty_content() {
        assert!(NewRecord::from_post("r/x", "", "").is_none());
        assert!(NewRecord::from_post("r/x", "   ", "   ").is_none());
        // Exactly ten characters is still too short.
        assert!(NewRecord::from_post("r/x", "0123456789", "").is_none());
        assert!(NewRecord::from_post("r/x", "0123456789A", "").is_some());
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        // Ten characters, twenty bytes.
        assert!(NewRecord::from_post("r/x", "éééééééééé", "").is_none());
    }

    #[test]
    fn new_record_starts_pending() {
        let record = ItemRecord::new(NewRecord {
            source: "r/hoggit".into(),
            content: "A pair of jets in formation".into(),
        });
        assert_eq!(record.status, RecordStatus::Pending);
        assert!(record.analysis.is_none());
        assert!(record.error_message.is_none());
        assert!(record.is_consistent());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&RecordStatus::Processing).unwrap();
        assert_eq!(json, r#""processing""#);
        let parsed: Sentiment = serde_json::from_str(r#""negative""#).unwrap();
        assert_eq!(parsed, Sentiment::Negative);
    }

    #[test]
    fn status_display() {
        let names: Vec<String> = RecordStatus::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["pending", "processing", "completed", "failed"]);
    }
}
