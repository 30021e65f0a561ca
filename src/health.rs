//! Read-only aggregate view over the record store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::record::{ItemRecord, RecordStatus};
use crate::store::{ItemStore, RecordFilter, StoreError};

/// More than this many records in flight reads as a busy pipeline.
pub const PROCESSING_THRESHOLD: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }

    fn add(&mut self, status: RecordStatus) {
        match status {
            RecordStatus::Pending => self.pending += 1,
            RecordStatus::Processing => self.processing += 1,
            RecordStatus::Completed => self.completed += 1,
            RecordStatus::Failed => self.failed += 1,
        }
    }

    /// Rules are checked in order; the first match wins.
    pub fn verdict(&self) -> HealthVerdict {
        if self.failed * 2 > self.completed {
            HealthVerdict::Degraded
        } else if self.processing > PROCESSING_THRESHOLD {
            HealthVerdict::Processing
        } else if self.total() == 0 {
            HealthVerdict::Idle
        } else {
            HealthVerdict::Healthy
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthVerdict {
    Healthy,
    Degraded,
    Processing,
    Idle,
}

impl fmt::Display for HealthVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthVerdict::Healthy => write!(f, "healthy"),
            HealthVerdict::Degraded => write!(f, "degraded"),
            HealthVerdict::Processing => write!(f, "processing"),
            HealthVerdict::Idle => write!(f, "idle"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub status: HealthVerdict,
    pub timestamp: DateTime<Utc>,
    pub total: usize,
    pub counts: StatusCounts,
    pub last_analyzed_at: Option<DateTime<Utc>>,
    /// Percentage of all records that completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_rate: Option<f64>,
}

impl HealthSnapshot {
    pub fn from_records(records: &[ItemRecord]) -> Self {
        let mut counts = StatusCounts::default();
        for record in records {
            counts.add(record.status);
        }
        let last_analyzed_at = records.iter().filter_map(|r| r.analyzed_at).max();

        let total = counts.total();
        let rate = |n: usize| (total > 0).then(|| n as f64 * 100.0 / total as f64);

        Self {
            status: counts.verdict(),
            timestamp: Utc::now(),
            total,
            counts,
            last_analyzed_at,
            success_rate: rate(counts.completed),
            failure_rate: rate(counts.failed),
        }
    }
}

/// Reads every record once and aggregates it. Never writes.
pub async fn snapshot<S: ItemStore>(store: &S) -> Result<HealthSnapshot, StoreError> {
    let records = store.select(&RecordFilter::all(), None).await?;
    Ok(HealthSnapshot::from_records(&records))
}
