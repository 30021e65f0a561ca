//! Persistence boundary for item records.
//!
//! [`ItemStore`] is the only place status transitions are written. The
//! classifier relies on two of its operations: selecting by status and
//! updating a whole id set at once.

mod error;
mod json;

pub use error::StoreError;
pub use json::JsonStore;

use uuid::Uuid;

use crate::record::{ItemRecord, NewRecord, RecordPatch, RecordStatus};

/// Which records a [`ItemStore::select`] call should return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub status: Option<RecordStatus>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(status: RecordStatus) -> Self {
        Self {
            status: Some(status),
        }
    }

    pub fn matches(&self, record: &ItemRecord) -> bool {
        self.status.is_none_or(|status| record.status == status)
    }
}

pub trait ItemStore {
    /// Stores new records in `pending` and returns them with their ids.
    async fn insert(&self, records: Vec<NewRecord>) -> Result<Vec<ItemRecord>, StoreError>;

    /// Records matching `filter`, oldest first, at most `limit` of them.
    async fn select(
        &self,
        filter: &RecordFilter,
        limit: Option<usize>,
    ) -> Result<Vec<ItemRecord>, StoreError>;

    /// Applies `patch` to every id as one write. Nothing is written when any
    /// id is unknown or any transition is illegal.
    async fn update_many(&self, ids: &[Uuid], patch: RecordPatch) -> Result<usize, StoreError>;

    async fn update_one(&self, id: Uuid, patch: RecordPatch) -> Result<(), StoreError>;

    /// Removes every record unconditionally, returning how many were removed.
    async fn delete_all(&self) -> Result<usize, StoreError>;
}
