use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ItemStore, RecordFilter, StoreError};
use crate::record::{ItemRecord, NewRecord, RecordPatch};

/// Record store kept in memory and, when opened with a path, mirrored to a
/// JSON file after every write.
///
/// Writes are staged on a copy and only committed once the file has been
/// replaced, so a failed write leaves both memory and disk untouched.
pub struct JsonStore {
    path: Option<PathBuf>,
    records: Mutex<Vec<ItemRecord>>,
}

impl JsonStore {
    /// Opens the store at `path`, starting empty when the file does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records: Vec<ItemRecord> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        let inconsistent = records.iter().filter(|r| !r.is_consistent()).count();
        if inconsistent > 0 {
            warn!(path = %path.display(), inconsistent, "store contains records whose fields disagree with their status");
        }
        debug!(path = %path.display(), records = records.len(), "opened record store");

        Ok(Self {
            path: Some(path),
            records: Mutex::new(records),
        })
    }

    /// A store that never touches the filesystem.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn persist(&self, records: &[ItemRecord]) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(records)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

impl ItemStore for JsonStore {
    async fn insert(&self, records: Vec<NewRecord>) -> Result<Vec<ItemRecord>, StoreError> {
        let mut guard = self.records.lock().await;
        let inserted: Vec<ItemRecord> = records.into_iter().map(ItemRecord::new).collect();

        let mut next = guard.clone();
        next.extend(inserted.iter().cloned());
        self.persist(&next).await?;
        *guard = next;

        Ok(inserted)
    }

    async fn select(
        &self,
        filter: &RecordFilter,
        limit: Option<usize>,
    ) -> Result<Vec<ItemRecord>, StoreError> {
        let guard = self.records.lock().await;
        Ok(guard
            .iter()
            .filter(|record| filter.matches(record))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn update_many(&self, ids: &[Uuid], patch: RecordPatch) -> Result<usize, StoreError> {
        let mut guard = self.records.lock().await;
        let wanted: HashSet<Uuid> = ids.iter().copied().collect();

        let mut found = HashSet::with_capacity(wanted.len());
        for record in guard.iter().filter(|r| wanted.contains(&r.id)) {
            record.check(&patch)?;
            found.insert(record.id);
        }
        if let Some(missing) = wanted.iter().find(|id| !found.contains(*id)) {
            return Err(StoreError::NotFound(*missing));
        }

        let mut next = guard.clone();
        for record in next.iter_mut().filter(|r| wanted.contains(&r.id)) {
            record.apply(patch.clone())?;
        }
        self.persist(&next).await?;
        *guard = next;

        Ok(wanted.len())
    }

    async fn update_one(&self, id: Uuid, patch: RecordPatch) -> Result<(), StoreError> {
        let mut guard = self.records.lock().await;
        let index = guard
            .iter()
            .position(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))?;

        let mut next = guard.clone();
        next[index].apply(patch)?;
        self.persist(&next).await?;
        *guard = next;

        Ok(())
    }

    async fn delete_all(&self) -> Result<usize, StoreError> {
        let mut guard = self.records.lock().await;
        let removed = guard.len();
        self.persist(&[]).await?;
        guard.clear();
        Ok(removed)
    }
}
