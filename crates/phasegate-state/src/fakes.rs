//! In-memory fake for the audit store (testing only)
//!
//! `MemoryAuditStore` satisfies the `AuditStore` contract without touching
//! the filesystem.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

type RecordMap = BTreeMap<(RecordKind, String), AuditRecord>;

/// In-memory audit store backed by a `BTreeMap<(kind, id), record>`.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    records: Mutex<RecordMap>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all kinds.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, RecordMap> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn put(&self, record: AuditRecord) -> StorageResult<WriteOutcome> {
        validate_record_id(&record.id)?;
        let mut records = self.lock();
        let key = (record.kind, record.id.clone());
        if records.contains_key(&key) {
            return Ok(WriteOutcome::AlreadyPresent);
        }
        records.insert(key, record);
        Ok(WriteOutcome::Written)
    }

    async fn get(&self, kind: RecordKind, id: &str) -> StorageResult<AuditRecord> {
        self.lock()
            .get(&(kind, id.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                kind,
                id: id.to_string(),
            })
    }

    async fn contains(&self, kind: RecordKind, id: &str) -> StorageResult<bool> {
        Ok(self.lock().contains_key(&(kind, id.to_string())))
    }

    async fn list(&self, kind: RecordKind) -> StorageResult<Vec<AuditRecord>> {
        let mut out: Vec<AuditRecord> = self
            .lock()
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, r)| r.clone())
            .collect();
        out.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }
}
