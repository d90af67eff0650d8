use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::*;

/// Filesystem-backed audit store.
///
/// Layout: `<root>/<kind>/<id>.json`, one pretty-printed JSON record per file.
pub struct FsAuditStore {
    root: PathBuf,
}

impl FsAuditStore {
    /// Create a store rooted at `root`, creating one directory per record kind.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        for kind in RecordKind::all() {
            fs::create_dir_all(root.join(kind.as_str()))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, kind: RecordKind, id: &str) -> PathBuf {
        self.root.join(kind.as_str()).join(format!("{id}.json"))
    }

    fn read_record(&self, path: &Path) -> StorageResult<AuditRecord> {
        let bytes = fs::read(path)?;
        let record: AuditRecord = serde_json::from_slice(&bytes)?;
        record.verify()?;
        Ok(record)
    }
}

#[async_trait]
impl AuditStore for FsAuditStore {
    async fn put(&self, record: AuditRecord) -> StorageResult<WriteOutcome> {
        validate_record_id(&record.id)?;
        let path = self.record_path(record.kind, &record.id);
        if path.exists() {
            return Ok(WriteOutcome::AlreadyPresent);
        }

        let dir = self.root.join(record.kind.as_str());
        let bytes = serde_json::to_vec_pretty(&record)?;

        // Temp file in the same directory, then a no-clobber rename.
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                debug!(kind = %record.kind, id = %record.id, "audit record written");
                Ok(WriteOutcome::Written)
            }
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                Ok(WriteOutcome::AlreadyPresent)
            }
            Err(e) => Err(StorageError::Io(e.error)),
        }
    }

    async fn get(&self, kind: RecordKind, id: &str) -> StorageResult<AuditRecord> {
        validate_record_id(id)?;
        let path = self.record_path(kind, id);
        match self.read_record(&path) {
            Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound {
                    kind,
                    id: id.to_string(),
                })
            }
            other => other,
        }
    }

    async fn contains(&self, kind: RecordKind, id: &str) -> StorageResult<bool> {
        validate_record_id(id)?;
        Ok(self.record_path(kind, id).exists())
    }

    async fn list(&self, kind: RecordKind) -> StorageResult<Vec<AuditRecord>> {
        let dir = self.root.join(kind.as_str());
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            out.push(self.read_record(&path)?);
        }
        out.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }
}
