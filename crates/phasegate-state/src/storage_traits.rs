//! Storage trait definitions for phasegate
//!
//! The orchestration core persists an audit trail as opaque structured
//! records:
//! - `plan`: orchestration plans, one per phase invocation
//! - `transition`: executed phase transitions (passed or failed)
//! - `violations`: boundary violation ledger snapshots
//! - `handoff`: handoff packages passed between phases
//!
//! No file format is mandated. The only contract is that `put` is idempotent
//! per `(kind, id)`: the first write wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Content digest (SHA-256 hex string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Plan,
    Transition,
    Violations,
    Handoff,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Plan => "plan",
            RecordKind::Transition => "transition",
            RecordKind::Violations => "violations",
            RecordKind::Handoff => "handoff",
        }
    }

    pub fn all() -> [RecordKind; 4] {
        [
            RecordKind::Plan,
            RecordKind::Transition,
            RecordKind::Violations,
            RecordKind::Handoff,
        ]
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single persisted audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub kind: RecordKind,
    pub id: String,
    pub recorded_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    /// SHA-256 of `serde_json::to_vec(&payload)`.
    pub digest: ContentDigest,
}

impl AuditRecord {
    /// Build a record from any serialisable payload, computing its digest.
    pub fn new<T: Serialize>(
        kind: RecordKind,
        id: impl Into<String>,
        payload: &T,
    ) -> StorageResult<Self> {
        let payload = serde_json::to_value(payload)?;
        let digest = ContentDigest::from_bytes(&serde_json::to_vec(&payload)?);
        Ok(Self {
            kind,
            id: id.into(),
            recorded_at: Utc::now(),
            payload,
            digest,
        })
    }

    /// Re-derive the digest and compare it with the stored one.
    pub fn verify(&self) -> StorageResult<()> {
        let computed = ContentDigest::from_bytes(&serde_json::to_vec(&self.payload)?);
        if computed != self.digest {
            return Err(StorageError::Corrupt {
                kind: self.kind,
                id: self.id.clone(),
                reason: format!(
                    "digest mismatch: expected {}, got {}",
                    self.digest.short(),
                    computed.short()
                ),
            });
        }
        Ok(())
    }

    /// Decode the payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> StorageResult<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Outcome of an idempotent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    /// The record was stored.
    Written,
    /// A record with the same kind and id already existed; nothing changed.
    AlreadyPresent,
}

/// Append-only audit store.
///
/// Guarantees:
/// - `put` is idempotent per `(kind, id)`; the first write wins.
/// - `get` returns exactly the record previously stored.
/// - `list` returns records of one kind ordered by `recorded_at`, then id.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Store a record unless one with the same kind and id exists.
    async fn put(&self, record: AuditRecord) -> StorageResult<WriteOutcome>;

    /// Retrieve a record. Returns `StorageError::NotFound` if absent.
    async fn get(&self, kind: RecordKind, id: &str) -> StorageResult<AuditRecord>;

    /// Check whether a record exists.
    async fn contains(&self, kind: RecordKind, id: &str) -> StorageResult<bool>;

    /// List all records of a kind, oldest first.
    async fn list(&self, kind: RecordKind) -> StorageResult<Vec<AuditRecord>>;
}

/// Ids become file names in `FsAuditStore`, so the same rule applies to every
/// backend to keep them interchangeable.
pub fn validate_record_id(id: &str) -> StorageResult<()> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidRecordId { id: id.to_string() })
    }
}
