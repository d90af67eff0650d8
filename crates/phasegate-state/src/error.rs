//! Error types for phasegate-state

use thiserror::Error;

use crate::storage_traits::RecordKind;

/// Errors that can occur in the audit persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// No record with this kind and id
    #[error("{kind} record not found: {id}")]
    NotFound { kind: RecordKind, id: String },

    /// Record ids become file names, so they must be path-safe
    #[error("invalid record id: {id:?}")]
    InvalidRecordId { id: String },

    /// Stored payload no longer matches its digest
    #[error("{kind} record {id} is corrupt: {reason}")]
    Corrupt {
        kind: RecordKind,
        id: String,
        reason: String,
    },

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error
    #[error("I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
