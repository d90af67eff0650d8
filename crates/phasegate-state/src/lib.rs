//! Phasegate-State: audit persistence for phasegate
//!
//! Plans, phase transitions, violation ledger snapshots and handoff packages
//! are stored as opaque structured records behind the `AuditStore` trait.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: integrity and idempotent writes. Every record carries a SHA-256
//! digest of its payload, and a second write of the same `(kind, id)` is a
//! no-op.
//!
//! ## Key Components
//!
//! - `AuditStore`: async storage trait
//! - `MemoryAuditStore`: in-memory implementation for tests and ephemeral runs
//! - `FsAuditStore`: one JSON file per record under `<root>/<kind>/<id>.json`

mod error;
pub mod fakes;
mod fs_store;
pub mod storage_traits;

pub use error::StorageError;
pub use fakes::MemoryAuditStore;
pub use fs_store::FsAuditStore;
pub use storage_traits::{
    validate_record_id, AuditRecord, AuditStore, ContentDigest, RecordKind, StorageResult,
    WriteOutcome,
};
