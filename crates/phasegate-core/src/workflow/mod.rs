//! Phase workflow: BRAINSTORM -> SPECIFY -> SHARD -> DECOMPOSE -> IMPLEMENT.
//!
//! ## Key Components
//!
//! - `PhaseDefinition`: entry conditions, exit criteria, validation gates
//!   and handoff protocol for one phase
//! - `WorkflowOrchestrator`: runs phases, commits state on success and
//!   rolls back on failure
//! - `HandoffPackage`: digest-sealed artifacts and context for the next phase
//! - `FailurePolicy`: retry transient failures, roll back the rest

pub mod definition;
pub mod error;
pub mod handoff;
pub mod observer;
pub mod orchestrator;
pub mod recovery;
pub mod state;

pub use definition::{
    failing_checks, Check, CheckEnv, CheckKind, GateCategory, HandoffProtocol, PhaseDefinition,
    ValidationGate,
};
pub use error::{WorkflowError, WorkflowResult};
pub use handoff::HandoffPackage;
pub use observer::WorkflowObserver;
pub use orchestrator::WorkflowOrchestrator;
pub use recovery::{FailurePolicy, RecoveryDecision};
pub use state::{Artifact, PhaseMetrics, PhaseTransition, WorkflowMetrics, WorkflowState};
