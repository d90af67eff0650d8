//! Error types for the phase workflow.

use crate::context::ContextError;
use crate::domain::WorkflowPhase;
use crate::orchestration::OrchestrationError;

/// Errors produced by the workflow orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("illegal transition from {from:?} to {to}")]
    IllegalTransition {
        from: Option<WorkflowPhase>,
        to: WorkflowPhase,
    },

    #[error("last transition into {phase} did not pass")]
    PreviousTransitionInvalid { phase: WorkflowPhase },

    #[error("entry conditions not met for {phase}: {}", failed.join(", "))]
    EntryConditionsNotMet {
        phase: WorkflowPhase,
        failed: Vec<String>,
    },

    #[error("exit criterion {criterion} failed for {phase}")]
    ExitCriterionFailed {
        phase: WorkflowPhase,
        criterion: String,
    },

    #[error("validation gate {gate} failed for {phase}")]
    ValidationGateFailed { phase: WorkflowPhase, gate: String },

    #[error("{phase} execution failed: {reason}")]
    PhaseExecution {
        phase: WorkflowPhase,
        reason: String,
        transient: bool,
    },

    /// Recovery gave up. State was rolled back to `restored`.
    #[error("{phase} failed after {attempts} attempt(s), rolled back to {restored:?}: {cause}")]
    PhaseFailed {
        phase: WorkflowPhase,
        attempts: u32,
        cause: Box<WorkflowError>,
        restored: Option<WorkflowPhase>,
    },

    #[error("handoff digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("storage error: {0}")]
    Storage(#[from] phasegate_state::StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkflowError {
    /// Whether retrying the phase could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WorkflowError::PhaseExecution {
                transient: true,
                ..
            }
        )
    }
}

/// Result type for workflow operations.
pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;
