//! Crate-level error aggregating every layer.

use phasegate_state::StorageError;

use crate::boundary::BoundaryError;
use crate::config::ConfigError;
use crate::context::ContextError;
use crate::domain::DomainError;
use crate::orchestration::OrchestrationError;
use crate::workflow::WorkflowError;

/// Any phasegate error.
#[derive(Debug, thiserror::Error)]
pub enum PhasegateError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Boundary(#[from] BoundaryError),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PhasegateError {
    /// Whether the failure is a blocking boundary denial, at any layer.
    pub fn is_boundary_violation(&self) -> bool {
        let boundary = match self {
            PhasegateError::Boundary(e)
            | PhasegateError::Orchestration(OrchestrationError::Boundary(e))
            | PhasegateError::Workflow(WorkflowError::Orchestration(OrchestrationError::Boundary(
                e,
            ))) => e,
            _ => return false,
        };
        boundary.violation().is_some()
    }
}

/// Result type for phasegate operations.
pub type Result<T> = std::result::Result<T, PhasegateError>;
