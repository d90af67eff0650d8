//! Error types for planning and executing role tasks.

use crate::boundary::BoundaryError;
use crate::domain::{AgentRole, RoleAction};

/// Errors produced by the orchestration layer.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    /// Raised at plan construction; no stage is produced.
    #[error("circular dependency among tasks: {}", remaining.join(", "))]
    CircularDependency { remaining: Vec<String> },

    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },

    #[error("duplicate task id: {id}")]
    DuplicateTask { id: String },

    #[error("no agent registered for role {role}")]
    NoAgent { role: AgentRole },

    #[error("agent for role {role} does not support action {action}")]
    UnsupportedAction { role: AgentRole, action: RoleAction },

    #[error("agent for role {role} is missing actions: {missing:?}")]
    IncompleteAgent {
        role: AgentRole,
        missing: Vec<RoleAction>,
    },

    #[error("agent {agent} registered for actions of role {role}")]
    ForeignAction { agent: AgentRole, role: AgentRole },

    #[error("plan not found: {id}")]
    PlanNotFound { id: String },

    #[error(transparent)]
    Boundary(#[from] BoundaryError),

    #[error("storage error: {0}")]
    Storage(#[from] phasegate_state::StorageError),
}

/// Result type for orchestration operations.
pub type OrchestrationResult<T> = std::result::Result<T, OrchestrationError>;

/// Failure reported by a role agent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    #[error("{0}")]
    Failed(String),

    /// May succeed if retried.
    #[error("transient: {0}")]
    Transient(String),
}

impl AgentError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AgentError::Transient(_))
    }
}

/// Result type returned by role agents.
pub type AgentResult<T> = std::result::Result<T, AgentError>;
