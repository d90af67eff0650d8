//! Domain vocabulary shared by every phasegate layer: phases, roles,
//! actions and tasks.

pub mod action;
pub mod error;
pub mod phase;
pub mod role;
pub mod task;

pub use action::{ActionCategory, PriorityClass, RoleAction};
pub use error::{DomainError, DomainResult};
pub use phase::WorkflowPhase;
pub use role::AgentRole;
pub use task::{Task, TaskComplexity, TaskProfile, TaskResult};
