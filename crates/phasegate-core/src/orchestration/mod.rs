//! Role task orchestration: planning, staged execution, conflict resolution
//! and synthesis for a single phase.

pub mod conflict;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod planner;
pub mod registry;
pub mod synthesis;

pub use conflict::{
    deep_merge, Candidate, Conflict, ConflictStrategy, CoordinationDescriptor, Superseded,
};
pub use error::{AgentError, AgentResult, OrchestrationError, OrchestrationResult};
pub use executor::{AbortReason, CancellationHandle, ExecutionConfig, ExecutionReport, PlanExecutor};
pub use orchestrator::{AgentOrchestrator, PhaseOutcome};
pub use planner::{build_stages, plan_phase, plan_tasks, ExecutionStage, OrchestrationPlan};
pub use registry::{RoleAgent, RoleInvocation, RoleRegistry};
pub use synthesis::{synthesize, SynthesisResult};
