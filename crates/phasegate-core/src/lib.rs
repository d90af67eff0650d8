//! Phasegate Core Library
//!
//! Role-bounded, phase-gated orchestration of cooperating agent roles.
//!
//! ## Layers
//!
//! - `boundary`: which role may do what, on which resource, in which phase
//! - `orchestration`: per-phase plans, staged parallel execution, conflict
//!   resolution and synthesis
//! - `workflow`: the five-phase state machine with gates, handoffs and
//!   rollback
//! - `context`: budgeted task contexts and cross-task inheritance
//!
//! Persistence lives in `phasegate-state`; every component takes its stores
//! and collaborators by `Arc` injection.

pub mod boundary;
pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod obs;
pub mod orchestration;
pub mod telemetry;
pub mod workflow;

pub use boundary::{
    ActionRequest, BoundaryCheck, BoundaryEnforcer, BoundaryError, BoundaryViolation,
    Capability, EnforcementLevel, ResourcePattern, Restriction, RoleDefinition,
    ViolationSeverity,
};

pub use config::{ConfigError, PhasegateConfig};

pub use context::{
    CompletedTask, ContextEmbedder, ContextError, ContextInheritance, InheritedContext,
    PriorContext, SmartContext, SourceMaterial,
};

pub use domain::{AgentRole, RoleAction, Task, TaskProfile, TaskResult, WorkflowPhase};

pub use error::{PhasegateError, Result};

pub use orchestration::{
    AgentError, AgentOrchestrator, CancellationHandle, ConflictStrategy, CoordinationDescriptor,
    ExecutionReport, OrchestrationError, OrchestrationPlan, RoleAgent, RoleInvocation,
    RoleRegistry, SynthesisResult,
};

pub use workflow::{
    FailurePolicy, HandoffPackage, PhaseDefinition, PhaseTransition, WorkflowError,
    WorkflowObserver, WorkflowOrchestrator, WorkflowState,
};

pub use phasegate_state::{AuditStore, FsAuditStore, MemoryAuditStore, RecordKind};

pub use metrics::METRICS;
pub use obs::{
    emit_boundary_violation, emit_phase_completed, emit_phase_failed, emit_phase_started,
    emit_plan_built, emit_rollback, WorkflowSpan,
};
pub use telemetry::init_tracing;

/// Phasegate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
