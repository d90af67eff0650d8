//! Structured observability hooks for orchestration lifecycle events.
//!
//! - `WorkflowSpan`: RAII guard entering a workflow-run-scoped span
//! - `emit_*`: one function per lifecycle event, each an `info!`/`warn!`
//!   with a stable `event = "..."` field

use tracing::{info, warn};

use crate::domain::{AgentRole, WorkflowPhase};

/// RAII guard that enters a span tagged with the workflow run id and phase.
///
/// ```ignore
/// let _span = WorkflowSpan::enter("run-123", WorkflowPhase::Specify);
/// // every event below carries run_id and phase
/// ```
pub struct WorkflowSpan {
    _span: tracing::span::EnteredSpan,
}

impl WorkflowSpan {
    pub fn enter(run_id: &str, phase: WorkflowPhase) -> Self {
        Self {
            _span: phase_span(run_id, phase).entered(),
        }
    }
}

/// The span behind [`WorkflowSpan`], for instrumenting futures that must
/// stay `Send`.
pub fn phase_span(run_id: &str, phase: WorkflowPhase) -> tracing::Span {
    tracing::info_span!("phasegate.phase", run_id = %run_id, phase = %phase)
}

pub fn emit_plan_built(plan_id: &str, phase: WorkflowPhase, tasks: usize, stages: usize) {
    info!(
        event = "plan.built",
        plan_id = %plan_id,
        phase = %phase,
        tasks = tasks,
        stages = stages,
    );
}

pub fn emit_stage_completed(
    plan_id: &str,
    stage: usize,
    parallel: bool,
    succeeded: usize,
    failed: usize,
) {
    info!(
        event = "stage.completed",
        plan_id = %plan_id,
        stage = stage,
        parallel = parallel,
        succeeded = succeeded,
        failed = failed,
    );
}

pub fn emit_task_failed(task_id: &str, role: AgentRole, priority: u8, error: &str) {
    warn!(
        event = "task.failed",
        task_id = %task_id,
        role = %role,
        priority = priority,
        error = %error,
    );
}

pub fn emit_plan_aborted(plan_id: &str, reason: &str) {
    warn!(event = "plan.aborted", plan_id = %plan_id, reason = %reason);
}

pub fn emit_boundary_violation(role: AgentRole, action: &str, resource: &str, blocking: bool) {
    warn!(
        event = "boundary.violation",
        role = %role,
        action = %action,
        resource = %resource,
        blocking = blocking,
    );
}

pub fn emit_phase_started(phase: WorkflowPhase, attempt: u32) {
    info!(event = "phase.started", phase = %phase, attempt = attempt);
}

pub fn emit_phase_completed(phase: WorkflowPhase, duration_ms: u64, context_preserved: bool) {
    info!(
        event = "phase.completed",
        phase = %phase,
        duration_ms = duration_ms,
        context_preserved = context_preserved,
    );
}

pub fn emit_phase_failed(phase: WorkflowPhase, error: &dyn std::fmt::Display) {
    warn!(event = "phase.failed", phase = %phase, error = %error);
}

pub fn emit_rollback(failed: WorkflowPhase, restored: Option<WorkflowPhase>, rollbacks: u32) {
    let restored = restored.map(|p| p.as_str()).unwrap_or("none");
    warn!(
        event = "phase.rollback",
        failed = %failed,
        restored = %restored,
        rollbacks = rollbacks,
    );
}

pub fn emit_persist_error(kind: &str, id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "audit.persist_error", kind = %kind, id = %id, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_span_carries_run_id_and_phase() {
        let _span = WorkflowSpan::enter("run-obs-1", WorkflowPhase::Brainstorm);
        emit_phase_started(WorkflowPhase::Brainstorm, 1);
        assert!(logs_contain("phase.started"));
        assert!(logs_contain("run-obs-1"));
        assert!(logs_contain("brainstorm"));
    }

    #[traced_test]
    #[test]
    fn test_rollback_without_restored_phase() {
        emit_rollback(WorkflowPhase::Specify, None, 3);
        assert!(logs_contain("phase.rollback"));
        assert!(logs_contain("none"));
    }

    #[traced_test]
    #[test]
    fn test_boundary_violation_event() {
        emit_boundary_violation(AgentRole::ImplEngineer, "write", "specifications", true);
        assert!(logs_contain("boundary.violation"));
        assert!(logs_contain("impl_engineer"));
    }

    #[traced_test]
    #[test]
    fn test_persist_error_is_warning() {
        emit_persist_error("transition", "t-1", &"disk full");
        assert!(logs_contain("WARN"));
        assert!(logs_contain("disk full"));
    }
}
