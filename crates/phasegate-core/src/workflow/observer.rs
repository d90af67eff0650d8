//! Caller-supplied hooks for phase lifecycle events.

use crate::domain::WorkflowPhase;

use super::error::WorkflowError;
use super::state::PhaseTransition;

/// Notified synchronously as phases run. Every method defaults to a no-op.
pub trait WorkflowObserver: Send + Sync {
    fn on_phase_started(&self, _phase: WorkflowPhase, _attempt: u32) {}

    fn on_phase_completed(&self, _transition: &PhaseTransition) {}

    fn on_phase_failed(&self, _phase: WorkflowPhase, _error: &WorkflowError) {}

    fn on_rollback(&self, _failed: WorkflowPhase, _restored: Option<WorkflowPhase>) {}
}
