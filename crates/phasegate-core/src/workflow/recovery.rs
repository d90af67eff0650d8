//! Retry-or-rollback decisions for failed phases.

use serde::{Deserialize, Serialize};

use crate::config::WorkflowConfig;

use super::error::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RecoveryDecision {
    /// Run the phase again as `attempt`.
    Retry { attempt: u32 },
    /// Restore the last successful phase.
    Rollback,
}

/// Only transient failures are retried, at most `max_retries` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePolicy {
    pub max_retries: u32,
}

impl FailurePolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Decide after `attempt` (1-based) failed with `error`.
    pub fn decide(&self, error: &WorkflowError, attempt: u32) -> RecoveryDecision {
        if error.is_transient() && attempt <= self.max_retries {
            RecoveryDecision::Retry {
                attempt: attempt + 1,
            }
        } else {
            RecoveryDecision::Rollback
        }
    }
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

impl From<&WorkflowConfig> for FailurePolicy {
    fn from(config: &WorkflowConfig) -> Self {
        Self::new(config.max_retries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WorkflowPhase;

    fn failure(transient: bool) -> WorkflowError {
        WorkflowError::PhaseExecution {
            phase: WorkflowPhase::Implement,
            reason: "x".into(),
            transient,
        }
    }

    #[test]
    fn test_transient_retried_until_limit() {
        let policy = FailurePolicy::new(2);
        assert_eq!(policy.decide(&failure(true), 1), RecoveryDecision::Retry { attempt: 2 });
        assert_eq!(policy.decide(&failure(true), 2), RecoveryDecision::Retry { attempt: 3 });
        assert_eq!(policy.decide(&failure(true), 3), RecoveryDecision::Rollback);
    }

    #[test]
    fn test_permanent_rolls_back() {
        assert_eq!(
            FailurePolicy::default().decide(&failure(false), 1),
            RecoveryDecision::Rollback
        );
        let gate = WorkflowError::ValidationGateFailed {
            phase: WorkflowPhase::Implement,
            gate: "g".into(),
        };
        assert_eq!(FailurePolicy::default().decide(&gate, 1), RecoveryDecision::Rollback);
    }

    #[test]
    fn test_from_config() {
        let config = WorkflowConfig { max_retries: 3 };
        assert_eq!(FailurePolicy::from(&config).max_retries, 3);
    }

    #[test]
    fn test_zero_retries() {
        assert_eq!(
            FailurePolicy::new(0).decide(&failure(true), 1),
            RecoveryDecision::Rollback
        );
    }
}
