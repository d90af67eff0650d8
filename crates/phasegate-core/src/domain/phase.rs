//! The fixed top-level workflow phase sequence.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// One step of the BRAINSTORM → SPECIFY → SHARD → DECOMPOSE → IMPLEMENT cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Brainstorm,
    Specify,
    Shard,
    Decompose,
    Implement,
}

impl WorkflowPhase {
    /// All phases in execution order.
    pub fn all() -> [WorkflowPhase; 5] {
        [
            WorkflowPhase::Brainstorm,
            WorkflowPhase::Specify,
            WorkflowPhase::Shard,
            WorkflowPhase::Decompose,
            WorkflowPhase::Implement,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowPhase::Brainstorm => "brainstorm",
            WorkflowPhase::Specify => "specify",
            WorkflowPhase::Shard => "shard",
            WorkflowPhase::Decompose => "decompose",
            WorkflowPhase::Implement => "implement",
        }
    }

    /// The phase that follows this one. IMPLEMENT wraps to BRAINSTORM.
    pub fn next(&self) -> WorkflowPhase {
        match self {
            WorkflowPhase::Brainstorm => WorkflowPhase::Specify,
            WorkflowPhase::Specify => WorkflowPhase::Shard,
            WorkflowPhase::Shard => WorkflowPhase::Decompose,
            WorkflowPhase::Decompose => WorkflowPhase::Implement,
            WorkflowPhase::Implement => WorkflowPhase::Brainstorm,
        }
    }

    /// Whether entering `self` is legal when the workflow currently sits at
    /// `current` (`None` means no phase has completed yet).
    ///
    /// The table is linear; the only back edge is IMPLEMENT → BRAINSTORM.
    pub fn can_follow(&self, current: Option<WorkflowPhase>) -> bool {
        match current {
            None => *self == WorkflowPhase::Brainstorm,
            Some(prev) => prev.next() == *self,
        }
    }
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WorkflowPhase {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkflowPhase::all()
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::UnknownPhase(s.to_string()))
    }
}
