//! Per-run workflow state: current phase, transition history, artifacts and
//! aggregate metrics.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::WorkflowPhase;

/// A named output of a phase, carried forward to later phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub phase: WorkflowPhase,
    pub content: Value,
    pub produced_at: DateTime<Utc>,
}

/// An executed move into `to`. Appended to history, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub id: String,
    pub from: Option<WorkflowPhase>,
    pub to: WorkflowPhase,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub passed: bool,
    /// Names of the artifacts the phase produced.
    pub artifacts: Vec<String>,
    pub context_preserved: bool,
    pub error: Option<String>,
    /// 1-based attempt that produced this transition.
    pub attempt: u32,
    /// Optional checks and gates that failed, plus synthesis warnings.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Id of a passed transition record written by a persist step that then
    /// failed. That record is void.
    #[serde(default)]
    pub supersedes: Option<String>,
}

impl PhaseTransition {
    pub(crate) fn new(from: Option<WorkflowPhase>, to: WorkflowPhase, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from,
            to,
            started_at,
            duration_ms: 0,
            passed: false,
            artifacts: Vec::new(),
            context_preserved: false,
            error: None,
            attempt: 1,
            warnings: Vec::new(),
            supersedes: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseMetrics {
    pub completions: u32,
    pub failures: u32,
    /// Rolling mean over completions.
    pub avg_duration_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    pub per_phase: BTreeMap<WorkflowPhase, PhaseMetrics>,
    /// Boundary violations recorded while phases ran.
    pub violations: u64,
    pub rollbacks: u32,
    pub handoffs: u32,
    pub preserved_handoffs: u32,
    /// `preserved_handoffs / handoffs`; 0 before the first handoff.
    pub context_preservation_rate: f64,
}

impl WorkflowMetrics {
    pub fn record_completion(&mut self, phase: WorkflowPhase, duration_ms: u64) {
        let m = self.per_phase.entry(phase).or_default();
        m.completions += 1;
        m.avg_duration_ms += (duration_ms as f64 - m.avg_duration_ms) / f64::from(m.completions);
    }

    pub fn record_failure(&mut self, phase: WorkflowPhase) {
        self.per_phase.entry(phase).or_default().failures += 1;
    }

    pub fn record_handoff(&mut self, context_preserved: bool) {
        self.handoffs += 1;
        if context_preserved {
            self.preserved_handoffs += 1;
        }
        self.context_preservation_rate =
            f64::from(self.preserved_handoffs) / f64::from(self.handoffs);
    }

    pub fn completions(&self, phase: WorkflowPhase) -> u32 {
        self.per_phase.get(&phase).map_or(0, |m| m.completions)
    }
}

/// State of one workflow run. Reset by `start_workflow`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub run_id: String,
    /// Last phase with a passed transition. `None` before the first phase.
    pub current_phase: Option<WorkflowPhase>,
    pub history: Vec<PhaseTransition>,
    pub artifacts: BTreeMap<String, Artifact>,
    pub metrics: WorkflowMetrics,
    pub started_at: DateTime<Utc>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            current_phase: None,
            history: Vec::new(),
            artifacts: BTreeMap::new(),
            metrics: WorkflowMetrics::default(),
            started_at: Utc::now(),
        }
    }

    pub fn last_transition(&self) -> Option<&PhaseTransition> {
        self.history.last()
    }

    /// Most recent passed transition into `phase`.
    pub fn last_passed_into(&self, phase: WorkflowPhase) -> Option<&PhaseTransition> {
        self.history.iter().rev().find(|t| t.passed && t.to == phase)
    }

    /// Phase of the most recent passed transition.
    pub fn last_successful_phase(&self) -> Option<WorkflowPhase> {
        self.history.iter().rev().find(|t| t.passed).map(|t| t.to)
    }

    /// Whether `phase` passed in the current cycle, which starts at the most
    /// recent passed BRAINSTORM.
    pub fn completed_in_cycle(&self, phase: WorkflowPhase) -> bool {
        let start = self
            .history
            .iter()
            .rposition(|t| t.passed && t.to == WorkflowPhase::Brainstorm)
            .unwrap_or(0);
        self.history[start..]
            .iter()
            .any(|t| t.passed && t.to == phase)
    }

    /// Artifact contents by name.
    pub fn artifact_values(&self) -> BTreeMap<String, Value> {
        self.artifacts
            .iter()
            .map(|(k, a)| (k.clone(), a.content.clone()))
            .collect()
    }
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new()
    }
}
