//! Static phase definitions: entry conditions, exit criteria, validation
//! gates and the handoff protocol.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::WorkflowPhase;
use crate::orchestration::SynthesisResult;

use super::state::{Artifact, WorkflowState};

/// What a named check looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckKind {
    ArtifactPresent { artifact: String },
    PhaseCompleted { phase: WorkflowPhase },
    AllTasksSucceeded,
    /// No task above the high-priority threshold failed.
    NoCriticalFailures,
    /// Synthesis confidence, 0-100.
    MinConfidence { min: f64 },
    NoBlockingViolations,
    HumanApproval,
}

/// A named boolean check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    pub kind: CheckKind,
    /// A failing required check aborts; an optional one only warns.
    pub required: bool,
}

impl Check {
    pub fn required(name: impl Into<String>, kind: CheckKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: CheckKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }

    pub fn evaluate(&self, env: &CheckEnv<'_>) -> bool {
        match &self.kind {
            CheckKind::ArtifactPresent { artifact } => env.artifacts.contains_key(artifact),
            CheckKind::PhaseCompleted { phase } => env.state.completed_in_cycle(*phase),
            CheckKind::AllTasksSucceeded => env
                .synthesis
                .is_some_and(|s| s.tasks_succeeded == s.tasks_total),
            CheckKind::NoCriticalFailures => env.critical_failures == 0,
            CheckKind::MinConfidence { min } => env.synthesis.is_some_and(|s| s.confidence >= *min),
            CheckKind::NoBlockingViolations => env.blocking_violations == 0,
            CheckKind::HumanApproval => env.approvals.contains(&env.phase),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateCategory {
    Constitutional,
    Quality,
    Completeness,
    Human,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationGate {
    pub name: String,
    pub category: GateCategory,
    pub check: CheckKind,
    /// A failing blocking gate raises; a non-blocking one only warns.
    pub blocking: bool,
}

impl ValidationGate {
    pub fn new(name: impl Into<String>, category: GateCategory, check: CheckKind, blocking: bool) -> Self {
        Self {
            name: name.into(),
            category,
            check,
            blocking,
        }
    }

    pub fn evaluate(&self, env: &CheckEnv<'_>) -> bool {
        Check::required(self.name.clone(), self.check.clone()).evaluate(env)
    }
}

/// What the next phase receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffProtocol {
    pub carry_artifacts: Vec<String>,
    pub embed_context: bool,
    pub next_phase: WorkflowPhase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseDefinition {
    pub phase: WorkflowPhase,
    /// Artifact names taken from the synthesized output.
    pub produces: Vec<String>,
    pub entry_conditions: Vec<Check>,
    pub exit_criteria: Vec<Check>,
    pub gates: Vec<ValidationGate>,
    pub handoff: HandoffProtocol,
}

impl PhaseDefinition {
    /// Artifacts each phase is expected to produce.
    pub fn standard_artifacts(phase: WorkflowPhase) -> &'static [&'static str] {
        match phase {
            WorkflowPhase::Brainstorm => &["requirements_brief"],
            WorkflowPhase::Specify => &["specification", "acceptance_criteria"],
            WorkflowPhase::Shard => &["shards"],
            WorkflowPhase::Decompose => &["task_breakdown", "test_plan"],
            WorkflowPhase::Implement => &["implementation", "test_results"],
        }
    }

    pub fn standard(phase: WorkflowPhase) -> Self {
        let produces: Vec<String> = Self::standard_artifacts(phase)
            .iter()
            .map(|a| a.to_string())
            .collect();

        let mut entry_conditions = Vec::new();
        if phase != WorkflowPhase::Brainstorm {
            let previous = WorkflowPhase::all()
                .into_iter()
                .find(|p| p.next() == phase)
                .unwrap_or(WorkflowPhase::Brainstorm);
            entry_conditions.push(Check::required(
                format!("{previous}_completed"),
                CheckKind::PhaseCompleted { phase: previous },
            ));
            for artifact in Self::standard_artifacts(previous) {
                entry_conditions.push(Check::required(
                    format!("{artifact}_available"),
                    CheckKind::ArtifactPresent {
                        artifact: artifact.to_string(),
                    },
                ));
            }
        }

        let mut exit_criteria = vec![
            Check::required("no_critical_failures", CheckKind::NoCriticalFailures),
            Check::optional("all_tasks_succeeded", CheckKind::AllTasksSucceeded),
        ];
        exit_criteria.extend(produces.iter().map(|a| {
            Check::required(
                format!("{a}_produced"),
                CheckKind::ArtifactPresent { artifact: a.clone() },
            )
        }));

        let mut gates = vec![
            ValidationGate::new(
                "no_blocking_violations",
                GateCategory::Constitutional,
                CheckKind::NoBlockingViolations,
                phase == WorkflowPhase::Implement,
            ),
            ValidationGate::new(
                "confidence_floor",
                GateCategory::Quality,
                CheckKind::MinConfidence {
                    min: if phase == WorkflowPhase::Implement { 70.0 } else { 50.0 },
                },
                phase == WorkflowPhase::Implement,
            ),
        ];
        if phase == WorkflowPhase::Decompose {
            gates.push(ValidationGate::new(
                "test_plan_ready",
                GateCategory::Completeness,
                CheckKind::ArtifactPresent {
                    artifact: "test_plan".into(),
                },
                true,
            ));
        }
        if matches!(phase, WorkflowPhase::Specify | WorkflowPhase::Implement) {
            gates.push(ValidationGate::new(
                "human_review",
                GateCategory::Human,
                CheckKind::HumanApproval,
                false,
            ));
        }

        Self {
            phase,
            handoff: HandoffProtocol {
                carry_artifacts: produces.clone(),
                embed_context: true,
                next_phase: phase.next(),
            },
            produces,
            entry_conditions,
            exit_criteria,
            gates,
        }
    }

    pub fn standard_set() -> BTreeMap<WorkflowPhase, PhaseDefinition> {
        WorkflowPhase::all()
            .into_iter()
            .map(|p| (p, PhaseDefinition::standard(p)))
            .collect()
    }
}

/// Inputs to check evaluation.
#[derive(Debug, Clone, Copy)]
pub struct CheckEnv<'a> {
    pub phase: WorkflowPhase,
    pub state: &'a WorkflowState,
    /// Committed artifacts plus any the phase has staged.
    pub artifacts: &'a BTreeMap<String, Artifact>,
    pub synthesis: Option<&'a SynthesisResult>,
    pub approvals: &'a BTreeSet<WorkflowPhase>,
    /// Blocking violations recorded while the phase ran.
    pub blocking_violations: usize,
    /// Failed tasks above the high-priority threshold.
    pub critical_failures: usize,
}

/// Names of checks in `checks` that fail, split into (required, optional).
pub fn failing_checks(checks: &[Check], env: &CheckEnv<'_>) -> (Vec<String>, Vec<String>) {
    let mut required = Vec::new();
    let mut optional = Vec::new();
    for check in checks.iter().filter(|c| !c.evaluate(env)) {
        if check.required {
            required.push(check.name.clone());
        } else {
            optional.push(check.name.clone());
        }
    }
    (required, optional)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brainstorm_has_no_entry_conditions() {
        let def = PhaseDefinition::standard(WorkflowPhase::Brainstorm);
        assert!(def.entry_conditions.is_empty());
        assert_eq!(def.handoff.next_phase, WorkflowPhase::Specify);
    }

    #[test]
    fn test_shard_requires_specify_outputs() {
        let def = PhaseDefinition::standard(WorkflowPhase::Shard);
        let names: Vec<&str> = def.entry_conditions.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "specify_completed",
                "specification_available",
                "acceptance_criteria_available"
            ]
        );
    }

    #[test]
    fn test_implement_gates_are_blocking() {
        let def = PhaseDefinition::standard(WorkflowPhase::Implement);
        let blocking: Vec<&str> = def
            .gates
            .iter()
            .filter(|g| g.blocking)
            .map(|g| g.name.as_str())
            .collect();
        assert_eq!(blocking, vec!["no_blocking_violations", "confidence_floor"]);
        assert!(def.gates.iter().any(|g| g.category == GateCategory::Human && !g.blocking));
        assert_eq!(def.handoff.next_phase, WorkflowPhase::Brainstorm);
    }

    #[test]
    fn test_check_evaluation() {
        let state = WorkflowState::new();
        let artifacts = BTreeMap::new();
        let mut approvals = BTreeSet::new();
        let env = CheckEnv {
            phase: WorkflowPhase::Specify,
            state: &state,
            artifacts: &artifacts,
            synthesis: None,
            approvals: &approvals,
            blocking_violations: 1,
            critical_failures: 0,
        };
        let checks = vec![
            Check::required("brief", CheckKind::ArtifactPresent { artifact: "x".into() }),
            Check::optional("human", CheckKind::HumanApproval),
            Check::required("clean", CheckKind::NoBlockingViolations),
        ];
        let (required, optional) = failing_checks(&checks, &env);
        assert_eq!(required, vec!["brief", "clean"]);
        assert_eq!(optional, vec!["human"]);

        approvals.insert(WorkflowPhase::Specify);
        let env = CheckEnv {
            phase: WorkflowPhase::Specify,
            state: &state,
            artifacts: &artifacts,
            synthesis: None,
            approvals: &approvals,
            blocking_violations: 0,
            critical_failures: 0,
        };
        assert!(checks[1].evaluate(&env));
        assert!(checks[2].evaluate(&env));
    }

    #[test]
    fn test_only_critical_failures_are_required() {
        let def = PhaseDefinition::standard(WorkflowPhase::Brainstorm);
        let state = WorkflowState::new();
        let mut artifacts = BTreeMap::new();
        artifacts.insert(
            "requirements_brief".to_string(),
            Artifact {
                name: "requirements_brief".into(),
                phase: WorkflowPhase::Brainstorm,
                content: serde_json::json!("brief"),
                produced_at: chrono::Utc::now(),
            },
        );
        let approvals = BTreeSet::new();
        let synthesis = SynthesisResult {
            plan_id: "plan".into(),
            phase: WorkflowPhase::Brainstorm,
            success: false,
            merged_output: serde_json::json!({}),
            confidence: 80.0,
            success_rate: 2.0 / 3.0,
            tasks_total: 3,
            tasks_succeeded: 2,
            conflicts: Vec::new(),
            resolved_conflicts: 0,
            unresolved_conflicts: 0,
            recommendations: Vec::new(),
            warnings: Vec::new(),
        };
        let mut env = CheckEnv {
            phase: WorkflowPhase::Brainstorm,
            state: &state,
            artifacts: &artifacts,
            synthesis: Some(&synthesis),
            approvals: &approvals,
            blocking_violations: 0,
            critical_failures: 0,
        };
        let (required, optional) = failing_checks(&def.exit_criteria, &env);
        assert!(required.is_empty());
        assert_eq!(optional, vec!["all_tasks_succeeded"]);

        env.critical_failures = 1;
        let (required, _) = failing_checks(&def.exit_criteria, &env);
        assert_eq!(required, vec!["no_critical_failures"]);
    }
}
