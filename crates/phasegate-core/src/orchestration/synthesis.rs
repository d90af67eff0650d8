//! Folding task results into one phase outcome.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{TaskResult, WorkflowPhase};

use super::conflict::{resolve, Conflict, CoordinationDescriptor};
use super::planner::OrchestrationPlan;

const MIN_SUCCESS_RATE: f64 = 0.9;
const MIN_PARALLEL_RATIO: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub plan_id: String,
    pub phase: WorkflowPhase,
    /// Every planned task succeeded and no conflict was left open.
    pub success: bool,
    pub merged_output: Value,
    /// Mean confidence of successful results; 0 with none.
    pub confidence: f64,
    pub success_rate: f64,
    pub tasks_total: usize,
    pub tasks_succeeded: usize,
    pub conflicts: Vec<Conflict>,
    pub resolved_conflicts: usize,
    pub unresolved_conflicts: usize,
    pub recommendations: Vec<String>,
    pub warnings: Vec<String>,
}

/// Merge `results` of `plan` under `descriptor`.
///
/// Tasks the plan never reached count as not succeeded.
pub fn synthesize(
    results: &[TaskResult],
    plan: &OrchestrationPlan,
    descriptor: &CoordinationDescriptor,
) -> SynthesisResult {
    let tasks_total = plan.tasks.len().max(results.len());
    let succeeded: Vec<&TaskResult> = results.iter().filter(|r| r.success).collect();
    let tasks_succeeded = succeeded.len();
    let success_rate = if tasks_total == 0 {
        1.0
    } else {
        tasks_succeeded as f64 / tasks_total as f64
    };
    let confidence = if succeeded.is_empty() {
        0.0
    } else {
        succeeded.iter().map(|r| r.confidence).sum::<f64>() / succeeded.len() as f64
    };

    let resolution = resolve(results, descriptor);
    let resolved_conflicts = resolution.conflicts.iter().filter(|c| c.is_resolved()).count();
    let unresolved_conflicts = resolution.conflicts.len() - resolved_conflicts;

    let mut warnings = Vec::new();
    for r in results {
        warnings.extend(r.warnings.iter().map(|w| format!("{}: {w}", r.task_id)));
        if !r.success {
            warnings.push(format!("{} failed: {}", r.task_id, r.errors.join("; ")));
        }
    }
    warnings.extend(resolution.superseded.iter().map(|s| s.to_string()));
    for task in &plan.tasks {
        if !results.iter().any(|r| r.task_id == task.id) {
            warnings.push(format!("{} was not executed", task.id));
        }
    }

    let mut recommendations = Vec::new();
    if success_rate < MIN_SUCCESS_RATE {
        let failed: Vec<&str> = plan
            .tasks
            .iter()
            .map(|t| t.id.as_str())
            .filter(|id| !succeeded.iter().any(|r| r.task_id == *id))
            .collect();
        recommendations.push(format!(
            "success rate {:.0}% is below {:.0}%; revisit {}",
            success_rate * 100.0,
            MIN_SUCCESS_RATE * 100.0,
            failed.join(", ")
        ));
    }
    if plan.tasks.len() >= 3 {
        let ratio = plan.parallel_opportunities as f64 / plan.tasks.len() as f64;
        if ratio < MIN_PARALLEL_RATIO {
            recommendations.push(format!(
                "only {} of {} tasks ran in parallel; mark independent tasks parallel-safe",
                plan.parallel_opportunities,
                plan.tasks.len()
            ));
        }
    }
    let escalated: Vec<&str> = resolution
        .conflicts
        .iter()
        .filter(|c| !c.is_resolved())
        .map(|c| c.key.as_str())
        .collect();
    if !escalated.is_empty() {
        recommendations.push(format!(
            "conflicts need a decision from quality_guardian: {}",
            escalated.join(", ")
        ));
    }
    for r in &succeeded {
        for rec in &r.recommendations {
            if !recommendations.contains(rec) {
                recommendations.push(rec.clone());
            }
        }
    }

    SynthesisResult {
        plan_id: plan.id.clone(),
        phase: plan.phase,
        success: tasks_succeeded == tasks_total && unresolved_conflicts == 0,
        merged_output: Value::Object(resolution.merged),
        confidence,
        success_rate,
        tasks_total,
        tasks_succeeded,
        conflicts: resolution.conflicts,
        resolved_conflicts,
        unresolved_conflicts,
        recommendations,
        warnings,
    }
}
