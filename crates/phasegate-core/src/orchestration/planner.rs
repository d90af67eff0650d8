//! Plan construction: one task per phase action, staged by a greedy
//! topological sort.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::context::SourceMaterial;
use crate::domain::{RoleAction, Task, WorkflowPhase};

use super::error::{OrchestrationError, OrchestrationResult};

/// A batch of tasks whose dependencies all completed in earlier stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStage {
    pub index: usize,
    pub task_ids: Vec<String>,
    pub parallel: bool,
    /// Max of task estimates for a parallel stage, sum for a sequential one.
    pub estimated_ms: u64,
    /// Contains a task above the high-priority threshold.
    pub critical: bool,
}

/// Staged tasks for one phase invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationPlan {
    pub id: String,
    pub phase: WorkflowPhase,
    pub requirements: Value,
    pub tasks: Vec<Task>,
    pub stages: Vec<ExecutionStage>,
    pub estimated_duration_ms: u64,
    /// Number of tasks that run in parallel stages.
    pub parallel_opportunities: usize,
    /// Longest estimated chain through declared dependencies.
    pub critical_path: Vec<String>,
    pub risk_notes: Vec<String>,
    /// Material the executor builds task contexts from, if any.
    pub material: Option<SourceMaterial>,
    pub created_at: DateTime<Utc>,
}

impl OrchestrationPlan {
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Index of the stage that schedules `task_id`.
    pub fn stage_of(&self, task_id: &str) -> Option<usize> {
        self.stages
            .iter()
            .find(|s| s.task_ids.iter().any(|id| id == task_id))
            .map(|s| s.index)
    }

    pub fn with_material(mut self, material: SourceMaterial) -> Self {
        self.material = Some(material);
        self
    }
}

/// Build the plan for `phase` from the static phase action table.
///
/// Every task receives `requirements` as input. Dependencies on actions
/// that are not part of the phase are dropped and noted as a risk.
pub fn plan_phase(
    phase: WorkflowPhase,
    requirements: Value,
    high_priority_threshold: u8,
) -> OrchestrationResult<OrchestrationPlan> {
    let actions = RoleAction::for_phase(phase);
    let in_phase: HashSet<&str> = actions.iter().map(|a| a.as_str()).collect();
    let mut notes = Vec::new();

    let tasks = actions
        .iter()
        .map(|&action| {
            let task = Task::for_action(action, phase, requirements.clone());
            let (kept, dropped): (Vec<String>, Vec<String>) = task
                .dependencies
                .iter()
                .cloned()
                .partition(|d| in_phase.contains(d.as_str()));
            for dep in dropped {
                notes.push(format!(
                    "{} depends on {dep}, which is not part of {phase}; dependency dropped",
                    task.id
                ));
            }
            task.with_dependencies(kept)
        })
        .collect();

    let mut plan = plan_tasks(phase, requirements, tasks, high_priority_threshold)?;
    plan.risk_notes.splice(0..0, notes);
    Ok(plan)
}

/// Build a plan from explicit tasks.
pub fn plan_tasks(
    phase: WorkflowPhase,
    requirements: Value,
    tasks: Vec<Task>,
    high_priority_threshold: u8,
) -> OrchestrationResult<OrchestrationPlan> {
    let stages = build_stages(&tasks, high_priority_threshold)?;
    let critical_path = critical_path(&tasks, &stages);
    let risk_notes = risk_notes(&tasks, &stages, high_priority_threshold);

    Ok(OrchestrationPlan {
        id: Uuid::new_v4().to_string(),
        phase,
        requirements,
        estimated_duration_ms: stages.iter().map(|s| s.estimated_ms).sum(),
        parallel_opportunities: stages
            .iter()
            .filter(|s| s.parallel)
            .map(|s| s.task_ids.len())
            .sum(),
        critical_path,
        risk_notes,
        tasks,
        stages,
        material: None,
        created_at: Utc::now(),
    })
}

/// Greedy topological staging.
///
/// Each round takes every unscheduled task whose dependencies were scheduled
/// in earlier rounds. If more than one of them is parallel-safe, those form
/// one parallel stage; every other ready task becomes its own sequential
/// stage, highest priority first. An empty ready set with tasks remaining is
/// a cycle, and no stages are returned.
pub fn build_stages(
    tasks: &[Task],
    high_priority_threshold: u8,
) -> OrchestrationResult<Vec<ExecutionStage>> {
    let mut ids = HashSet::new();
    for task in tasks {
        if !ids.insert(task.id.as_str()) {
            return Err(OrchestrationError::DuplicateTask {
                id: task.id.clone(),
            });
        }
    }
    for task in tasks {
        if let Some(dep) = task.dependencies.iter().find(|d| !ids.contains(d.as_str())) {
            return Err(OrchestrationError::UnknownDependency {
                task: task.id.clone(),
                dependency: dep.clone(),
            });
        }
    }

    let mut scheduled: HashSet<&str> = HashSet::new();
    let mut stages: Vec<ExecutionStage> = Vec::new();

    while scheduled.len() < tasks.len() {
        let mut ready: Vec<&Task> = tasks
            .iter()
            .filter(|t| !scheduled.contains(t.id.as_str()))
            .filter(|t| t.dependencies.iter().all(|d| scheduled.contains(d.as_str())))
            .collect();

        if ready.is_empty() {
            return Err(OrchestrationError::CircularDependency {
                remaining: tasks
                    .iter()
                    .filter(|t| !scheduled.contains(t.id.as_str()))
                    .map(|t| t.id.clone())
                    .collect(),
            });
        }

        // stable: ties keep plan order
        ready.sort_by(|a, b| b.priority.cmp(&a.priority));
        let (parallel, sequential): (Vec<&Task>, Vec<&Task>) =
            ready.iter().partition(|t| t.parallel_safe);
        let (parallel, sequential) = if parallel.len() > 1 {
            (parallel, sequential)
        } else {
            (Vec::new(), ready.clone())
        };

        if !parallel.is_empty() {
            stages.push(make_stage(stages.len(), &parallel, true, high_priority_threshold));
        }
        for task in sequential {
            stages.push(make_stage(stages.len(), &[task], false, high_priority_threshold));
        }
        scheduled.extend(ready.iter().map(|t| t.id.as_str()));
    }

    Ok(stages)
}

fn make_stage(index: usize, tasks: &[&Task], parallel: bool, threshold: u8) -> ExecutionStage {
    let estimates = tasks.iter().map(|t| t.estimated_ms);
    ExecutionStage {
        index,
        task_ids: tasks.iter().map(|t| t.id.clone()).collect(),
        parallel,
        estimated_ms: if parallel {
            estimates.max().unwrap_or(0)
        } else {
            estimates.sum()
        },
        critical: tasks.iter().any(|t| t.priority > threshold),
    }
}

fn critical_path(tasks: &[Task], stages: &[ExecutionStage]) -> Vec<String> {
    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut finish: HashMap<&str, (u64, Option<&str>)> = HashMap::new();

    for id in stages.iter().flat_map(|s| s.task_ids.iter()) {
        let Some(task) = by_id.get(id.as_str()) else {
            continue;
        };
        let (start, via) = task
            .dependencies
            .iter()
            .filter_map(|d| finish.get(d.as_str()).map(|(end, _)| (*end, d.as_str())))
            .max_by_key(|(end, _)| *end)
            .map(|(end, dep)| (end, Some(dep)))
            .unwrap_or((0, None));
        finish.insert(task.id.as_str(), (start + task.estimated_ms, via));
    }

    let Some((mut cursor, _)) = finish
        .iter()
        .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then_with(|| b.0.cmp(a.0)))
        .map(|(id, v)| (*id, *v))
    else {
        return Vec::new();
    };

    let mut path = vec![cursor.to_string()];
    while let Some((_, Some(prev))) = finish.get(cursor) {
        path.push(prev.to_string());
        cursor = prev;
    }
    path.reverse();
    path
}

fn risk_notes(tasks: &[Task], stages: &[ExecutionStage], threshold: u8) -> Vec<String> {
    let mut notes = Vec::new();
    for stage in stages.iter().filter(|s| s.critical) {
        let critical: Vec<&str> = stage
            .task_ids
            .iter()
            .filter(|id| {
                tasks
                    .iter()
                    .any(|t| &t.id == *id && t.priority > threshold)
            })
            .map(String::as_str)
            .collect();
        notes.push(format!(
            "stage {} is critical: failure of {} aborts the plan",
            stage.index,
            critical.join(", ")
        ));
    }

    let tail = stages.iter().rev().take_while(|s| !s.parallel).count();
    if tail >= 3 {
        notes.push(format!("plan ends with {tail} sequential stages"));
    }
    notes
}
