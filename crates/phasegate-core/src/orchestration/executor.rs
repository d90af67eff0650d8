//! Stage-by-stage plan execution.
//!
//! Parallel stages spawn one tokio task per plan task, bounded by a
//! semaphore, and wait for all of them at the stage barrier. Every task is
//! checked by the boundary enforcer before its agent is called, runs under a
//! per-task timeout, and stops early when the plan is cancelled.
//!
//! With an embedder attached, each task gets a [`SmartContext`]. Tasks with
//! dependencies inherit decisions, patterns and notes from their finished
//! dependencies through [`ContextInheritance`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, instrument};

use crate::boundary::{ActionRequest, BoundaryEnforcer};
use crate::config::SchedulerConfig;
use crate::context::{
    CompletedTask, ContextEmbedder, ContextInheritance, ItemKind, PriorContext, SmartContext,
    SourceMaterial,
};
use crate::domain::{Task, TaskResult};
use crate::metrics::METRICS;
use crate::obs;

use super::planner::{ExecutionStage, OrchestrationPlan};
use super::registry::{RoleInvocation, RoleRegistry};

/// Execution limits derived from [`SchedulerConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub max_concurrent: usize,
    pub task_timeout: Duration,
    /// Failures of tasks with priority strictly above this abort the plan.
    pub high_priority_threshold: u8,
}

impl From<&SchedulerConfig> for ExecutionConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent.max(1),
            task_timeout: config.task_timeout(),
            high_priority_threshold: config.high_priority_threshold,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

/// Plan-level cancellation flag shared with every running task.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a plan stopped before its last stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AbortReason {
    CriticalTaskFailed {
        task_id: String,
        priority: u8,
        error: String,
    },
    Cancelled,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::CriticalTaskFailed {
                task_id,
                priority,
                error,
            } => write!(f, "critical task {task_id} (priority {priority}) failed: {error}"),
            AbortReason::Cancelled => write!(f, "plan cancelled"),
        }
    }
}

/// Results of one plan execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub plan_id: String,
    /// One result per executed task, in stage order.
    pub results: Vec<TaskResult>,
    pub aborted: Option<AbortReason>,
    pub elapsed_ms: u64,
    pub stages_completed: usize,
    /// Contexts handed to tasks, by task id.
    #[serde(default)]
    pub contexts: HashMap<String, SmartContext>,
}

impl ExecutionReport {
    pub fn result(&self, task_id: &str) -> Option<&TaskResult> {
        self.results.iter().find(|r| r.task_id == task_id)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &TaskResult> {
        self.results.iter().filter(|r| r.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskResult> {
        self.results.iter().filter(|r| !r.success)
    }

    /// Failed tasks with priority strictly above `threshold`.
    pub fn critical_failures(&self, threshold: u8) -> usize {
        self.failed().filter(|r| r.priority > threshold).count()
    }

    /// Whether any failure may succeed on retry.
    pub fn has_transient_failure(&self) -> bool {
        self.failed().any(|r| r.transient)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// Every executed task of `plan` as an inheritance source, in execution
    /// order.
    pub fn completed_tasks(&self, plan: &OrchestrationPlan) -> Vec<CompletedTask> {
        let depths = plan_depths(plan);
        let empty = SourceMaterial::default();
        let material = plan.material.as_ref().unwrap_or(&empty);
        self.results
            .iter()
            .filter_map(|r| {
                let task = plan.task(&r.task_id)?;
                Some(completed_task(
                    task,
                    r,
                    self.contexts.get(&r.task_id),
                    material,
                    depths.get(&r.task_id).copied().unwrap_or(0),
                ))
            })
            .collect()
    }
}

/// Runs plans against a role registry.
#[derive(Clone)]
pub struct PlanExecutor {
    enforcer: Arc<BoundaryEnforcer>,
    registry: Arc<RoleRegistry>,
    embedder: Option<Arc<ContextEmbedder>>,
    inheritance: Arc<ContextInheritance>,
    config: ExecutionConfig,
}

impl PlanExecutor {
    pub fn new(
        enforcer: Arc<BoundaryEnforcer>,
        registry: Arc<RoleRegistry>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            enforcer,
            registry,
            embedder: None,
            inheritance: Arc::new(ContextInheritance::default()),
            config,
        }
    }

    /// Build a context for each task from the plan's material.
    pub fn with_embedder(mut self, embedder: Arc<ContextEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Inheritance used for tasks with dependencies.
    pub fn with_inheritance(mut self, inheritance: Arc<ContextInheritance>) -> Self {
        self.inheritance = inheritance;
        self
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    pub fn inheritance(&self) -> &Arc<ContextInheritance> {
        &self.inheritance
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Run `plan` stage by stage.
    ///
    /// Stops after the stage in which a task above the high-priority
    /// threshold failed, or as soon as `cancel` fires.
    #[instrument(skip(self, plan, cancel), fields(plan_id = %plan.id, phase = %plan.phase))]
    pub async fn execute(
        &self,
        plan: &OrchestrationPlan,
        cancel: &CancellationHandle,
    ) -> ExecutionReport {
        let started = Instant::now();
        let tasks: HashMap<&str, &Task> = plan.tasks.iter().map(|t| (t.id.as_str(), t)).collect();
        let mut results: Vec<TaskResult> = Vec::new();
        let mut contexts: HashMap<String, SmartContext> = HashMap::new();
        let depths = plan_depths(plan);
        let plan_id: Arc<str> = Arc::from(plan.id.as_str());
        let mut aborted = None;
        let mut stages_completed = 0;

        for stage in &plan.stages {
            if cancel.is_cancelled() {
                aborted = Some(AbortReason::Cancelled);
                break;
            }

            let mut batch: Vec<(Task, Option<SmartContext>)> = Vec::with_capacity(stage.task_ids.len());
            for task in stage.task_ids.iter().filter_map(|id| tasks.get(id.as_str())) {
                let context = self.context_for(task, plan, &results, &contexts, &depths);
                if let Some(ctx) = &context {
                    contexts.insert(task.id.clone(), ctx.clone());
                }
                batch.push(((*task).clone(), context));
            }

            let stage_results = self.run_stage(stage, batch, &plan_id, cancel).await;
            let failed = stage_results.iter().filter(|r| !r.success).count();
            obs::emit_stage_completed(
                &plan.id,
                stage.index,
                stage.parallel,
                stage_results.len() - failed,
                failed,
            );
            stages_completed += 1;

            let critical = stage_results
                .iter()
                .find(|r| !r.success && r.priority > self.config.high_priority_threshold)
                .map(|r| AbortReason::CriticalTaskFailed {
                    task_id: r.task_id.clone(),
                    priority: r.priority,
                    error: r.errors.join("; "),
                });
            results.extend(stage_results);

            if cancel.is_cancelled() {
                aborted = Some(AbortReason::Cancelled);
                break;
            }
            if critical.is_some() {
                aborted = critical;
                break;
            }
        }

        if let Some(reason) = &aborted {
            obs::emit_plan_aborted(&plan.id, &reason.to_string());
        }

        ExecutionReport {
            plan_id: plan.id.clone(),
            results,
            aborted,
            elapsed_ms: started.elapsed().as_millis() as u64,
            stages_completed,
            contexts,
        }
    }

    async fn run_stage(
        &self,
        stage: &ExecutionStage,
        batch: Vec<(Task, Option<SmartContext>)>,
        plan_id: &Arc<str>,
        cancel: &CancellationHandle,
    ) -> Vec<TaskResult> {
        if !stage.parallel {
            let mut results = Vec::with_capacity(batch.len());
            for (task, context) in batch {
                results.push(
                    self.run_task(task, context, Arc::clone(plan_id), cancel.subscribe())
                        .await,
                );
            }
            return results;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let originals: Vec<Task> = batch.iter().map(|(t, _)| t.clone()).collect();
        let handles = batch.into_iter().map(|(task, context)| {
            let executor = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let rx = cancel.subscribe();
            let plan_id = Arc::clone(plan_id);
            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                executor.run_task(task, context, plan_id, rx).await
            })
        });

        join_all(handles)
            .await
            .into_iter()
            .zip(originals)
            .map(|(joined, task)| {
                joined.unwrap_or_else(|e| {
                    let result = TaskResult::failed(
                        &task,
                        format!("task panicked: {e}"),
                        0,
                        Vec::new(),
                        false,
                    );
                    METRICS.inc_tasks_executed();
                    METRICS.inc_tasks_failed();
                    result
                })
            })
            .collect()
    }

    async fn run_task(
        &self,
        task: Task,
        context: Option<SmartContext>,
        plan_id: Arc<str>,
        mut cancel: watch::Receiver<bool>,
    ) -> TaskResult {
        let started = Instant::now();
        let elapsed = |started: Instant| started.elapsed().as_millis() as u64;
        METRICS.inc_tasks_executed();

        let result = 'run: {
            if *cancel.borrow() {
                break 'run TaskResult::failed(&task, "cancelled", 0, Vec::new(), false);
            }

            let request = ActionRequest::new(task.role, task.action.verb(), task.resource.clone())
                .in_phase(task.phase);
            let check = match self.enforcer.enforce_for(&request, Some(&*plan_id)) {
                Ok(check) => check,
                Err(e) => {
                    break 'run TaskResult::failed(&task, e.to_string(), elapsed(started), Vec::new(), false)
                }
            };
            let mut warnings = check.warnings;
            if let Some(v) = check.violation {
                warnings.push(v.to_string());
            }

            let agent = match self.registry.resolve(task.action) {
                Ok(agent) => agent,
                Err(e) => {
                    break 'run TaskResult::failed(&task, e.to_string(), elapsed(started), warnings, false)
                }
            };

            let invocation = RoleInvocation::for_task(&task, context);
            let outcome = tokio::select! {
                out = tokio::time::timeout(self.config.task_timeout, agent.perform(invocation)) => Some(out),
                _ = cancelled(&mut cancel) => None,
            };

            match outcome {
                Some(Ok(Ok(output))) => {
                    TaskResult::succeeded(&task, output, elapsed(started), warnings)
                }
                Some(Ok(Err(e))) => {
                    let transient = e.is_transient();
                    TaskResult::failed(&task, e.to_string(), elapsed(started), warnings, transient)
                }
                Some(Err(_)) => TaskResult::failed(
                    &task,
                    format!("timed out after {} ms", self.config.task_timeout.as_millis()),
                    elapsed(started),
                    warnings,
                    true,
                ),
                None => TaskResult::failed(&task, "cancelled", elapsed(started), warnings, false),
            }
        };

        if result.success {
            debug!(task_id = %result.task_id, elapsed_ms = result.elapsed_ms, "task succeeded");
        } else {
            METRICS.inc_tasks_failed();
            obs::emit_task_failed(
                &result.task_id,
                result.role,
                result.priority,
                &result.errors.join("; "),
            );
        }
        result
    }

    /// Context for `task`, if an embedder and material are available.
    ///
    /// Confidence is the mean confidence of the task's finished dependencies
    /// (100 with none). Finished dependencies, in declaration order, form the
    /// inheritance chain.
    fn context_for(
        &self,
        task: &Task,
        plan: &OrchestrationPlan,
        results: &[TaskResult],
        contexts: &HashMap<String, SmartContext>,
        depths: &HashMap<String, u32>,
    ) -> Option<SmartContext> {
        let embedder = self.embedder.as_ref()?;
        let material = plan.material.as_ref()?;

        let upstream: Vec<(&Task, &TaskResult)> = task
            .dependencies
            .iter()
            .filter_map(|d| Some((plan.task(d)?, results.iter().find(|r| &r.task_id == d)?)))
            .collect();
        let confidence = if upstream.is_empty() {
            100.0
        } else {
            upstream.iter().map(|(_, r)| r.confidence).sum::<f64>() / upstream.len() as f64
        };

        let profile = task.profile();
        let previous = if upstream.is_empty() {
            None
        } else {
            let chain: Vec<CompletedTask> = upstream
                .iter()
                .map(|(dep, result)| {
                    completed_task(
                        dep,
                        result,
                        contexts.get(&dep.id),
                        material,
                        depths.get(&dep.id).copied().unwrap_or(0),
                    )
                })
                .collect();
            match self.inheritance.inherit_from_chain(&profile, &chain) {
                Ok(inherited) => {
                    debug!(
                        task_id = %task.id,
                        sources = inherited.sources.len(),
                        decisions = inherited.decisions.len(),
                        insights = inherited.insights.len(),
                        "context inherited"
                    );
                    Some(PriorContext::Inherited(inherited))
                }
                Err(e) => {
                    tracing::warn!(task_id = %task.id, error = %e, "context inheritance failed");
                    None
                }
            }
        };

        match embedder.embed(&profile, material, confidence, previous.as_ref()) {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "context embedding failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for PlanExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanExecutor")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

/// Inheritance depth per task: one more than the deepest dependency, 0
/// without dependencies.
fn plan_depths(plan: &OrchestrationPlan) -> HashMap<String, u32> {
    let mut depths: HashMap<String, u32> = HashMap::new();
    for id in plan.stages.iter().flat_map(|s| &s.task_ids) {
        let Some(task) = plan.task(id) else { continue };
        let depth = task
            .dependencies
            .iter()
            .filter_map(|d| depths.get(d))
            .max()
            .map_or(0, |d| d + 1);
        depths.insert(task.id.clone(), depth);
    }
    depths
}

/// What a finished dependency hands to its dependents: the decisions and
/// patterns its context carried, and its warnings, recommendations and
/// errors as notes.
fn completed_task(
    task: &Task,
    result: &TaskResult,
    context: Option<&SmartContext>,
    material: &SourceMaterial,
    depth: u32,
) -> CompletedTask {
    let mut completed = CompletedTask::new(task.profile()).with_depth(depth);
    if let Some(ctx) = context.filter(|_| result.success) {
        for item in &ctx.extended {
            match item.kind {
                ItemKind::Decision => completed
                    .decisions
                    .extend(material.decisions.iter().find(|d| d.id == item.id).cloned()),
                ItemKind::Pattern => completed
                    .patterns
                    .extend(material.patterns.iter().find(|p| p.id == item.id).cloned()),
                _ => {}
            }
        }
    }
    completed.notes.extend(
        result
            .recommendations
            .iter()
            .chain(&result.warnings)
            .chain(&result.errors)
            .cloned(),
    );
    completed
}

/// Resolves once the flag is set; never resolves if the sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}
