//! The agent orchestrator: plan a phase, execute it, synthesize the results.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::instrument;

use phasegate_state::{AuditRecord, AuditStore, RecordKind};

use crate::boundary::BoundaryEnforcer;
use crate::config::SchedulerConfig;
use crate::context::{ContextEmbedder, ContextInheritance, SourceMaterial};
use crate::domain::{TaskResult, WorkflowPhase};
use crate::obs;

use super::conflict::CoordinationDescriptor;
use super::error::{OrchestrationError, OrchestrationResult};
use super::executor::{CancellationHandle, ExecutionConfig, ExecutionReport, PlanExecutor};
use super::planner::{self, OrchestrationPlan};
use super::registry::RoleRegistry;
use super::synthesis::{synthesize, SynthesisResult};

/// Everything one phase run produced.
#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    pub plan: OrchestrationPlan,
    pub report: ExecutionReport,
    pub synthesis: SynthesisResult,
}

pub struct AgentOrchestrator {
    enforcer: Arc<BoundaryEnforcer>,
    executor: PlanExecutor,
    config: SchedulerConfig,
    descriptor: CoordinationDescriptor,
    store: Option<Arc<dyn AuditStore>>,
    plans: RwLock<HashMap<String, OrchestrationPlan>>,
}

impl AgentOrchestrator {
    pub fn new(
        registry: RoleRegistry,
        enforcer: Arc<BoundaryEnforcer>,
        config: SchedulerConfig,
    ) -> Self {
        let executor = PlanExecutor::new(
            Arc::clone(&enforcer),
            Arc::new(registry),
            ExecutionConfig::from(&config),
        );
        Self {
            enforcer,
            executor,
            descriptor: CoordinationDescriptor::new(config.strategy),
            config,
            store: None,
            plans: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_descriptor(mut self, descriptor: CoordinationDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<ContextEmbedder>) -> Self {
        self.executor = self.executor.with_embedder(embedder);
        self
    }

    pub fn with_inheritance(mut self, inheritance: Arc<ContextInheritance>) -> Self {
        self.executor = self.executor.with_inheritance(inheritance);
        self
    }

    pub fn has_embedder(&self) -> bool {
        self.executor.has_embedder()
    }

    pub fn inheritance(&self) -> &Arc<ContextInheritance> {
        self.executor.inheritance()
    }

    /// Failures of tasks with priority strictly above this abort a plan.
    pub fn high_priority_threshold(&self) -> u8 {
        self.config.high_priority_threshold
    }

    /// Persist every plan as a `plan` record.
    pub fn with_store(mut self, store: Arc<dyn AuditStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn enforcer(&self) -> &Arc<BoundaryEnforcer> {
        &self.enforcer
    }

    pub fn descriptor(&self) -> &CoordinationDescriptor {
        &self.descriptor
    }

    /// Build, retain and persist the plan for `phase`.
    pub async fn plan_phase(
        &self,
        phase: WorkflowPhase,
        requirements: Value,
    ) -> OrchestrationResult<OrchestrationPlan> {
        self.plan_phase_with(phase, requirements, None).await
    }

    /// Like [`plan_phase`](Self::plan_phase), attaching context material for
    /// the executor's embedder.
    pub async fn plan_phase_with(
        &self,
        phase: WorkflowPhase,
        requirements: Value,
        material: Option<SourceMaterial>,
    ) -> OrchestrationResult<OrchestrationPlan> {
        let mut plan = planner::plan_phase(phase, requirements, self.config.high_priority_threshold)?;
        plan.material = material;

        if let Some(store) = &self.store {
            let record = AuditRecord::new(RecordKind::Plan, plan.id.clone(), &plan)?;
            store.put(record).await?;
        }
        obs::emit_plan_built(&plan.id, phase, plan.tasks.len(), plan.stages.len());

        self.plans
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(plan.id.clone(), plan.clone());
        Ok(plan)
    }

    /// A retained plan. Plans built by [`run_phase`](Self::run_phase) are
    /// not retained past the run.
    pub fn plan(&self, id: &str) -> OrchestrationResult<OrchestrationPlan> {
        self.plans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestrationError::PlanNotFound { id: id.to_string() })
    }

    /// Drop a retained plan. Returns whether it existed.
    pub fn discard_plan(&self, id: &str) -> bool {
        self.plans
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    pub fn retained_plans(&self) -> usize {
        self.plans.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub async fn execute_plan(
        &self,
        plan: &OrchestrationPlan,
        cancel: &CancellationHandle,
    ) -> ExecutionReport {
        self.executor.execute(plan, cancel).await
    }

    pub fn synthesize(&self, results: &[TaskResult], plan: &OrchestrationPlan) -> SynthesisResult {
        synthesize(results, plan, &self.descriptor)
    }

    /// Plan, execute and synthesize one phase. The plan is discarded once
    /// synthesized; the outcome carries it.
    #[instrument(skip(self, requirements, material, cancel), fields(phase = %phase))]
    pub async fn run_phase(
        &self,
        phase: WorkflowPhase,
        requirements: Value,
        material: Option<SourceMaterial>,
        cancel: &CancellationHandle,
    ) -> OrchestrationResult<PhaseOutcome> {
        let plan = self.plan_phase_with(phase, requirements, material).await?;
        let report = self.execute_plan(&plan, cancel).await;
        let synthesis = self.synthesize(&report.results, &plan);
        self.discard_plan(&plan.id);
        Ok(PhaseOutcome {
            plan,
            report,
            synthesis,
        })
    }
}

impl std::fmt::Debug for AgentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOrchestrator")
            .field("executor", &self.executor)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}
