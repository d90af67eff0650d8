//! The phase workflow driver.
//!
//! Each phase runs through the same steps: transition check, entry
//! conditions, role execution, exit criteria, validation gates, then the
//! handoff package and transition record. Records are persisted only after
//! all of them pass, handoff last, and workflow state is committed only after
//! persistence succeeds. A failure in between is retried or rolled back
//! according to the [`FailurePolicy`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{instrument, warn, Instrument};

use phasegate_state::{AuditRecord, AuditStore, RecordKind};

use crate::context::{ContextEmbedder, PriorContext, SourceMaterial};
use crate::domain::{TaskProfile, WorkflowPhase};
use crate::metrics::METRICS;
use crate::obs;
use crate::orchestration::{AbortReason, AgentOrchestrator, CancellationHandle};

use super::definition::{failing_checks, CheckEnv, PhaseDefinition};
use super::error::{WorkflowError, WorkflowResult};
use super::handoff::HandoffPackage;
use super::observer::WorkflowObserver;
use super::recovery::{FailurePolicy, RecoveryDecision};
use super::state::{Artifact, PhaseTransition, WorkflowState};

/// Output of a successful attempt, not yet applied to the state.
struct Staged {
    transition: PhaseTransition,
    artifacts: BTreeMap<String, Artifact>,
    violations: u64,
    handoff: HandoffPackage,
}

pub struct WorkflowOrchestrator {
    agents: Arc<AgentOrchestrator>,
    embedder: Arc<ContextEmbedder>,
    policy: FailurePolicy,
    definitions: BTreeMap<WorkflowPhase, PhaseDefinition>,
    store: Option<Arc<dyn AuditStore>>,
    observers: Vec<Arc<dyn WorkflowObserver>>,
    material: SourceMaterial,
    state: RwLock<WorkflowState>,
    approvals: RwLock<BTreeSet<WorkflowPhase>>,
    last_handoff: RwLock<Option<HandoffPackage>>,
    cancel: RwLock<CancellationHandle>,
    running: tokio::sync::Mutex<()>,
}

impl WorkflowOrchestrator {
    /// Drive phases through `agents`. `embedder` builds both the per-task
    /// contexts and the handoff contexts.
    pub fn new(agents: AgentOrchestrator, embedder: Arc<ContextEmbedder>) -> Self {
        Self {
            agents: Arc::new(agents.with_embedder(Arc::clone(&embedder))),
            embedder,
            policy: FailurePolicy::default(),
            definitions: PhaseDefinition::standard_set(),
            store: None,
            observers: Vec::new(),
            material: SourceMaterial::default(),
            state: RwLock::new(WorkflowState::new()),
            approvals: RwLock::new(BTreeSet::new()),
            last_handoff: RwLock::new(None),
            cancel: RwLock::new(CancellationHandle::new()),
            running: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Persist transitions, handoffs and violation snapshots.
    pub fn with_store(mut self, store: Arc<dyn AuditStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn WorkflowObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Material used for task and handoff contexts.
    pub fn with_material(mut self, material: SourceMaterial) -> Self {
        self.material = material;
        self
    }

    /// Replace the definition of one phase.
    pub fn with_definition(mut self, definition: PhaseDefinition) -> Self {
        self.definitions.insert(definition.phase, definition);
        self
    }

    /// Reset state, approvals and cancellation for a new run. Returns the
    /// run id.
    pub fn start_workflow(&self) -> String {
        let state = WorkflowState::new();
        let run_id = state.run_id.clone();
        *write(&self.state) = state;
        write(&self.approvals).clear();
        *write(&self.last_handoff) = None;
        *write(&self.cancel) = CancellationHandle::new();
        run_id
    }

    /// Record human approval for `phase`.
    pub fn approve(&self, phase: WorkflowPhase) {
        write(&self.approvals).insert(phase);
    }

    pub fn state(&self) -> WorkflowState {
        read(&self.state).clone()
    }

    /// Cancels the running phase and fails later ones until the next
    /// [`start_workflow`](Self::start_workflow).
    pub fn cancellation(&self) -> CancellationHandle {
        read(&self.cancel).clone()
    }

    pub fn last_handoff(&self) -> Option<HandoffPackage> {
        read(&self.last_handoff).clone()
    }

    pub fn agents(&self) -> &Arc<AgentOrchestrator> {
        &self.agents
    }

    pub fn definition(&self, phase: WorkflowPhase) -> PhaseDefinition {
        self.definitions
            .get(&phase)
            .cloned()
            .unwrap_or_else(|| PhaseDefinition::standard(phase))
    }

    /// Run one phase.
    ///
    /// Illegal transitions and unmet entry conditions return without any
    /// side effect. Later failures go through the failure policy; when it
    /// gives up, state is rolled back and [`WorkflowError::PhaseFailed`] is
    /// returned.
    #[instrument(skip(self, requirements), fields(phase = %phase))]
    pub async fn execute_phase(
        &self,
        phase: WorkflowPhase,
        requirements: Value,
    ) -> WorkflowResult<PhaseTransition> {
        let _running = self.running.lock().await;
        let snapshot = self.state();

        if !phase.can_follow(snapshot.current_phase) {
            return Err(WorkflowError::IllegalTransition {
                from: snapshot.current_phase,
                to: phase,
            });
        }
        if let Some(current) = snapshot.current_phase {
            if snapshot.last_passed_into(current).is_none() {
                return Err(WorkflowError::PreviousTransitionInvalid { phase: current });
            }
        }

        let definition = self.definition(phase);
        let approvals = read(&self.approvals).clone();
        let env = CheckEnv {
            phase,
            state: &snapshot,
            artifacts: &snapshot.artifacts,
            synthesis: None,
            approvals: &approvals,
            blocking_violations: 0,
            critical_failures: 0,
        };
        let (failed, optional) = failing_checks(&definition.entry_conditions, &env);
        for name in &optional {
            warn!(phase = %phase, check = %name, "optional entry condition not met");
        }
        if !failed.is_empty() {
            return Err(WorkflowError::EntryConditionsNotMet { phase, failed });
        }

        let span = obs::phase_span(&snapshot.run_id, phase);
        let mut attempt = 1;
        loop {
            obs::emit_phase_started(phase, attempt);
            for observer in &self.observers {
                observer.on_phase_started(phase, attempt);
            }

            let started_at = Utc::now();
            let result = self
                .attempt(phase, &definition, &requirements, &snapshot, attempt, started_at)
                .instrument(span.clone())
                .await;

            let mut superseded = None;
            let err = match result {
                Ok(staged) => match self.persist(&staged).await {
                    Ok(()) => return Ok(self.commit(phase, staged)),
                    Err((err, written)) => {
                        superseded = written;
                        err
                    }
                },
                Err(err) => err,
            };

            obs::emit_phase_failed(phase, &err);
            for observer in &self.observers {
                observer.on_phase_failed(phase, &err);
            }
            match self.policy.decide(&err, attempt) {
                RecoveryDecision::Retry { attempt: next } => attempt = next,
                RecoveryDecision::Rollback => {
                    let restored = self
                        .rollback(phase, &snapshot, &err, attempt, started_at, superseded)
                        .await;
                    return Err(WorkflowError::PhaseFailed {
                        phase,
                        attempts: attempt,
                        cause: Box::new(err),
                        restored,
                    });
                }
            }
        }
    }

    /// Run the remaining phases of the current cycle, or a full cycle when
    /// none is in progress.
    pub async fn run_cycle(&self, requirements: Value) -> WorkflowResult<Vec<PhaseTransition>> {
        let mut phase = match self.state().current_phase {
            None | Some(WorkflowPhase::Implement) => WorkflowPhase::Brainstorm,
            Some(current) => current.next(),
        };
        let mut transitions = Vec::new();
        loop {
            transitions.push(self.execute_phase(phase, requirements.clone()).await?);
            if phase == WorkflowPhase::Implement {
                break;
            }
            phase = phase.next();
        }
        METRICS.flush();
        Ok(transitions)
    }

    async fn attempt(
        &self,
        phase: WorkflowPhase,
        definition: &PhaseDefinition,
        requirements: &Value,
        snapshot: &WorkflowState,
        attempt: u32,
        started_at: DateTime<Utc>,
    ) -> WorkflowResult<Staged> {
        let clock = Instant::now();
        let cancel = self.cancellation();
        let input = json!({
            "requirements": requirements,
            "artifacts": snapshot.artifact_values(),
        });

        let outcome = self
            .agents
            .run_phase(phase, input, Some(self.material.clone()), &cancel)
            .await?;

        let violations = self
            .agents
            .enforcer()
            .violations_for_plan(&outcome.plan.id);
        let blocking = violations.iter().filter(|v| v.is_blocking()).count();
        let critical = outcome
            .report
            .critical_failures(self.agents.high_priority_threshold());

        if let Some(reason) = &outcome.report.aborted {
            return Err(WorkflowError::PhaseExecution {
                phase,
                reason: reason.to_string(),
                transient: !matches!(reason, AbortReason::Cancelled)
                    && outcome.report.has_transient_failure(),
            });
        }

        let merged = &outcome.synthesis.merged_output;
        let produced: BTreeMap<String, Artifact> = definition
            .produces
            .iter()
            .filter_map(|name| {
                merged.get(name).map(|content| {
                    let artifact = Artifact {
                        name: name.clone(),
                        phase,
                        content: content.clone(),
                        produced_at: Utc::now(),
                    };
                    (name.clone(), artifact)
                })
            })
            .collect();
        let mut visible = snapshot.artifacts.clone();
        visible.extend(produced.clone());

        let approvals = read(&self.approvals).clone();
        let env = CheckEnv {
            phase,
            state: snapshot,
            artifacts: &visible,
            synthesis: Some(&outcome.synthesis),
            approvals: &approvals,
            blocking_violations: blocking,
            critical_failures: critical,
        };

        let mut warnings = Vec::new();
        let (failed, optional) = failing_checks(&definition.exit_criteria, &env);
        for name in optional {
            warn!(phase = %phase, criterion = %name, "optional exit criterion not met");
            warnings.push(format!("exit criterion {name} not met"));
        }
        if let Some(criterion) = failed.into_iter().next() {
            if outcome.report.has_transient_failure() {
                return Err(WorkflowError::PhaseExecution {
                    phase,
                    reason: format!("exit criterion {criterion} failed after a transient task failure"),
                    transient: true,
                });
            }
            return Err(WorkflowError::ExitCriterionFailed { phase, criterion });
        }

        for gate in definition.gates.iter().filter(|g| !g.evaluate(&env)) {
            if gate.blocking {
                return Err(WorkflowError::ValidationGateFailed {
                    phase,
                    gate: gate.name.clone(),
                });
            }
            warn!(phase = %phase, gate = %gate.name, category = ?gate.category, "validation gate failed");
            warnings.push(format!("validation gate {} failed", gate.name));
        }
        warnings.extend(outcome.synthesis.warnings.iter().cloned());

        let carried: BTreeMap<String, Artifact> = definition
            .handoff
            .carry_artifacts
            .iter()
            .filter_map(|name| visible.get(name).map(|a| (name.clone(), a.clone())))
            .collect();
        let next = definition.handoff.next_phase;
        let context = if definition.handoff.embed_context {
            let profile = TaskProfile {
                id: format!("{phase}-to-{next}"),
                description: format!("handoff from {phase} to {next}"),
                tags: vec![next.to_string()],
                category: next.to_string(),
                ..TaskProfile::default()
            };
            let completed = outcome.report.completed_tasks(&outcome.plan);
            let prior = if completed.is_empty() {
                None
            } else {
                Some(PriorContext::Inherited(
                    self.agents.inheritance().inherit_from_chain(&profile, &completed)?,
                ))
            };
            Some(self.embedder.embed(
                &profile,
                &self.material,
                outcome.synthesis.confidence,
                prior.as_ref(),
            )?)
        } else {
            None
        };
        let handoff = HandoffPackage::build(phase, next, carried, context)?;
        handoff.verify()?;

        let mut transition = PhaseTransition::new(snapshot.current_phase, phase, started_at);
        transition.duration_ms = clock.elapsed().as_millis() as u64;
        transition.passed = true;
        transition.artifacts = produced.keys().cloned().collect();
        transition.context_preserved = handoff.context_preserved();
        transition.attempt = attempt;
        transition.warnings = warnings;

        Ok(Staged {
            transition,
            artifacts: produced,
            violations: violations.len() as u64,
            handoff,
        })
    }

    /// Write the ledger snapshot, the transition, then the handoff. A stored
    /// handoff therefore implies a stored passed transition. On failure the
    /// error comes back with the transition id if that record was written.
    async fn persist(&self, staged: &Staged) -> Result<(), (WorkflowError, Option<String>)> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let store = store.as_ref();
        let ledger = self.agents.enforcer().snapshot();
        put(store, RecordKind::Violations, &ledger.id, &ledger)
            .await
            .map_err(|e| (e, None))?;
        let transition = &staged.transition;
        put(store, RecordKind::Transition, &transition.id, transition)
            .await
            .map_err(|e| (e, None))?;
        put(store, RecordKind::Handoff, &staged.handoff.id, &staged.handoff)
            .await
            .map_err(|e| (e, Some(transition.id.clone())))?;
        Ok(())
    }

    fn commit(&self, phase: WorkflowPhase, staged: Staged) -> PhaseTransition {
        let Staged {
            transition,
            artifacts,
            violations,
            handoff,
        } = staged;
        {
            let mut state = write(&self.state);
            state.current_phase = Some(phase);
            state.artifacts.extend(artifacts);
            state.history.push(transition.clone());
            state.metrics.record_completion(phase, transition.duration_ms);
            state.metrics.record_handoff(transition.context_preserved);
            state.metrics.violations += violations;
        }
        *write(&self.last_handoff) = Some(handoff);

        obs::emit_phase_completed(phase, transition.duration_ms, transition.context_preserved);
        for observer in &self.observers {
            observer.on_phase_completed(&transition);
        }
        transition
    }

    /// Restore the snapshot's phase and artifacts, append the failed
    /// transition and count the rollback. Returns the restored phase.
    async fn rollback(
        &self,
        phase: WorkflowPhase,
        snapshot: &WorkflowState,
        error: &WorkflowError,
        attempts: u32,
        started_at: DateTime<Utc>,
        superseded: Option<String>,
    ) -> Option<WorkflowPhase> {
        let mut failed = PhaseTransition::new(snapshot.current_phase, phase, started_at);
        failed.duration_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
        failed.error = Some(error.to_string());
        failed.attempt = attempts;
        failed.supersedes = superseded;

        let (restored, rollbacks) = {
            let _span = obs::WorkflowSpan::enter(&snapshot.run_id, phase);
            let mut state = write(&self.state);
            state.current_phase = snapshot.current_phase;
            state.artifacts = snapshot.artifacts.clone();
            state.history.push(failed.clone());
            state.metrics.record_failure(phase);
            state.metrics.rollbacks += 1;
            (state.current_phase, state.metrics.rollbacks)
        };
        METRICS.inc_rollbacks();
        obs::emit_rollback(phase, restored, rollbacks);
        for observer in &self.observers {
            observer.on_rollback(phase, restored);
        }

        if let Some(store) = &self.store {
            persist_best_effort(store.as_ref(), RecordKind::Transition, &failed.id, &failed).await;
        }
        restored
    }
}

impl std::fmt::Debug for WorkflowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowOrchestrator")
            .field("agents", &self.agents)
            .field("policy", &self.policy)
            .field("observers", &self.observers.len())
            .finish()
    }
}

async fn put<T: Serialize>(
    store: &dyn AuditStore,
    kind: RecordKind,
    id: &str,
    payload: &T,
) -> WorkflowResult<()> {
    store.put(AuditRecord::new(kind, id, payload)?).await?;
    Ok(())
}

/// Write a record, logging instead of failing.
async fn persist_best_effort<T: Serialize>(
    store: &dyn AuditStore,
    kind: RecordKind,
    id: &str,
    payload: &T,
) {
    let result = match AuditRecord::new(kind, id, payload) {
        Ok(record) => store.put(record).await.map(|_| ()),
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        obs::emit_persist_error(kind.as_str(), id, &e);
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{ActionRequest, BoundaryEnforcer};
    use crate::workflow::definition::{Check, CheckKind};
    use crate::config::SchedulerConfig;
    use crate::domain::{AgentRole, RoleAction};
    use crate::orchestration::{AgentError, AgentResult, RoleAgent, RoleInvocation, RoleRegistry};
    use async_trait::async_trait;
    use phasegate_state::{MemoryAuditStore, StorageError, StorageResult, WriteOutcome};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Emits the artifact its action is responsible for.
    struct Stub {
        role: AgentRole,
        fail: Option<RoleAction>,
        flaky: Option<RoleAction>,
        transient_failures: AtomicU32,
        /// Records a violation with no plan on this enforcer while running,
        /// as a concurrent run sharing it would.
        neighbour: Option<Arc<BoundaryEnforcer>>,
    }

    fn artifact_of(action: RoleAction) -> &'static str {
        match action {
            RoleAction::ElicitRequirements => "requirements_brief",
            RoleAction::WriteSpecification => "specification",
            RoleAction::DefineAcceptanceCriteria => "acceptance_criteria",
            RoleAction::ShardSpecification => "shards",
            RoleAction::DecomposeTasks => "task_breakdown",
            RoleAction::DesignTests => "test_plan",
            RoleAction::WriteTests => "test_results",
            RoleAction::ImplementCode => "implementation",
            other => other.as_str(),
        }
    }

    #[async_trait]
    impl RoleAgent for Stub {
        fn role(&self) -> AgentRole {
            self.role
        }

        fn supported_actions(&self) -> Vec<RoleAction> {
            RoleAction::all()
                .into_iter()
                .filter(|a| a.role() == self.role)
                .collect()
        }

        async fn perform(&self, inv: RoleInvocation) -> AgentResult<Value> {
            if self.fail == Some(inv.action) {
                return Err(AgentError::Failed("stub failure".into()));
            }
            if let Some(enforcer) = &self.neighbour {
                enforcer.check(&ActionRequest::new(
                    AgentRole::ImplEngineer,
                    "write",
                    "specifications",
                ));
            }
            let flaky = self.flaky == Some(inv.action)
                && self
                    .transient_failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
            if flaky {
                return Err(AgentError::Transient("flaky".into()));
            }
            Ok(json!({ artifact_of(inv.action): format!("{} output", inv.task_id) }))
        }
    }

    fn registry(fail: Option<RoleAction>, flaky: Option<(RoleAction, u32)>) -> RoleRegistry {
        registry_with(fail, flaky, None)
    }

    fn registry_with(
        fail: Option<RoleAction>,
        flaky: Option<(RoleAction, u32)>,
        neighbour: Option<Arc<BoundaryEnforcer>>,
    ) -> RoleRegistry {
        AgentRole::all()
            .into_iter()
            .fold(RoleRegistry::new(), |registry, role| {
                let flaky = flaky.filter(|(a, _)| a.role() == role);
                registry
                    .with_agent(Arc::new(Stub {
                        role,
                        fail: fail.filter(|a| a.role() == role),
                        flaky: flaky.map(|(a, _)| a),
                        transient_failures: AtomicU32::new(flaky.map_or(0, |(_, n)| n)),
                        neighbour: neighbour.clone(),
                    }))
                    .unwrap()
            })
    }

    fn workflow(registry: RoleRegistry) -> WorkflowOrchestrator {
        workflow_on(registry, Arc::new(BoundaryEnforcer::standard()))
    }

    fn workflow_on(registry: RoleRegistry, enforcer: Arc<BoundaryEnforcer>) -> WorkflowOrchestrator {
        let agents = AgentOrchestrator::new(registry, enforcer, SchedulerConfig::default());
        let wf = WorkflowOrchestrator::new(agents, Arc::new(ContextEmbedder::default()));
        wf.start_workflow();
        wf
    }

    /// Fails the first `failures` puts of `kind`.
    struct FailingStore {
        inner: MemoryAuditStore,
        kind: RecordKind,
        failures: AtomicU32,
    }

    #[async_trait]
    impl AuditStore for FailingStore {
        async fn put(&self, record: AuditRecord) -> StorageResult<WriteOutcome> {
            if record.kind == self.kind
                && self
                    .failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(StorageError::Io(std::io::Error::other("disk full")));
            }
            self.inner.put(record).await
        }

        async fn get(&self, kind: RecordKind, id: &str) -> StorageResult<AuditRecord> {
            self.inner.get(kind, id).await
        }

        async fn contains(&self, kind: RecordKind, id: &str) -> StorageResult<bool> {
            self.inner.contains(kind, id).await
        }

        async fn list(&self, kind: RecordKind) -> StorageResult<Vec<AuditRecord>> {
            self.inner.list(kind).await
        }
    }

    async fn through_decompose(wf: &WorkflowOrchestrator) {
        for phase in [
            WorkflowPhase::Brainstorm,
            WorkflowPhase::Specify,
            WorkflowPhase::Shard,
            WorkflowPhase::Decompose,
        ] {
            wf.execute_phase(phase, json!({})).await.unwrap();
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl WorkflowObserver for Recorder {
        fn on_phase_started(&self, phase: WorkflowPhase, attempt: u32) {
            self.events.lock().unwrap().push(format!("start {phase} {attempt}"));
        }
        fn on_phase_completed(&self, t: &PhaseTransition) {
            self.events.lock().unwrap().push(format!("done {}", t.to));
        }
        fn on_rollback(&self, failed: WorkflowPhase, _restored: Option<WorkflowPhase>) {
            self.events.lock().unwrap().push(format!("rollback {failed}"));
        }
    }

    #[tokio::test]
    async fn test_brainstorm_commits_artifacts() {
        let wf = workflow(registry(None, None));
        let t = wf
            .execute_phase(WorkflowPhase::Brainstorm, json!({"goal": "todo app"}))
            .await
            .unwrap();
        assert!(t.passed);
        assert!(t.from.is_none());
        assert_eq!(t.artifacts, vec!["requirements_brief"]);
        assert!(t.context_preserved);

        let state = wf.state();
        assert_eq!(state.current_phase, Some(WorkflowPhase::Brainstorm));
        assert!(state.artifacts.contains_key("requirements_brief"));
        assert_eq!(state.metrics.completions(WorkflowPhase::Brainstorm), 1);
        let handoff = wf.last_handoff().unwrap();
        assert_eq!(handoff.to, WorkflowPhase::Specify);
        handoff.verify().unwrap();
    }

    #[tokio::test]
    async fn test_illegal_transition_has_no_side_effects() {
        let wf = workflow(registry(None, None));
        let err = wf
            .execute_phase(WorkflowPhase::Specify, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::IllegalTransition { from: None, to: WorkflowPhase::Specify }
        ));
        assert!(wf.state().history.is_empty());
    }

    #[tokio::test]
    async fn test_required_entry_condition_blocks() {
        let mut def = PhaseDefinition::standard(WorkflowPhase::Brainstorm);
        def.entry_conditions
            .push(Check::required("kickoff_approved", CheckKind::HumanApproval));
        let wf = workflow(registry(None, None)).with_definition(def);

        let err = wf
            .execute_phase(WorkflowPhase::Brainstorm, json!({}))
            .await
            .unwrap_err();
        match err {
            WorkflowError::EntryConditionsNotMet { failed, .. } => {
                assert_eq!(failed, vec!["kickoff_approved"])
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(wf.state().history.is_empty());

        wf.approve(WorkflowPhase::Brainstorm);
        wf.execute_phase(WorkflowPhase::Brainstorm, json!({}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_full_cycle_persists_records() {
        let store = Arc::new(MemoryAuditStore::new());
        let recorder = Arc::new(Recorder::default());
        let wf = workflow(registry(None, None))
            .with_store(store.clone())
            .with_observer(recorder.clone());

        let transitions = wf.run_cycle(json!({"goal": "todo app"})).await.unwrap();
        let phases: Vec<WorkflowPhase> = transitions.iter().map(|t| t.to).collect();
        assert_eq!(phases, WorkflowPhase::all().to_vec());

        let state = wf.state();
        assert_eq!(state.current_phase, Some(WorkflowPhase::Implement));
        assert_eq!(state.metrics.handoffs, 5);
        assert_eq!(state.metrics.rollbacks, 0);
        for name in ["specification", "shards", "test_plan", "implementation"] {
            assert!(state.artifacts.contains_key(name), "{name} missing");
        }

        assert_eq!(store.list(RecordKind::Transition).await.unwrap().len(), 5);
        assert_eq!(store.list(RecordKind::Handoff).await.unwrap().len(), 5);
        assert_eq!(store.list(RecordKind::Plan).await.unwrap().len(), 5);

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.first().map(String::as_str), Some("start brainstorm 1"));
        assert_eq!(events.last().map(String::as_str), Some("done implement"));
    }

    #[tokio::test]
    async fn test_permanent_failure_rolls_back() {
        let recorder = Arc::new(Recorder::default());
        let wf = workflow(registry(Some(RoleAction::ImplementCode), None))
            .with_observer(recorder.clone());
        through_decompose(&wf).await;

        let err = wf
            .execute_phase(WorkflowPhase::Implement, json!({}))
            .await
            .unwrap_err();
        match &err {
            WorkflowError::PhaseFailed {
                phase,
                attempts,
                restored,
                ..
            } => {
                assert_eq!(*phase, WorkflowPhase::Implement);
                assert_eq!(*attempts, 1);
                assert_eq!(*restored, Some(WorkflowPhase::Decompose));
            }
            other => panic!("unexpected {other:?}"),
        }

        let state = wf.state();
        assert_eq!(state.current_phase, Some(WorkflowPhase::Decompose));
        assert_eq!(state.metrics.rollbacks, 1);
        assert!(!state.artifacts.contains_key("test_results"));
        let last = state.last_transition().unwrap();
        assert!(!last.passed);
        assert!(last.error.is_some());
        assert!(recorder
            .events
            .lock()
            .unwrap()
            .contains(&"rollback implement".to_string()));
    }

    #[tokio::test]
    async fn test_transient_failure_retried() {
        let wf = workflow(registry(None, Some((RoleAction::ElicitRequirements, 1))));
        let t = wf
            .execute_phase(WorkflowPhase::Brainstorm, json!({}))
            .await
            .unwrap();
        assert_eq!(t.attempt, 2);
        assert_eq!(wf.state().metrics.rollbacks, 0);
    }

    #[tokio::test]
    async fn test_retries_exhausted_roll_back() {
        let wf = workflow(registry(None, Some((RoleAction::ElicitRequirements, 10))))
            .with_policy(FailurePolicy::new(1));
        let err = wf
            .execute_phase(WorkflowPhase::Brainstorm, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::PhaseFailed { attempts: 2, restored: None, .. }
        ));
        let state = wf.state();
        assert_eq!(state.current_phase, None);
        assert_eq!(state.metrics.rollbacks, 1);
    }

    #[tokio::test]
    async fn test_standard_task_failure_does_not_fail_phase() {
        let wf = workflow(registry(Some(RoleAction::ExploreAlternatives), None));
        let t = wf
            .execute_phase(WorkflowPhase::Brainstorm, json!({}))
            .await
            .unwrap();
        assert!(t.passed);
        assert_eq!(t.attempt, 1);
        assert!(t
            .warnings
            .iter()
            .any(|w| w == "exit criterion all_tasks_succeeded not met"));
        assert!(t.warnings.iter().any(|w| w.contains("stub failure")));
        assert_eq!(wf.state().metrics.rollbacks, 0);
    }

    #[tokio::test]
    async fn test_phase_plans_not_retained() {
        let wf = workflow(registry(None, None));
        wf.run_cycle(json!({})).await.unwrap();
        assert_eq!(wf.agents().retained_plans(), 0);
        assert!(wf.agents().has_embedder());
    }

    #[tokio::test]
    async fn test_handoff_context_inherits_phase_tasks() {
        let wf = workflow(registry(None, None));
        wf.execute_phase(WorkflowPhase::Brainstorm, json!({}))
            .await
            .unwrap();
        let context = wf.last_handoff().unwrap().context.unwrap();
        assert_eq!(context.inherited_from.len(), 3);
    }

    #[tokio::test]
    async fn test_handoff_write_failure_supersedes_transition() {
        let store = Arc::new(FailingStore {
            inner: MemoryAuditStore::new(),
            kind: RecordKind::Handoff,
            failures: AtomicU32::new(1),
        });
        let wf = workflow(registry(None, None)).with_store(store.clone());

        let err = wf
            .execute_phase(WorkflowPhase::Brainstorm, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::PhaseFailed { restored: None, .. }));
        assert!(store.list(RecordKind::Handoff).await.unwrap().is_empty());
        assert!(wf.last_handoff().is_none());
        assert_eq!(wf.state().current_phase, None);

        let transitions: Vec<PhaseTransition> = store
            .list(RecordKind::Transition)
            .await
            .unwrap()
            .iter()
            .map(|r| r.decode().unwrap())
            .collect();
        assert_eq!(transitions.len(), 2);
        let passed = transitions.iter().find(|t| t.passed).unwrap();
        let failed = transitions.iter().find(|t| !t.passed).unwrap();
        assert_eq!(failed.supersedes.as_deref(), Some(passed.id.as_str()));
    }

    #[tokio::test]
    async fn test_transition_write_failure_leaves_no_handoff() {
        let store = Arc::new(FailingStore {
            inner: MemoryAuditStore::new(),
            kind: RecordKind::Transition,
            failures: AtomicU32::new(1),
        });
        let wf = workflow(registry(None, None)).with_store(store.clone());

        wf.execute_phase(WorkflowPhase::Brainstorm, json!({}))
            .await
            .unwrap_err();
        assert!(store.list(RecordKind::Handoff).await.unwrap().is_empty());
        let transitions = store.list(RecordKind::Transition).await.unwrap();
        assert_eq!(transitions.len(), 1);
        let failed: PhaseTransition = transitions[0].decode().unwrap();
        assert!(!failed.passed);
        assert!(failed.supersedes.is_none());
        assert_eq!(wf.state().metrics.rollbacks, 1);
    }

    #[tokio::test]
    async fn test_violations_of_other_runs_not_counted() {
        let enforcer = Arc::new(BoundaryEnforcer::standard());
        let wf = workflow_on(
            registry_with(None, None, Some(Arc::clone(&enforcer))),
            Arc::clone(&enforcer),
        );
        through_decompose(&wf).await;
        let t = wf
            .execute_phase(WorkflowPhase::Implement, json!({}))
            .await
            .unwrap();
        assert!(t.passed);
        assert!(enforcer.violation_stats().blocking > 0);
        assert_eq!(
            wf.state().metrics.violations,
            enforcer
                .violations()
                .iter()
                .filter(|v| v.plan_id.is_some())
                .count() as u64
        );
    }

    #[tokio::test]
    async fn test_start_workflow_resets() {
        let wf = workflow(registry(None, None));
        wf.execute_phase(WorkflowPhase::Brainstorm, json!({}))
            .await
            .unwrap();
        let before = wf.state().run_id;
        let run_id = wf.start_workflow();
        assert_ne!(run_id, before);
        assert!(wf.state().current_phase.is_none());
        assert!(wf.last_handoff().is_none());
    }
}
