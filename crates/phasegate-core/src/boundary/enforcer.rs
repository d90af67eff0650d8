//! Boundary enforcement: restrictions, then capabilities, then phase.
//!
//! The enforcer owns three pieces of shared state, each behind its own lock
//! so parallel tasks can check concurrently:
//! - role definitions (`RwLock<HashMap>`), mutable at runtime via
//!   [`BoundaryEnforcer::update_role`]
//! - the permission cache keyed by the full request tuple, guarded by a
//!   generation counter so an evaluation that raced a definition change is
//!   never cached
//! - the violation ledger, a capped ring buffer

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::BoundaryConfig;
use crate::domain::{ActionCategory, AgentRole, WorkflowPhase};
use crate::metrics::METRICS;
use crate::obs;

use super::definition::{EnforcementLevel, RoleDefinition};
use super::error::{BoundaryError, BoundaryResult};

/// The unit checked by the enforcer. Constructed per call, never persisted
/// on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionRequest {
    pub role: AgentRole,
    /// Free-form verb, normalised through [`ActionCategory::from_verb`].
    pub action: String,
    pub resource: String,
    pub phase: Option<WorkflowPhase>,
}

impl ActionRequest {
    pub fn new(role: AgentRole, action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            role,
            action: action.into(),
            resource: resource.into(),
            phase: None,
        }
    }

    pub fn in_phase(mut self, phase: WorkflowPhase) -> Self {
        self.phase = Some(phase);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Blocking,
    Warning,
}

impl From<EnforcementLevel> for ViolationSeverity {
    fn from(level: EnforcementLevel) -> Self {
        match level {
            EnforcementLevel::Blocking => ViolationSeverity::Blocking,
            EnforcementLevel::Warning => ViolationSeverity::Warning,
        }
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViolationReason {
    Restricted { restriction: String },
    MissingCapability,
    PhaseNotAssigned { phase: WorkflowPhase },
    UnknownRole,
}

/// A denied request as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryViolation {
    pub id: Uuid,
    pub request: ActionRequest,
    pub reason: ViolationReason,
    pub message: String,
    pub severity: ViolationSeverity,
    pub occurred_at: DateTime<Utc>,
    /// Plan the request was made for, when checked on behalf of one.
    #[serde(default)]
    pub plan_id: Option<String>,
}

impl BoundaryViolation {
    fn new(
        request: &ActionRequest,
        reason: ViolationReason,
        message: String,
        severity: ViolationSeverity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request: request.clone(),
            reason,
            message,
            severity,
            occurred_at: Utc::now(),
            plan_id: None,
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == ViolationSeverity::Blocking
    }
}

impl std::fmt::Display for BoundaryViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} may not {} {}: {}",
            self.request.role, self.request.action, self.request.resource, self.message
        )
    }
}

/// Result of [`BoundaryEnforcer::check`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryCheck {
    pub allowed: bool,
    pub violation: Option<BoundaryViolation>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl BoundaryCheck {
    fn allow(warnings: Vec<String>) -> Self {
        Self {
            allowed: true,
            violation: None,
            warnings,
            suggestions: Vec::new(),
        }
    }

    fn deny(violation: BoundaryViolation, suggestions: Vec<String>) -> Self {
        Self {
            allowed: false,
            warnings: vec![violation.message.clone()],
            violation: Some(violation),
            suggestions,
        }
    }

    pub fn severity(&self) -> Option<ViolationSeverity> {
        self.violation.as_ref().map(|v| v.severity)
    }
}

/// Aggregate ledger counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViolationStats {
    pub total: usize,
    pub blocking: usize,
    pub warning: usize,
    pub by_role: BTreeMap<AgentRole, usize>,
    /// Entries dropped because the ledger was full.
    pub evicted: u64,
}

/// Serialisable copy of the ledger for the audit store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationLedgerSnapshot {
    pub id: String,
    pub taken_at: DateTime<Utc>,
    pub capacity: usize,
    pub strict: bool,
    pub stats: ViolationStats,
    pub violations: Vec<BoundaryViolation>,
}

#[derive(Debug, Default)]
struct Ledger {
    entries: VecDeque<BoundaryViolation>,
    evicted: u64,
}

/// Gatekeeper for every (role, action, resource, phase) request.
pub struct BoundaryEnforcer {
    roles: RwLock<HashMap<AgentRole, RoleDefinition>>,
    strict: AtomicBool,
    cache: RwLock<HashMap<ActionRequest, BoundaryCheck>>,
    /// Bumped under the cache write lock whenever roles or strictness change.
    generation: AtomicU64,
    ledger: Mutex<Ledger>,
    capacity: usize,
}

impl BoundaryEnforcer {
    /// Build an enforcer over `definitions`. Two definitions for the same
    /// role are rejected.
    pub fn new(
        definitions: impl IntoIterator<Item = RoleDefinition>,
        config: &BoundaryConfig,
    ) -> BoundaryResult<Self> {
        let mut roles = HashMap::new();
        for def in definitions {
            let role = def.role;
            if roles.insert(role, def).is_some() {
                return Err(BoundaryError::DuplicateRole {
                    role: role.to_string(),
                });
            }
        }
        Ok(Self {
            roles: RwLock::new(roles),
            strict: AtomicBool::new(config.strict),
            cache: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            ledger: Mutex::new(Ledger::default()),
            capacity: config.ledger_capacity.max(1),
        })
    }

    /// The standard role profiles with default settings.
    pub fn standard() -> Self {
        Self {
            roles: RwLock::new(
                RoleDefinition::standard_set()
                    .into_iter()
                    .map(|d| (d.role, d))
                    .collect(),
            ),
            strict: AtomicBool::new(true),
            cache: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            ledger: Mutex::new(Ledger::default()),
            capacity: BoundaryConfig::default().ledger_capacity,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict.load(Ordering::SeqCst)
    }

    /// Switch strict mode. Any change clears the whole permission cache.
    pub fn set_strict(&self, strict: bool) {
        let previous = self.strict.swap(strict, Ordering::SeqCst);
        if previous != strict {
            let mut cache = self.write_cache();
            self.generation.fetch_add(1, Ordering::SeqCst);
            cache.clear();
            debug!(strict, "boundary strictness changed; cache cleared");
        }
    }

    /// Replace (or add) a role definition and drop that role's cache entries.
    pub fn update_role(&self, definition: RoleDefinition) {
        let role = definition.role;
        write(&self.roles).insert(role, definition);
        let mut cache = self.write_cache();
        self.generation.fetch_add(1, Ordering::SeqCst);
        cache.retain(|request, _| request.role != role);
        debug!(role = %role, "role definition updated; cache entries invalidated");
    }

    pub fn role_definition(&self, role: AgentRole) -> Option<RoleDefinition> {
        read(&self.roles).get(&role).cloned()
    }

    pub fn cache_len(&self) -> usize {
        read(&self.cache).len()
    }

    /// Evaluate a request. Denials are always appended to the ledger, including
    /// denials served from the cache.
    pub fn check(&self, request: &ActionRequest) -> BoundaryCheck {
        self.check_for(request, None)
    }

    /// Like [`check`](Self::check), tagging any violation with `plan_id`.
    pub fn check_for(&self, request: &ActionRequest, plan_id: Option<&str>) -> BoundaryCheck {
        let cached = read(&self.cache).get(request).cloned();
        let mut check = match cached {
            Some(mut hit) => {
                METRICS.inc_permission_cache_hits();
                if let Some(v) = hit.violation.as_mut() {
                    v.id = Uuid::new_v4();
                    v.occurred_at = Utc::now();
                }
                hit
            }
            None => {
                let generation = self.generation.load(Ordering::SeqCst);
                let fresh = self.evaluate(request);
                self.cache_insert(request, &fresh, generation);
                fresh
            }
        };

        if let Some(violation) = check.violation.as_mut() {
            violation.plan_id = plan_id.map(str::to_string);
            self.record(violation.clone());
        }
        check
    }

    /// Cache `check` unless roles or strictness changed since `generation`
    /// was read.
    fn cache_insert(&self, request: &ActionRequest, check: &BoundaryCheck, generation: u64) {
        let mut cache = self.write_cache();
        if self.generation.load(Ordering::SeqCst) == generation {
            cache.insert(request.clone(), check.clone());
        } else {
            debug!(role = %request.role, "definitions changed during evaluation; not cached");
        }
    }

    /// Like [`check`](Self::check) but returns `Err` for blocking denials.
    /// Warning-level denials are logged and returned as `Ok`.
    pub fn enforce(&self, request: &ActionRequest) -> BoundaryResult<BoundaryCheck> {
        self.enforce_for(request, None)
    }

    /// [`enforce`](Self::enforce) on behalf of a plan.
    pub fn enforce_for(
        &self,
        request: &ActionRequest,
        plan_id: Option<&str>,
    ) -> BoundaryResult<BoundaryCheck> {
        let check = self.check_for(request, plan_id);
        match &check.violation {
            Some(v) if v.is_blocking() => Err(BoundaryError::Blocked(Box::new(v.clone()))),
            Some(v) => {
                warn!(role = %request.role, resource = %request.resource, "{}", v.message);
                Ok(check)
            }
            None => Ok(check),
        }
    }

    fn evaluate(&self, request: &ActionRequest) -> BoundaryCheck {
        let roles = read(&self.roles);
        let Some(def) = roles.get(&request.role) else {
            let violation = BoundaryViolation::new(
                request,
                ViolationReason::UnknownRole,
                format!("no role definition loaded for {}", request.role),
                ViolationSeverity::Blocking,
            );
            return BoundaryCheck::deny(violation, Vec::new());
        };

        let category = ActionCategory::from_verb(&request.action);

        // 1. Restrictions: a deny-list that always wins.
        if let Some(restriction) = def.restriction_for(category, &request.resource) {
            let violation = BoundaryViolation::new(
                request,
                ViolationReason::Restricted {
                    restriction: restriction.name.clone(),
                },
                format!("restricted by {}: {}", restriction.name, restriction.reason),
                restriction.level.into(),
            );
            let suggestions = suggest_roles(&roles, category, &request.resource);
            return BoundaryCheck::deny(violation, suggestions);
        }

        // 2. Capabilities.
        let mut warnings = Vec::new();
        if !def.has_capability(category, &request.resource) {
            let what = match category {
                Some(c) => format!("no matching capability for {c} on {}", request.resource),
                None => format!("unrecognised action verb '{}'", request.action),
            };
            if self.is_strict() {
                let violation = BoundaryViolation::new(
                    request,
                    ViolationReason::MissingCapability,
                    what,
                    ViolationSeverity::Blocking,
                );
                let suggestions = suggest_roles(&roles, category, &request.resource);
                return BoundaryCheck::deny(violation, suggestions);
            }
            warnings.push(format!("{what} (allowed in non-strict mode)"));
        }

        // 3. Phase assignment: a warning, never a hard block.
        if let Some(phase) = request.phase {
            if !def.phases.includes(phase) {
                let violation = BoundaryViolation::new(
                    request,
                    ViolationReason::PhaseNotAssigned { phase },
                    format!("{} is not assigned to phase {phase}", request.role),
                    ViolationSeverity::Warning,
                );
                let suggestions = roles
                    .values()
                    .filter(|d| d.phases.includes(phase) && d.role != request.role)
                    .map(|d| format!("{} is assigned to {phase}", d.role))
                    .collect();
                let mut check = BoundaryCheck::deny(violation, suggestions);
                check.warnings.extend(warnings);
                return check;
            }
        }

        BoundaryCheck::allow(warnings)
    }

    fn record(&self, violation: BoundaryViolation) {
        METRICS.inc_boundary_denials();
        obs::emit_boundary_violation(
            violation.request.role,
            &violation.request.action,
            &violation.request.resource,
            violation.is_blocking(),
        );
        let mut ledger = lock(&self.ledger);
        if ledger.entries.len() >= self.capacity {
            ledger.entries.pop_front();
            ledger.evicted += 1;
        }
        ledger.entries.push_back(violation);
    }

    /// Ledger contents, oldest first.
    pub fn violations(&self) -> Vec<BoundaryViolation> {
        lock(&self.ledger).entries.iter().cloned().collect()
    }

    pub fn violations_for(&self, role: AgentRole) -> Vec<BoundaryViolation> {
        lock(&self.ledger)
            .entries
            .iter()
            .filter(|v| v.request.role == role)
            .cloned()
            .collect()
    }

    pub fn violation_stats(&self) -> ViolationStats {
        let ledger = lock(&self.ledger);
        let mut stats = ViolationStats {
            evicted: ledger.evicted,
            ..ViolationStats::default()
        };
        for v in &ledger.entries {
            stats.total += 1;
            match v.severity {
                ViolationSeverity::Blocking => stats.blocking += 1,
                ViolationSeverity::Warning => stats.warning += 1,
            }
            *stats.by_role.entry(v.request.role).or_default() += 1;
        }
        stats
    }

    /// Violations recorded on behalf of `plan_id` still in the ledger.
    pub fn violations_for_plan(&self, plan_id: &str) -> Vec<BoundaryViolation> {
        lock(&self.ledger)
            .entries
            .iter()
            .filter(|v| v.plan_id.as_deref() == Some(plan_id))
            .cloned()
            .collect()
    }

    /// Total violations ever recorded, including evicted ones.
    pub fn violations_recorded(&self) -> u64 {
        let ledger = lock(&self.ledger);
        ledger.evicted + ledger.entries.len() as u64
    }

    pub fn snapshot(&self) -> ViolationLedgerSnapshot {
        ViolationLedgerSnapshot {
            id: Uuid::new_v4().to_string(),
            taken_at: Utc::now(),
            capacity: self.capacity,
            strict: self.is_strict(),
            stats: self.violation_stats(),
            violations: self.violations(),
        }
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, HashMap<ActionRequest, BoundaryCheck>> {
        write(&self.cache)
    }
}

/// Roles whose profile would permit the request.
fn suggest_roles(
    roles: &HashMap<AgentRole, RoleDefinition>,
    category: Option<ActionCategory>,
    resource: &str,
) -> Vec<String> {
    let mut allowed: Vec<AgentRole> = roles
        .values()
        .filter(|d| {
            d.has_capability(category, resource)
                && d.restriction_for(category, resource).is_none()
        })
        .map(|d| d.role)
        .collect();
    allowed.sort();
    allowed
        .into_iter()
        .map(|role| format!("delegate to {role}"))
        .collect()
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::definition::Restriction;

    fn enforcer() -> BoundaryEnforcer {
        BoundaryEnforcer::standard()
    }

    #[test]
    fn test_spec_master_writes_specifications() {
        let e = enforcer();
        let check = e.check(&ActionRequest::new(
            AgentRole::SpecMaster,
            "write",
            "specifications",
        ));
        assert!(check.allowed);
        assert!(check.violation.is_none());
        assert!(e.violations().is_empty());
    }

    #[test]
    fn test_impl_engineer_blocked_from_specifications() {
        let e = enforcer();
        let req = ActionRequest::new(AgentRole::ImplEngineer, "write", "specifications");
        let check = e.check(&req);
        assert!(!check.allowed);
        assert_eq!(check.severity(), Some(ViolationSeverity::Blocking));
        assert!(check
            .suggestions
            .iter()
            .any(|s| s.contains("spec_master")));

        let err = e.enforce(&req).unwrap_err();
        let v = err.violation().unwrap();
        assert_eq!(
            v.reason,
            ViolationReason::Restricted {
                restriction: "no_spec_modification".into()
            }
        );
    }

    #[test]
    fn test_restriction_overrides_capability() {
        let def = RoleDefinition::new(AgentRole::ImplEngineer, "both")
            .with_capability(ActionCategory::Write, &["*"])
            .with_restriction(Restriction::new(
                "locked",
                &[ActionCategory::Write],
                &["vault"],
                EnforcementLevel::Blocking,
                "locked",
            ));
        let e = BoundaryEnforcer::new([def], &BoundaryConfig::default()).unwrap();
        assert!(!e.check(&ActionRequest::new(AgentRole::ImplEngineer, "write", "vault")).allowed);
        assert!(e.check(&ActionRequest::new(AgentRole::ImplEngineer, "write", "other")).allowed);
    }

    #[test]
    fn test_missing_capability_strict_vs_lenient() {
        let e = enforcer();
        let req = ActionRequest::new(AgentRole::Facilitator, "execute", "tests");
        let strict = e.check(&req);
        assert!(!strict.allowed);
        assert_eq!(strict.violation.unwrap().reason, ViolationReason::MissingCapability);

        e.set_strict(false);
        let lenient = e.check(&req);
        assert!(lenient.allowed);
        assert!(lenient.warnings[0].contains("non-strict"));
    }

    #[test]
    fn test_phase_mismatch_is_warning() {
        let e = enforcer();
        let req = ActionRequest::new(AgentRole::ImplEngineer, "write", "src")
            .in_phase(WorkflowPhase::Brainstorm);
        let check = e.check(&req);
        assert!(!check.allowed);
        assert_eq!(check.severity(), Some(ViolationSeverity::Warning));
        // Warning-level denials do not raise.
        assert!(e.enforce(&req).is_ok());
    }

    #[test]
    fn test_warning_restriction_denies_without_raising() {
        let e = enforcer();
        let req = ActionRequest::new(AgentRole::TestDesigner, "modify", "src/lib.rs");
        let check = e.enforce(&req).unwrap();
        assert!(!check.allowed);
        assert_eq!(check.severity(), Some(ViolationSeverity::Warning));
    }

    #[test]
    fn test_unknown_role_definition_blocks() {
        let e = BoundaryEnforcer::new(Vec::new(), &BoundaryConfig::default()).unwrap();
        let err = e
            .enforce(&ActionRequest::new(AgentRole::Architect, "read", "shards"))
            .unwrap_err();
        assert_eq!(err.violation().unwrap().reason, ViolationReason::UnknownRole);
    }

    #[test]
    fn test_cache_hit_still_records_violation() {
        let e = enforcer();
        let req = ActionRequest::new(AgentRole::ImplEngineer, "write", "specifications");
        e.check(&req);
        e.check(&req);
        assert_eq!(e.cache_len(), 1);
        let violations = e.violations();
        assert_eq!(violations.len(), 2);
        assert_ne!(violations[0].id, violations[1].id);
    }

    #[test]
    fn test_update_role_invalidates_only_that_role() {
        let e = enforcer();
        e.check(&ActionRequest::new(AgentRole::ImplEngineer, "write", "src"));
        e.check(&ActionRequest::new(AgentRole::SpecMaster, "write", "specifications"));
        assert_eq!(e.cache_len(), 2);

        let relaxed = RoleDefinition::new(AgentRole::ImplEngineer, "relaxed")
            .with_capability(ActionCategory::Write, &["*"]);
        e.update_role(relaxed);
        assert_eq!(e.cache_len(), 1);

        let check = e.check(&ActionRequest::new(
            AgentRole::ImplEngineer,
            "write",
            "specifications",
        ));
        assert!(check.allowed);
    }

    #[test]
    fn test_evaluation_racing_update_is_not_cached() {
        let e = enforcer();
        let req = ActionRequest::new(AgentRole::ImplEngineer, "write", "specifications");
        let generation = e.generation.load(Ordering::SeqCst);
        let stale = e.evaluate(&req);
        assert!(!stale.allowed);

        let relaxed = RoleDefinition::new(AgentRole::ImplEngineer, "relaxed")
            .with_capability(ActionCategory::Write, &["*"]);
        e.update_role(relaxed);
        e.cache_insert(&req, &stale, generation);
        assert_eq!(e.cache_len(), 0);
        assert!(e.check(&req).allowed);
    }

    #[test]
    fn test_concurrent_checks_see_role_update() {
        let e = std::sync::Arc::new(enforcer());
        let req = ActionRequest::new(AgentRole::ImplEngineer, "write", "specifications");
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let e = std::sync::Arc::clone(&e);
                let req = req.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        e.check(&req);
                    }
                })
            })
            .collect();
        let relaxed = RoleDefinition::new(AgentRole::ImplEngineer, "relaxed")
            .with_capability(ActionCategory::Write, &["*"]);
        e.update_role(relaxed);
        for worker in workers {
            worker.join().unwrap();
        }
        assert!(e.check(&req).allowed);
    }

    #[test]
    fn test_violations_tagged_with_plan() {
        let e = enforcer();
        let req = ActionRequest::new(AgentRole::ImplEngineer, "write", "specifications");
        e.check_for(&req, Some("plan-a"));
        e.check_for(&req, Some("plan-b"));
        e.check(&req);
        assert_eq!(e.violations_for_plan("plan-a").len(), 1);
        assert_eq!(e.violations_for_plan("plan-b").len(), 1);
        assert_eq!(e.violations().len(), 3);
        assert!(e.violations()[2].plan_id.is_none());
    }

    #[test]
    fn test_set_strict_clears_cache_only_on_change() {
        let e = enforcer();
        e.check(&ActionRequest::new(AgentRole::ImplEngineer, "write", "src"));
        e.set_strict(true);
        assert_eq!(e.cache_len(), 1);
        e.set_strict(false);
        assert_eq!(e.cache_len(), 0);
    }

    #[test]
    fn test_ledger_is_capped() {
        let config = BoundaryConfig {
            strict: true,
            ledger_capacity: 3,
        };
        let e = BoundaryEnforcer::new(RoleDefinition::standard_set(), &config).unwrap();
        for i in 0..5 {
            e.check(&ActionRequest::new(
                AgentRole::ImplEngineer,
                "write",
                format!("specifications/{i}"),
            ));
        }
        let violations = e.violations();
        assert_eq!(violations.len(), 3);
        assert_eq!(violations[0].request.resource, "specifications/2");
        let stats = e.violation_stats();
        assert_eq!(stats.evicted, 2);
        assert_eq!(e.violations_recorded(), 5);
    }

    #[test]
    fn test_stats_and_snapshot() {
        let e = enforcer();
        e.check(&ActionRequest::new(AgentRole::ImplEngineer, "write", "specifications"));
        e.check(&ActionRequest::new(AgentRole::TestDesigner, "write", "src"));
        let stats = e.violation_stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.blocking, 1);
        assert_eq!(stats.warning, 1);
        assert_eq!(stats.by_role.get(&AgentRole::ImplEngineer), Some(&1));
        assert_eq!(e.violations_for(AgentRole::TestDesigner).len(), 1);

        let snap = e.snapshot();
        assert_eq!(snap.violations.len(), 2);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["stats"]["blocking"], 1);
    }

    #[test]
    fn test_duplicate_definitions_rejected() {
        let defs = vec![
            RoleDefinition::standard(AgentRole::Architect),
            RoleDefinition::standard(AgentRole::Architect),
        ];
        assert!(matches!(
            BoundaryEnforcer::new(defs, &BoundaryConfig::default()),
            Err(BoundaryError::DuplicateRole { .. })
        ));
    }
}
