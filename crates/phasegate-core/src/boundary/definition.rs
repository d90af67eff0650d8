//! Role definitions: capabilities, restrictions and phase assignments.

use serde::{Deserialize, Serialize};

use crate::domain::{ActionCategory, AgentRole, WorkflowPhase};

use super::pattern::{patterns, ResourcePattern};

/// How a restriction is enforced when it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementLevel {
    /// Deny and raise from `enforce`.
    Blocking,
    /// Deny, record, and let `enforce` return normally.
    Warning,
}

/// An allowed (action category, resource patterns) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub category: ActionCategory,
    pub resources: Vec<ResourcePattern>,
}

impl Capability {
    pub fn new(category: ActionCategory, resources: &[&str]) -> Self {
        Self {
            category,
            resources: patterns(resources),
        }
    }

    pub fn matches(&self, category: ActionCategory, resource: &str) -> bool {
        self.category == category && self.resources.iter().any(|p| p.matches(resource))
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let resources: Vec<String> = self.resources.iter().map(|r| r.to_string()).collect();
        write!(f, "{}:{}", self.category, resources.join(","))
    }
}

/// A denied (action categories, resource patterns) pair. Always overrides
/// capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restriction {
    pub name: String,
    pub denied: Vec<ActionCategory>,
    pub resources: Vec<ResourcePattern>,
    pub level: EnforcementLevel,
    pub reason: String,
}

impl Restriction {
    pub fn new(
        name: impl Into<String>,
        denied: &[ActionCategory],
        resources: &[&str],
        level: EnforcementLevel,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            denied: denied.to_vec(),
            resources: patterns(resources),
            level,
            reason: reason.into(),
        }
    }

    /// An unrecognised verb (`category == None`) is never matched by a
    /// restriction; it falls through to the capability check.
    pub fn matches(&self, category: Option<ActionCategory>, resource: &str) -> bool {
        match category {
            Some(c) => self.denied.contains(&c) && self.resources.iter().any(|p| p.matches(resource)),
            None => false,
        }
    }
}

/// Phases a role may act in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseScope {
    /// The "all" wildcard.
    All,
    Only(Vec<WorkflowPhase>),
}

impl PhaseScope {
    pub fn includes(&self, phase: WorkflowPhase) -> bool {
        match self {
            PhaseScope::All => true,
            PhaseScope::Only(phases) => phases.contains(&phase),
        }
    }
}

/// Static permission profile of one role. Loaded once and shared read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub role: AgentRole,
    pub description: String,
    pub capabilities: Vec<Capability>,
    pub restrictions: Vec<Restriction>,
    pub depends_on: Vec<AgentRole>,
    pub phases: PhaseScope,
}

impl RoleDefinition {
    /// An empty definition: no capabilities, every phase.
    pub fn new(role: AgentRole, description: impl Into<String>) -> Self {
        Self {
            role,
            description: description.into(),
            capabilities: Vec::new(),
            restrictions: Vec::new(),
            depends_on: Vec::new(),
            phases: PhaseScope::All,
        }
    }

    pub fn with_capability(mut self, category: ActionCategory, resources: &[&str]) -> Self {
        self.capabilities.push(Capability::new(category, resources));
        self
    }

    pub fn with_restriction(mut self, restriction: Restriction) -> Self {
        self.restrictions.push(restriction);
        self
    }

    pub fn with_dependency(mut self, role: AgentRole) -> Self {
        self.depends_on.push(role);
        self
    }

    pub fn with_phases(mut self, phases: &[WorkflowPhase]) -> Self {
        self.phases = PhaseScope::Only(phases.to_vec());
        self
    }

    /// First restriction matching the request, in declaration order.
    pub fn restriction_for(
        &self,
        category: Option<ActionCategory>,
        resource: &str,
    ) -> Option<&Restriction> {
        self.restrictions
            .iter()
            .find(|r| r.matches(category, resource))
    }

    pub fn has_capability(&self, category: Option<ActionCategory>, resource: &str) -> bool {
        match category {
            Some(c) => self.capabilities.iter().any(|cap| cap.matches(c, resource)),
            None => false,
        }
    }

    /// The default profile for `role`.
    pub fn standard(role: AgentRole) -> Self {
        use ActionCategory::*;
        use EnforcementLevel::*;

        let no_code = || {
            Restriction::new(
                "no_code_modification",
                &[Write, Delete],
                &["src", "src/*", "tests", "tests/*"],
                Blocking,
                "only implementation and test roles may change code",
            )
        };
        let no_spec = || {
            Restriction::new(
                "no_spec_modification",
                &[Write, Delete],
                &["specifications", "specifications/*"],
                Blocking,
                "specifications are owned by spec_master",
            )
        };

        match role {
            AgentRole::Facilitator => RoleDefinition::new(role, "elicits and explores requirements")
                .with_capability(Read, &["*"])
                .with_capability(Write, &["requirements", "requirements/*", "brainstorm/*"])
                .with_capability(Review, &["requirements", "requirements/*"])
                .with_restriction(no_code())
                .with_restriction(no_spec())
                .with_phases(&[WorkflowPhase::Brainstorm]),
            AgentRole::SpecMaster => RoleDefinition::new(role, "writes specifications and acceptance criteria")
                .with_capability(Read, &["*"])
                .with_capability(Write, &["specifications", "specifications/*"])
                .with_capability(Review, &["requirements", "requirements/*"])
                .with_restriction(no_code())
                .with_dependency(AgentRole::Facilitator)
                .with_phases(&[WorkflowPhase::Brainstorm, WorkflowPhase::Specify]),
            AgentRole::Architect => RoleDefinition::new(role, "shards specifications and maps dependencies")
                .with_capability(Read, &["*"])
                .with_capability(Write, &["shards", "shards/*", "architecture/*"])
                .with_capability(Review, &["specifications", "specifications/*", "shards", "shards/*"])
                .with_restriction(no_spec())
                .with_restriction(no_code())
                .with_dependency(AgentRole::SpecMaster)
                .with_phases(&[WorkflowPhase::Shard]),
            AgentRole::TaskPlanner => RoleDefinition::new(role, "decomposes shards into tasks")
                .with_capability(Read, &["*"])
                .with_capability(Write, &["tasks", "tasks/*"])
                .with_capability(Review, &["tasks", "tasks/*", "shards", "shards/*"])
                .with_restriction(no_spec())
                .with_restriction(no_code())
                .with_dependency(AgentRole::Architect)
                .with_phases(&[WorkflowPhase::Decompose]),
            AgentRole::TestDesigner => RoleDefinition::new(role, "designs and writes tests")
                .with_capability(Read, &["*"])
                .with_capability(Write, &["tests", "tests/*"])
                .with_capability(Execute, &["tests", "tests/*"])
                .with_restriction(no_spec())
                .with_restriction(Restriction::new(
                    "no_src_modification",
                    &[Write, Delete],
                    &["src", "src/*"],
                    Warning,
                    "test designers should not change production code",
                ))
                .with_dependency(AgentRole::TaskPlanner)
                .with_phases(&[WorkflowPhase::Decompose, WorkflowPhase::Implement]),
            AgentRole::ImplEngineer => RoleDefinition::new(role, "implements code against tests")
                .with_capability(Read, &["*"])
                .with_capability(Write, &["src", "src/*"])
                .with_capability(Execute, &["tests", "tests/*", "src", "src/*"])
                .with_restriction(no_spec())
                .with_restriction(Restriction::new(
                    "no_test_weakening",
                    &[Delete],
                    &["tests", "tests/*"],
                    Blocking,
                    "tests may not be deleted to make code pass",
                ))
                .with_dependency(AgentRole::TestDesigner)
                .with_phases(&[WorkflowPhase::Implement]),
            AgentRole::QualityGuardian => RoleDefinition::new(role, "validates constitution and quality")
                .with_capability(Read, &["*"])
                .with_capability(Review, &["*"])
                .with_restriction(Restriction::new(
                    "review_only",
                    &[Write, Delete],
                    &["*"],
                    Warning,
                    "quality_guardian reviews but does not author",
                )),
        }
    }

    /// One standard definition per role.
    pub fn standard_set() -> Vec<RoleDefinition> {
        AgentRole::all().into_iter().map(Self::standard).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RoleAction;

    #[test]
    fn test_standard_set_covers_all_roles() {
        let set = RoleDefinition::standard_set();
        assert_eq!(set.len(), AgentRole::all().len());
    }

    #[test]
    fn test_spec_master_may_write_specifications() {
        let def = RoleDefinition::standard(AgentRole::SpecMaster);
        let write = ActionCategory::from_verb("write");
        assert!(def.has_capability(write, "specifications"));
        assert!(def.restriction_for(write, "specifications").is_none());
    }

    #[test]
    fn test_impl_engineer_spec_restriction_is_blocking() {
        let def = RoleDefinition::standard(AgentRole::ImplEngineer);
        let r = def
            .restriction_for(ActionCategory::from_verb("write"), "specifications")
            .unwrap();
        assert_eq!(r.name, "no_spec_modification");
        assert_eq!(r.level, EnforcementLevel::Blocking);
    }

    #[test]
    fn test_unknown_verb_matches_nothing() {
        let def = RoleDefinition::standard(AgentRole::ImplEngineer);
        assert!(!def.has_capability(None, "src"));
        assert!(def.restriction_for(None, "specifications").is_none());
    }

    #[test]
    fn test_standard_profiles_permit_own_actions() {
        for action in RoleAction::all() {
            let def = RoleDefinition::standard(action.role());
            let category = ActionCategory::from_verb(action.verb());
            assert!(
                def.restriction_for(category, action.resource()).is_none(),
                "{action} is restricted for its own role"
            );
            assert!(
                def.has_capability(category, action.resource()),
                "{action} lacks a capability"
            );
        }
    }

    #[test]
    fn test_standard_profiles_assign_planned_phases() {
        for phase in WorkflowPhase::all() {
            for action in RoleAction::for_phase(phase) {
                let def = RoleDefinition::standard(action.role());
                assert!(def.phases.includes(phase), "{action} not assigned to {phase}");
            }
        }
    }

    #[test]
    fn test_phase_scope_all_wildcard() {
        let def = RoleDefinition::standard(AgentRole::QualityGuardian);
        assert_eq!(def.phases, PhaseScope::All);
        assert!(def.phases.includes(WorkflowPhase::Shard));
    }

    #[test]
    fn test_capability_display() {
        let cap = Capability::new(ActionCategory::Write, &["tests", "tests/*"]);
        assert_eq!(cap.to_string(), "write:tests,tests/*");
    }
}
