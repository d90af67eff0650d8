//! Role actions and the action-category vocabulary.
//!
//! Every action a role can perform is a variant of [`RoleAction`]. All
//! per-action facts (owning role, verb, target resource, dependencies,
//! parallel safety, priority class, duration estimate) are exhaustive
//! `match`es, so adding a variant without describing it fails to compile.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::phase::WorkflowPhase;
use super::role::AgentRole;

/// Coarse action vocabulary that capabilities and restrictions are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Read,
    Write,
    Delete,
    Execute,
    Review,
}

impl ActionCategory {
    /// Normalise a free-form verb into a category. Unknown verbs yield `None`.
    pub fn from_verb(verb: &str) -> Option<Self> {
        let verb = verb.trim().to_ascii_lowercase();
        let category = match verb.as_str() {
            "read" | "view" | "inspect" | "list" | "get" => ActionCategory::Read,
            "write" | "create" | "update" | "modify" | "edit" | "generate" | "implement"
            | "refactor" | "define" => ActionCategory::Write,
            "delete" | "remove" | "drop" => ActionCategory::Delete,
            "execute" | "run" | "test" => ActionCategory::Execute,
            "review" | "validate" | "approve" | "analyze" | "audit" | "assess" | "estimate" => {
                ActionCategory::Review
            }
            _ => return None,
        };
        Some(category)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionCategory::Read => "read",
            ActionCategory::Write => "write",
            ActionCategory::Delete => "delete",
            ActionCategory::Execute => "execute",
            ActionCategory::Review => "review",
        }
    }
}

impl std::fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scheduling priority class of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    /// Constitutional / compliance checks.
    Constitutional,
    /// Actions whose output the phase cannot complete without.
    PhaseCritical,
    Standard,
}

impl PriorityClass {
    /// Numeric priority on the 1-10 scale.
    pub fn value(&self) -> u8 {
        match self {
            PriorityClass::Constitutional => 10,
            PriorityClass::PhaseCritical => 8,
            PriorityClass::Standard => 5,
        }
    }
}

/// Every action a role implementation must expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleAction {
    // Facilitator
    ElicitRequirements,
    ExploreAlternatives,
    // SpecMaster
    WriteSpecification,
    DefineAcceptanceCriteria,
    // Architect
    ShardSpecification,
    MapDependencies,
    // TaskPlanner
    DecomposeTasks,
    EstimateEffort,
    // TestDesigner
    DesignTests,
    WriteTests,
    // ImplEngineer
    ImplementCode,
    RefactorCode,
    // QualityGuardian
    ValidateConstitution,
    ReviewQuality,
}

impl RoleAction {
    pub fn all() -> [RoleAction; 14] {
        use RoleAction::*;
        [
            ElicitRequirements,
            ExploreAlternatives,
            WriteSpecification,
            DefineAcceptanceCriteria,
            ShardSpecification,
            MapDependencies,
            DecomposeTasks,
            EstimateEffort,
            DesignTests,
            WriteTests,
            ImplementCode,
            RefactorCode,
            ValidateConstitution,
            ReviewQuality,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleAction::ElicitRequirements => "elicit_requirements",
            RoleAction::ExploreAlternatives => "explore_alternatives",
            RoleAction::WriteSpecification => "write_specification",
            RoleAction::DefineAcceptanceCriteria => "define_acceptance_criteria",
            RoleAction::ShardSpecification => "shard_specification",
            RoleAction::MapDependencies => "map_dependencies",
            RoleAction::DecomposeTasks => "decompose_tasks",
            RoleAction::EstimateEffort => "estimate_effort",
            RoleAction::DesignTests => "design_tests",
            RoleAction::WriteTests => "write_tests",
            RoleAction::ImplementCode => "implement_code",
            RoleAction::RefactorCode => "refactor_code",
            RoleAction::ValidateConstitution => "validate_constitution",
            RoleAction::ReviewQuality => "review_quality",
        }
    }

    /// The role that owns this action.
    pub fn role(&self) -> AgentRole {
        match self {
            RoleAction::ElicitRequirements | RoleAction::ExploreAlternatives => {
                AgentRole::Facilitator
            }
            RoleAction::WriteSpecification | RoleAction::DefineAcceptanceCriteria => {
                AgentRole::SpecMaster
            }
            RoleAction::ShardSpecification | RoleAction::MapDependencies => AgentRole::Architect,
            RoleAction::DecomposeTasks | RoleAction::EstimateEffort => AgentRole::TaskPlanner,
            RoleAction::DesignTests | RoleAction::WriteTests => AgentRole::TestDesigner,
            RoleAction::ImplementCode | RoleAction::RefactorCode => AgentRole::ImplEngineer,
            RoleAction::ValidateConstitution | RoleAction::ReviewQuality => {
                AgentRole::QualityGuardian
            }
        }
    }

    /// The verb checked by the boundary layer.
    pub fn verb(&self) -> &'static str {
        match self {
            RoleAction::ElicitRequirements => "create",
            RoleAction::ExploreAlternatives => "analyze",
            RoleAction::WriteSpecification => "write",
            RoleAction::DefineAcceptanceCriteria => "define",
            RoleAction::ShardSpecification => "create",
            RoleAction::MapDependencies => "analyze",
            RoleAction::DecomposeTasks => "create",
            RoleAction::EstimateEffort => "estimate",
            RoleAction::DesignTests => "create",
            RoleAction::WriteTests => "write",
            RoleAction::ImplementCode => "implement",
            RoleAction::RefactorCode => "refactor",
            RoleAction::ValidateConstitution => "validate",
            RoleAction::ReviewQuality => "review",
        }
    }

    /// The resource identifier the action touches.
    pub fn resource(&self) -> &'static str {
        match self {
            RoleAction::ElicitRequirements | RoleAction::ExploreAlternatives => "requirements",
            RoleAction::WriteSpecification => "specifications",
            RoleAction::DefineAcceptanceCriteria => "specifications/acceptance",
            RoleAction::ShardSpecification | RoleAction::MapDependencies => "shards",
            RoleAction::DecomposeTasks | RoleAction::EstimateEffort => "tasks",
            RoleAction::DesignTests => "tests/plan",
            RoleAction::WriteTests => "tests",
            RoleAction::ImplementCode | RoleAction::RefactorCode | RoleAction::ReviewQuality => {
                "src"
            }
            RoleAction::ValidateConstitution => "constitution",
        }
    }

    /// Actions that must have completed before this one may start.
    ///
    /// Dependencies on actions outside the current plan are dropped when the
    /// plan is built.
    pub fn depends_on(&self) -> &'static [RoleAction] {
        match self {
            RoleAction::DefineAcceptanceCriteria => &[RoleAction::WriteSpecification],
            RoleAction::MapDependencies => &[RoleAction::ShardSpecification],
            RoleAction::EstimateEffort | RoleAction::DesignTests => &[RoleAction::DecomposeTasks],
            RoleAction::ImplementCode => &[RoleAction::WriteTests],
            RoleAction::RefactorCode | RoleAction::ReviewQuality => &[RoleAction::ImplementCode],
            RoleAction::ElicitRequirements
            | RoleAction::ExploreAlternatives
            | RoleAction::WriteSpecification
            | RoleAction::ShardSpecification
            | RoleAction::DecomposeTasks
            | RoleAction::WriteTests
            | RoleAction::ValidateConstitution => &[],
        }
    }

    /// Whether the action may run concurrently with its ready siblings.
    pub fn is_parallel_safe(&self) -> bool {
        match self {
            RoleAction::ElicitRequirements
            | RoleAction::ExploreAlternatives
            | RoleAction::MapDependencies
            | RoleAction::EstimateEffort
            | RoleAction::DesignTests
            | RoleAction::RefactorCode
            | RoleAction::ValidateConstitution
            | RoleAction::ReviewQuality => true,
            RoleAction::WriteSpecification
            | RoleAction::DefineAcceptanceCriteria
            | RoleAction::ShardSpecification
            | RoleAction::DecomposeTasks
            | RoleAction::WriteTests
            | RoleAction::ImplementCode => false,
        }
    }

    pub fn priority_class(&self) -> PriorityClass {
        match self {
            RoleAction::ValidateConstitution | RoleAction::ReviewQuality => {
                PriorityClass::Constitutional
            }
            RoleAction::ElicitRequirements
            | RoleAction::WriteSpecification
            | RoleAction::DefineAcceptanceCriteria
            | RoleAction::ShardSpecification
            | RoleAction::DecomposeTasks
            | RoleAction::WriteTests
            | RoleAction::ImplementCode => PriorityClass::PhaseCritical,
            RoleAction::ExploreAlternatives
            | RoleAction::MapDependencies
            | RoleAction::EstimateEffort
            | RoleAction::DesignTests
            | RoleAction::RefactorCode => PriorityClass::Standard,
        }
    }

    /// Rough duration estimate in milliseconds, used for stage estimates and
    /// the critical path.
    pub fn estimated_ms(&self) -> u64 {
        match self {
            RoleAction::ElicitRequirements => 2_000,
            RoleAction::ExploreAlternatives => 1_500,
            RoleAction::WriteSpecification => 3_000,
            RoleAction::DefineAcceptanceCriteria => 1_500,
            RoleAction::ShardSpecification => 2_500,
            RoleAction::MapDependencies => 1_000,
            RoleAction::DecomposeTasks => 2_000,
            RoleAction::EstimateEffort => 800,
            RoleAction::DesignTests => 1_500,
            RoleAction::WriteTests => 3_000,
            RoleAction::ImplementCode => 5_000,
            RoleAction::RefactorCode => 2_000,
            RoleAction::ValidateConstitution => 1_000,
            RoleAction::ReviewQuality => 1_500,
        }
    }

    /// Actions owned by `role`, in declaration order.
    pub fn for_role(role: AgentRole) -> Vec<RoleAction> {
        RoleAction::all()
            .into_iter()
            .filter(|a| a.role() == role)
            .collect()
    }

    /// The static phase → role → action mapping used for plan construction.
    pub fn for_phase(phase: WorkflowPhase) -> &'static [RoleAction] {
        use RoleAction::*;
        match phase {
            WorkflowPhase::Brainstorm => {
                &[ElicitRequirements, ExploreAlternatives, ValidateConstitution]
            }
            WorkflowPhase::Specify => &[
                WriteSpecification,
                DefineAcceptanceCriteria,
                ValidateConstitution,
            ],
            WorkflowPhase::Shard => &[ShardSpecification, MapDependencies],
            WorkflowPhase::Decompose => &[DecomposeTasks, EstimateEffort, DesignTests],
            WorkflowPhase::Implement => &[
                WriteTests,
                ImplementCode,
                RefactorCode,
                ReviewQuality,
                ValidateConstitution,
            ],
        }
    }
}

impl std::fmt::Display for RoleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RoleAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoleAction::all()
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| DomainError::UnknownAction(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_verb_has_a_category() {
        for action in RoleAction::all() {
            assert!(
                ActionCategory::from_verb(action.verb()).is_some(),
                "verb {} of {action} is not categorised",
                action.verb()
            );
        }
    }

    #[test]
    fn test_verb_normalisation() {
        assert_eq!(ActionCategory::from_verb("Modify"), Some(ActionCategory::Write));
        assert_eq!(ActionCategory::from_verb("remove"), Some(ActionCategory::Delete));
        assert_eq!(ActionCategory::from_verb("run"), Some(ActionCategory::Execute));
        assert_eq!(ActionCategory::from_verb("approve"), Some(ActionCategory::Review));
        assert_eq!(ActionCategory::from_verb("teleport"), None);
    }

    #[test]
    fn test_every_role_owns_actions() {
        for role in AgentRole::all() {
            assert_eq!(RoleAction::for_role(role).len(), 2, "{role}");
        }
    }

    #[test]
    fn test_dependencies_stay_within_owner_phases() {
        for action in RoleAction::all() {
            for dep in action.depends_on() {
                assert_ne!(dep, &action, "{action} depends on itself");
            }
        }
    }

    #[test]
    fn test_phase_mapping_covers_every_action() {
        for action in RoleAction::all() {
            let mapped = WorkflowPhase::all()
                .into_iter()
                .any(|p| RoleAction::for_phase(p).contains(&action));
            assert!(mapped, "{action} is never planned");
        }
    }

    #[test]
    fn test_priority_values() {
        assert_eq!(RoleAction::ValidateConstitution.priority_class().value(), 10);
        assert_eq!(RoleAction::WriteSpecification.priority_class().value(), 8);
        assert_eq!(RoleAction::EstimateEffort.priority_class().value(), 5);
    }

    #[test]
    fn test_from_str_roundtrip() {
        for action in RoleAction::all() {
            assert_eq!(action.as_str().parse::<RoleAction>().unwrap(), action);
        }
    }
}
