//! Core role vocabulary: `AgentRole` and its precedence.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// The seven logical worker types that act inside a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Facilitator,
    SpecMaster,
    Architect,
    TaskPlanner,
    TestDesigner,
    ImplEngineer,
    QualityGuardian,
}

impl AgentRole {
    pub fn all() -> [AgentRole; 7] {
        [
            AgentRole::Facilitator,
            AgentRole::SpecMaster,
            AgentRole::Architect,
            AgentRole::TaskPlanner,
            AgentRole::TestDesigner,
            AgentRole::ImplEngineer,
            AgentRole::QualityGuardian,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Facilitator => "facilitator",
            AgentRole::SpecMaster => "spec_master",
            AgentRole::Architect => "architect",
            AgentRole::TaskPlanner => "task_planner",
            AgentRole::TestDesigner => "test_designer",
            AgentRole::ImplEngineer => "impl_engineer",
            AgentRole::QualityGuardian => "quality_guardian",
        }
    }

    /// Default authority order used for hierarchy conflict resolution.
    ///
    /// Lower value wins. The quality/compliance role outranks everyone;
    /// the facilitator ranks last.
    pub fn precedence(&self) -> u8 {
        match self {
            AgentRole::QualityGuardian => 0,
            AgentRole::SpecMaster => 1,
            AgentRole::Architect => 2,
            AgentRole::TaskPlanner => 3,
            AgentRole::TestDesigner => 4,
            AgentRole::ImplEngineer => 5,
            AgentRole::Facilitator => 6,
        }
    }

    /// All roles sorted by [`AgentRole::precedence`], highest authority first.
    pub fn default_precedence() -> Vec<AgentRole> {
        let mut roles = AgentRole::all().to_vec();
        roles.sort_by_key(|r| r.precedence());
        roles
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentRole::all()
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| DomainError::UnknownRole(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_snake_case() {
        assert_eq!(AgentRole::SpecMaster.to_string(), "spec_master");
        assert_eq!(AgentRole::ImplEngineer.to_string(), "impl_engineer");
    }

    #[test]
    fn test_serde_matches_display() {
        for role in AgentRole::all() {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{role}\""));
        }
    }

    #[test]
    fn test_default_precedence_puts_quality_first() {
        let order = AgentRole::default_precedence();
        assert_eq!(order.first(), Some(&AgentRole::QualityGuardian));
        assert_eq!(order.last(), Some(&AgentRole::Facilitator));
        assert_eq!(order.len(), 7);
    }

    #[test]
    fn test_from_str() {
        assert_eq!(
            "quality_guardian".parse::<AgentRole>().unwrap(),
            AgentRole::QualityGuardian
        );
        assert_eq!(
            "coder".parse::<AgentRole>().unwrap_err(),
            DomainError::UnknownRole("coder".into())
        );
    }
}
