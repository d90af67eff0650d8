//! Role agents and the dispatch table that selects them.
//!
//! Each role is served by exactly one [`RoleAgent`]. An agent must declare
//! every action its role owns; registration fails otherwise, so dispatch
//! never falls through to a missing handler.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::SmartContext;
use crate::domain::{AgentRole, RoleAction, Task, WorkflowPhase};

use super::error::{AgentResult, OrchestrationError, OrchestrationResult};

/// Everything an agent receives for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleInvocation {
    pub task_id: String,
    pub action: RoleAction,
    pub phase: WorkflowPhase,
    pub input: Value,
    pub context: Option<SmartContext>,
}

impl RoleInvocation {
    pub fn for_task(task: &Task, context: Option<SmartContext>) -> Self {
        Self {
            task_id: task.id.clone(),
            action: task.action,
            phase: task.phase,
            input: task.input.clone(),
            context,
        }
    }
}

/// The worker behind one role.
#[async_trait]
pub trait RoleAgent: Send + Sync {
    fn role(&self) -> AgentRole;

    /// Actions this agent handles. Must cover `RoleAction::for_role(self.role())`.
    fn supported_actions(&self) -> Vec<RoleAction>;

    /// Perform `invocation.action`, returning its output payload.
    async fn perform(&self, invocation: RoleInvocation) -> AgentResult<Value>;
}

/// Dispatch table keyed by role.
#[derive(Clone, Default)]
pub struct RoleRegistry {
    agents: BTreeMap<AgentRole, Arc<dyn RoleAgent>>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `agent` for its role, replacing any previous agent.
    pub fn register(&mut self, agent: Arc<dyn RoleAgent>) -> OrchestrationResult<()> {
        let role = agent.role();
        let supported = agent.supported_actions();

        if let Some(foreign) = supported.iter().find(|a| a.role() != role) {
            return Err(OrchestrationError::ForeignAction {
                agent: role,
                role: foreign.role(),
            });
        }
        let missing: Vec<RoleAction> = RoleAction::for_role(role)
            .into_iter()
            .filter(|a| !supported.contains(a))
            .collect();
        if !missing.is_empty() {
            return Err(OrchestrationError::IncompleteAgent { role, missing });
        }

        self.agents.insert(role, agent);
        Ok(())
    }

    pub fn with_agent(mut self, agent: Arc<dyn RoleAgent>) -> OrchestrationResult<Self> {
        self.register(agent)?;
        Ok(self)
    }

    /// The agent that handles `action`.
    pub fn resolve(&self, action: RoleAction) -> OrchestrationResult<Arc<dyn RoleAgent>> {
        let role = action.role();
        let agent = self
            .agents
            .get(&role)
            .ok_or(OrchestrationError::NoAgent { role })?;
        if !agent.supported_actions().contains(&action) {
            return Err(OrchestrationError::UnsupportedAction { role, action });
        }
        Ok(Arc::clone(agent))
    }

    pub fn roles(&self) -> Vec<AgentRole> {
        self.agents.keys().copied().collect()
    }

    /// Roles with no registered agent.
    pub fn missing_roles(&self) -> Vec<AgentRole> {
        AgentRole::all()
            .into_iter()
            .filter(|r| !self.agents.contains_key(r))
            .collect()
    }
}

impl std::fmt::Debug for RoleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleRegistry")
            .field("roles", &self.roles())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Partial;

    #[async_trait]
    impl RoleAgent for Partial {
        fn role(&self) -> AgentRole {
            AgentRole::SpecMaster
        }
        fn supported_actions(&self) -> Vec<RoleAction> {
            vec![RoleAction::WriteSpecification]
        }
        async fn perform(&self, _: RoleInvocation) -> AgentResult<Value> {
            Ok(json!({}))
        }
    }

    struct Full;

    #[async_trait]
    impl RoleAgent for Full {
        fn role(&self) -> AgentRole {
            AgentRole::Architect
        }
        fn supported_actions(&self) -> Vec<RoleAction> {
            RoleAction::for_role(AgentRole::Architect)
        }
        async fn perform(&self, inv: RoleInvocation) -> AgentResult<Value> {
            Ok(json!({ "action": inv.action.as_str() }))
        }
    }

    struct Thief;

    #[async_trait]
    impl RoleAgent for Thief {
        fn role(&self) -> AgentRole {
            AgentRole::Architect
        }
        fn supported_actions(&self) -> Vec<RoleAction> {
            let mut actions = RoleAction::for_role(AgentRole::Architect);
            actions.push(RoleAction::ImplementCode);
            actions
        }
        async fn perform(&self, _: RoleInvocation) -> AgentResult<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_incomplete_agent_rejected() {
        let err = RoleRegistry::new().with_agent(Arc::new(Partial)).unwrap_err();
        match err {
            OrchestrationError::IncompleteAgent { role, missing } => {
                assert_eq!(role, AgentRole::SpecMaster);
                assert_eq!(missing, vec![RoleAction::DefineAcceptanceCriteria]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_foreign_action_rejected() {
        let err = RoleRegistry::new().with_agent(Arc::new(Thief)).unwrap_err();
        assert!(matches!(err, OrchestrationError::ForeignAction { .. }));
    }

    #[test]
    fn test_resolve() {
        let registry = RoleRegistry::new().with_agent(Arc::new(Full)).unwrap();
        assert!(registry.resolve(RoleAction::MapDependencies).is_ok());
        assert!(matches!(
            registry.resolve(RoleAction::WriteTests),
            Err(OrchestrationError::NoAgent {
                role: AgentRole::TestDesigner
            })
        ));
        assert_eq!(registry.roles(), vec![AgentRole::Architect]);
        assert_eq!(registry.missing_roles().len(), 6);
    }
}
