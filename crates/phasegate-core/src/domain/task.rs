//! Units of work and their outcomes.

use serde::{Deserialize, Serialize};

use super::action::RoleAction;
use super::phase::WorkflowPhase;
use super::role::AgentRole;

/// How hard a task is expected to be. `Complex` tasks always receive the
/// extended context tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskComplexity {
    Simple,
    #[default]
    Standard,
    Complex,
}

/// One schedulable unit of work assigned to a role within a phase.
///
/// Immutable once the plan containing it has been staged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub role: AgentRole,
    pub action: RoleAction,
    pub resource: String,
    pub phase: WorkflowPhase,
    pub input: serde_json::Value,
    /// 1-10; tasks above the high-priority threshold abort the plan on failure.
    pub priority: u8,
    pub dependencies: Vec<String>,
    pub parallel_safe: bool,
    pub estimated_ms: u64,
    pub complexity: TaskComplexity,
    pub description: String,
    pub tags: Vec<String>,
    pub domain: Vec<String>,
}

impl Task {
    /// A task for `action` with every attribute taken from the action table.
    ///
    /// The id is the action name; dependencies are the action's declared
    /// dependencies by name.
    pub fn for_action(action: RoleAction, phase: WorkflowPhase, input: serde_json::Value) -> Self {
        Self {
            id: action.as_str().to_string(),
            role: action.role(),
            action,
            resource: action.resource().to_string(),
            phase,
            input,
            priority: action.priority_class().value(),
            dependencies: action
                .depends_on()
                .iter()
                .map(|d| d.as_str().to_string())
                .collect(),
            parallel_safe: action.is_parallel_safe(),
            estimated_ms: action.estimated_ms(),
            complexity: TaskComplexity::Standard,
            description: format!("{} {} during {}", action.verb(), action.resource(), phase),
            tags: vec![action.role().to_string(), phase.to_string()],
            domain: vec![action.resource().to_string()],
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_parallel_safe(mut self, parallel_safe: bool) -> Self {
        self.parallel_safe = parallel_safe;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 10);
        self
    }

    pub fn with_complexity(mut self, complexity: TaskComplexity) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_estimate_ms(mut self, estimated_ms: u64) -> Self {
        self.estimated_ms = estimated_ms;
        self
    }

    /// The descriptive view of this task used for context assembly.
    pub fn profile(&self) -> TaskProfile {
        TaskProfile {
            id: self.id.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            domain: self.domain.clone(),
            category: self.resource.clone(),
            complexity: self.complexity,
            dependencies: self.dependencies.clone(),
        }
    }
}

/// What the context layers need to know about a task.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskProfile {
    pub id: String,
    pub description: String,
    pub tags: Vec<String>,
    pub domain: Vec<String>,
    pub category: String,
    pub complexity: TaskComplexity,
    pub dependencies: Vec<String>,
}

impl TaskProfile {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            ..Self::default()
        }
    }
}

/// Outcome of one task attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub role: AgentRole,
    pub action: RoleAction,
    pub priority: u8,
    pub success: bool,
    pub output: serde_json::Value,
    pub elapsed_ms: u64,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    /// 0-100.
    pub confidence: f64,
    pub recommendations: Vec<String>,
    /// The failure may succeed on retry (timeout or transient agent error).
    pub transient: bool,
}

impl TaskResult {
    /// A successful result. Confidence comes from an explicit numeric
    /// `confidence` field in the output, otherwise 100 minus 10 per warning.
    pub fn succeeded(
        task: &Task,
        output: serde_json::Value,
        elapsed_ms: u64,
        warnings: Vec<String>,
    ) -> Self {
        let confidence = output
            .get("confidence")
            .and_then(|c| c.as_f64())
            .unwrap_or_else(|| 100.0 - 10.0 * warnings.len() as f64)
            .clamp(0.0, 100.0);
        let recommendations = output
            .get("recommendations")
            .and_then(|r| r.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            task_id: task.id.clone(),
            role: task.role,
            action: task.action,
            priority: task.priority,
            success: true,
            output,
            elapsed_ms,
            warnings,
            errors: Vec::new(),
            confidence,
            recommendations,
            transient: false,
        }
    }

    pub fn failed(
        task: &Task,
        error: impl Into<String>,
        elapsed_ms: u64,
        warnings: Vec<String>,
        transient: bool,
    ) -> Self {
        Self {
            task_id: task.id.clone(),
            role: task.role,
            action: task.action,
            priority: task.priority,
            success: false,
            output: serde_json::Value::Null,
            elapsed_ms,
            warnings,
            errors: vec![error.into()],
            confidence: 0.0,
            recommendations: Vec::new(),
            transient,
        }
    }
}
