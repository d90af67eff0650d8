//! Runtime configuration loaded from TOML.
//!
//! Every section has serde defaults, so an empty document is a valid
//! configuration:
//!
//! ```toml
//! [boundary]
//! strict = true
//! ledger_capacity = 1000
//!
//! [scheduler]
//! max_concurrent = 4
//! task_timeout_ms = 30000
//! high_priority_threshold = 7
//! strategy = "hierarchy"
//!
//! [context]
//! max_context_size = 8000
//!
//! [workflow]
//! max_retries = 1
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::orchestration::ConflictStrategy;

/// Errors produced while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Boundary enforcement settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Deny requests that match no capability. When `false` they are allowed
    /// with a warning.
    pub strict: bool,
    /// Violation ledger size; oldest entries are dropped past this.
    pub ledger_capacity: usize,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            strict: true,
            ledger_capacity: 1000,
        }
    }
}

/// Plan execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_concurrent: usize,
    pub task_timeout_ms: u64,
    /// Failures of tasks with priority strictly above this abort the plan.
    pub high_priority_threshold: u8,
    pub strategy: ConflictStrategy,
}

impl SchedulerConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            task_timeout_ms: 30_000,
            high_priority_threshold: 7,
            strategy: ConflictStrategy::Hierarchy,
        }
    }
}

/// Context assembly settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Upper bound on the rendered `SmartContext`, in characters.
    pub max_context_size: usize,
    /// Confidence (0-100) below which the extended tier is added.
    pub confidence_threshold: f64,
    /// Dependency count above which the extended tier is added.
    pub dependency_threshold: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_size: 8000,
            confidence_threshold: 85.0,
            dependency_threshold: 3,
        }
    }
}

/// Cross-task inheritance settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InheritanceConfig {
    /// Minimum relevance (0-1) for a decision to be inherited.
    pub relevance_threshold: f64,
    /// Patterns must have a success rate strictly above this.
    pub pattern_success_bar: f64,
    pub max_depth: u32,
    pub cache_ttl_secs: u64,
    pub max_decisions: usize,
    pub max_patterns: usize,
    pub max_insights: usize,
    /// Cache size cap; the oldest entry is evicted once it is reached.
    pub max_cache_entries: usize,
    /// Bumped whenever inheritance rules change; part of the cache key.
    pub version: u32,
}

impl InheritanceConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for InheritanceConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: 0.5,
            pattern_success_bar: 0.7,
            max_depth: 3,
            cache_ttl_secs: 3600,
            max_decisions: 10,
            max_patterns: 5,
            max_insights: 15,
            max_cache_entries: 1024,
            version: 1,
        }
    }
}

/// Workflow driver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Retries allowed for a phase whose failure is transient.
    pub max_retries: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self { max_retries: 1 }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhasegateConfig {
    pub boundary: BoundaryConfig,
    pub scheduler: SchedulerConfig,
    pub context: ContextConfig,
    pub inheritance: InheritanceConfig,
    pub workflow: WorkflowConfig,
}

impl PhasegateConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: PhasegateConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> ConfigResult<()> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }

        if self.boundary.ledger_capacity == 0 {
            return Err(invalid("boundary.ledger_capacity", "must be at least 1"));
        }
        if self.scheduler.max_concurrent == 0 {
            return Err(invalid("scheduler.max_concurrent", "must be at least 1"));
        }
        if self.scheduler.task_timeout_ms == 0 {
            return Err(invalid("scheduler.task_timeout_ms", "must be at least 1"));
        }
        if !(1..=10).contains(&self.scheduler.high_priority_threshold) {
            return Err(invalid(
                "scheduler.high_priority_threshold",
                "must be within 1..=10",
            ));
        }
        if self.context.max_context_size == 0 {
            return Err(invalid("context.max_context_size", "must be at least 1"));
        }
        if !(0.0..=100.0).contains(&self.context.confidence_threshold) {
            return Err(invalid(
                "context.confidence_threshold",
                "must be within 0..=100",
            ));
        }
        if !(0.0..=1.0).contains(&self.inheritance.relevance_threshold) {
            return Err(invalid(
                "inheritance.relevance_threshold",
                "must be within 0..=1",
            ));
        }
        if !(0.0..=1.0).contains(&self.inheritance.pattern_success_bar) {
            return Err(invalid(
                "inheritance.pattern_success_bar",
                "must be within 0..=1",
            ));
        }
        if self.inheritance.max_depth == 0 {
            return Err(invalid("inheritance.max_depth", "must be at least 1"));
        }
        Ok(())
    }
}
