//! Per-task context: three-tier assembly under a size budget, and
//! inheritance of decisions, patterns and insights from finished tasks.

pub mod embedder;
pub mod error;
pub mod inheritance;
pub mod model;
pub mod text;

pub use embedder::{fit_to_budget, ContextEmbedder, PriorContext};
pub use error::{ContextError, ContextResult};
pub use inheritance::{
    CompletedTask, ContextInheritance, InheritedContext, InheritedDecision, Insight,
    InsightClassifier, InsightKind, KeywordClassifier, TextSimilarity, TokenJaccard,
};
pub use model::{
    AcceptanceCriterion, ContextItem, Decision, DependencySummary, EdgeCase, Example,
    ExtendedTrigger, ItemKind, Pattern, Priority, Requirement, SmartContext, SourceMaterial,
    TechnicalNote,
};
