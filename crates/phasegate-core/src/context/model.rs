//! Context source material and the three-tier `SmartContext` bundle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Importance of a requirement or acceptance criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    /// High and critical items are always part of the core tier.
    pub fn is_mandatory(&self) -> bool {
        matches!(self, Priority::High | Priority::Critical)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub id: String,
    #[serde(default)]
    pub requirement_id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub priority: Priority,
}

/// One-line summary of a finished upstream task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencySummary {
    pub task_id: String,
    pub summary: String,
}

/// A reusable solution pattern with its track record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub domain: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// 0-1.
    pub success_rate: f64,
    #[serde(default)]
    pub use_count: u32,
    pub last_used: DateTime<Utc>,
    /// 1 (simplest) to 10.
    #[serde(default = "default_complexity")]
    pub complexity: u8,
}

fn default_complexity() -> u8 {
    5
}

/// A recorded decision with its rationale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub title: String,
    pub rationale: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub domain: Vec<String>,
    /// 0-1.
    pub confidence: f64,
    /// 0-1.
    pub impact: f64,
    pub made_at: DateTime<Utc>,
}

impl Decision {
    pub fn text(&self) -> String {
        format!("{}: {}", self.title, self.rationale)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeCase {
    pub id: String,
    pub description: String,
    /// 0-1.
    pub severity: f64,
    /// 0-1.
    pub likelihood: f64,
}

/// A similar implementation worth showing to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub id: String,
    pub description: String,
    pub snippet: String,
    /// 0-1.
    pub relevance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalNote {
    pub id: String,
    pub text: String,
    /// 0-1.
    pub relevance: f64,
}

/// Everything a context may be assembled from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceMaterial {
    pub requirements: Vec<Requirement>,
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    pub dependency_summaries: Vec<DependencySummary>,
    /// Always included verbatim.
    pub governance_rules: Vec<String>,
    pub patterns: Vec<Pattern>,
    pub decisions: Vec<Decision>,
    pub edge_cases: Vec<EdgeCase>,
    pub examples: Vec<Example>,
    pub technical_notes: Vec<TechnicalNote>,
    /// Pointers (paths, ids, URLs). Never inlined.
    pub references: Vec<String>,
}

/// What a [`ContextItem`] holds. Extended kinds are listed in trim order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    // core
    TaskMetadata,
    Requirement,
    AcceptanceCriterion,
    DependencySummary,
    GovernanceRule,
    // extended, dropped first to last
    Example,
    EdgeCase,
    TechnicalNote,
    Pattern,
    Decision,
    // reference
    Reference,
}

impl ItemKind {
    /// Position in the trim order; lower is dropped first. `None` for kinds
    /// that are never trimmed.
    pub fn trim_rank(&self) -> Option<u8> {
        match self {
            ItemKind::Example => Some(0),
            ItemKind::EdgeCase => Some(1),
            ItemKind::TechnicalNote => Some(2),
            ItemKind::Pattern => Some(3),
            ItemKind::Decision => Some(4),
            ItemKind::TaskMetadata
            | ItemKind::Requirement
            | ItemKind::AcceptanceCriterion
            | ItemKind::DependencySummary
            | ItemKind::GovernanceRule
            | ItemKind::Reference => None,
        }
    }
}

/// One rendered piece of context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub id: String,
    pub kind: ItemKind,
    pub text: String,
    /// Ranking score within its kind; higher survives trimming longer.
    pub score: f64,
}

impl ContextItem {
    pub fn new(id: impl Into<String>, kind: ItemKind, text: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            kind,
            text: text.into(),
            score,
        }
    }

    /// Rendered size in characters: the `- [id] text` line and its newline.
    pub fn size(&self) -> usize {
        ITEM_OVERHEAD + self.id.chars().count() + self.text.chars().count()
    }

    fn render_into(&self, out: &mut String) {
        out.push_str("- [");
        out.push_str(&self.id);
        out.push_str("] ");
        out.push_str(&self.text);
        out.push('\n');
    }
}

/// Characters `render` adds around an item's id and text.
const ITEM_OVERHEAD: usize = "- [] \n".len();

const CORE_HEADER: &str = "## core\n";
const EXTENDED_HEADER: &str = "## extended\n";
const REFERENCE_HEADER: &str = "## reference\n";

/// Rendered size of one tier, header included. Empty tiers render nothing.
fn tier_size(header: &str, items: &[ContextItem]) -> usize {
    if items.is_empty() {
        return 0;
    }
    header.chars().count() + items.iter().map(ContextItem::size).sum::<usize>()
}

/// Reasons the extended tier was included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtendedTrigger {
    LowConfidence,
    ComplexTask,
    ManyDependencies,
    NoMatchingPattern,
}

/// The three-tier, size-bounded context built for one task.
///
/// # Invariants
///
/// `render().chars().count() == total_size() <= max_size`. Core and reference
/// items are never removed by trimming; only extended items are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartContext {
    pub task_id: String,
    pub core: Vec<ContextItem>,
    pub extended: Vec<ContextItem>,
    pub reference: Vec<ContextItem>,
    pub max_size: usize,
    pub triggers: Vec<ExtendedTrigger>,
    /// Ids of extended items dropped to fit the budget.
    pub trimmed: Vec<String>,
    /// Ids of tasks whose context was merged in.
    pub inherited_from: Vec<String>,
    /// Final estimate, 0-100.
    pub confidence: f64,
}

impl SmartContext {
    pub fn core_size(&self) -> usize {
        tier_size(CORE_HEADER, &self.core)
    }

    pub fn extended_size(&self) -> usize {
        tier_size(EXTENDED_HEADER, &self.extended)
    }

    pub fn reference_size(&self) -> usize {
        tier_size(REFERENCE_HEADER, &self.reference)
    }

    /// Rendered size in characters. This is what the budget bounds.
    pub fn total_size(&self) -> usize {
        self.core_size() + self.extended_size() + self.reference_size()
    }

    pub fn has_extended(&self) -> bool {
        !self.extended.is_empty()
    }

    pub fn items_of(&self, kind: ItemKind) -> impl Iterator<Item = &ContextItem> {
        self.core
            .iter()
            .chain(self.extended.iter())
            .chain(self.reference.iter())
            .filter(move |i| i.kind == kind)
    }

    /// Human-readable tiered text, one item per line.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.total_size());
        for (header, items) in [
            (CORE_HEADER, &self.core),
            (EXTENDED_HEADER, &self.extended),
            (REFERENCE_HEADER, &self.reference),
        ] {
            if items.is_empty() {
                continue;
            }
            out.push_str(header);
            for item in items {
                item.render_into(&mut out);
            }
        }
        out
    }
}
