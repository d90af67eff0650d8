//! Resolution of conflicting role outputs.
//!
//! A decision point is a top-level key of a task output object. When two or
//! more roles produce different values for the same key, the plan's
//! [`CoordinationDescriptor`] decides which value survives.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::domain::{AgentRole, TaskResult};

/// Output keys that describe a result rather than decide anything.
const META_KEYS: &[&str] = &["confidence", "recommendations"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Highest-precedence role wins.
    #[default]
    Hierarchy,
    /// Most common value wins; ties fall back to hierarchy.
    Voting,
    /// The quality guardian decides; otherwise the conflict stays open.
    Escalation,
    /// Structural union of all values.
    Merge,
}

/// How a plan reconciles its roles' outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinationDescriptor {
    pub strategy: ConflictStrategy,
    /// Highest authority first.
    pub precedence: Vec<AgentRole>,
}

impl CoordinationDescriptor {
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self {
            strategy,
            precedence: AgentRole::default_precedence(),
        }
    }

    pub fn with_precedence(mut self, precedence: Vec<AgentRole>) -> Self {
        self.precedence = precedence;
        self
    }

    /// Position in the precedence list; unlisted roles rank last.
    pub fn rank(&self, role: AgentRole) -> usize {
        self.precedence
            .iter()
            .position(|r| *r == role)
            .unwrap_or(self.precedence.len())
    }
}

impl Default for CoordinationDescriptor {
    fn default() -> Self {
        Self::new(ConflictStrategy::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub role: AgentRole,
    pub task_id: String,
    pub value: Value,
}

/// One decision point on which roles disagreed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub key: String,
    pub strategy: ConflictStrategy,
    pub candidates: Vec<Candidate>,
    /// `None` when the conflict could not be settled.
    pub resolution: Option<Value>,
    /// Role whose value was chosen. `None` for merges and open conflicts.
    pub winner: Option<AgentRole>,
    pub escalated: bool,
}

impl Conflict {
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

/// A value replaced by a later result of the same role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Superseded {
    pub key: String,
    pub earlier: Candidate,
    pub later_task: String,
}

impl std::fmt::Display for Superseded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} from {} superseded by {} ({})",
            self.key, self.earlier.task_id, self.later_task, self.earlier.role
        )
    }
}

/// Merged outputs plus every conflict met on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub merged: Map<String, Value>,
    pub conflicts: Vec<Conflict>,
    /// Same-role values that differed and were overwritten.
    pub superseded: Vec<Superseded>,
}

/// Merge the outputs of successful results.
///
/// Within one role the later result wins; a differing earlier value is
/// reported in [`Resolution::superseded`]. Keys produced by a single role,
/// or by several roles with equal values, are taken as is.
pub fn resolve(results: &[TaskResult], descriptor: &CoordinationDescriptor) -> Resolution {
    let mut points: BTreeMap<String, BTreeMap<AgentRole, Candidate>> = BTreeMap::new();
    let mut superseded = Vec::new();
    for result in results.iter().filter(|r| r.success) {
        let Some(object) = result.output.as_object() else {
            continue;
        };
        for (key, value) in object {
            if META_KEYS.contains(&key.as_str()) {
                continue;
            }
            let previous = points.entry(key.clone()).or_default().insert(
                result.role,
                Candidate {
                    role: result.role,
                    task_id: result.task_id.clone(),
                    value: value.clone(),
                },
            );
            if let Some(earlier) = previous.filter(|p| &p.value != value) {
                warn!(
                    key = %key,
                    role = %result.role,
                    earlier_task = %earlier.task_id,
                    later_task = %result.task_id,
                    "same-role value overwritten"
                );
                superseded.push(Superseded {
                    key: key.clone(),
                    earlier,
                    later_task: result.task_id.clone(),
                });
            }
        }
    }

    let mut resolution = Resolution {
        superseded,
        ..Resolution::default()
    };
    for (key, by_role) in points {
        let mut candidates: Vec<Candidate> = by_role.into_values().collect();
        candidates.sort_by_key(|c| descriptor.rank(c.role));

        let first = &candidates[0].value;
        if candidates.iter().all(|c| &c.value == first) {
            resolution.merged.insert(key, first.clone());
            continue;
        }

        let conflict = settle(key, candidates, descriptor);
        if let Some(value) = &conflict.resolution {
            resolution.merged.insert(conflict.key.clone(), value.clone());
        }
        resolution.conflicts.push(conflict);
    }
    resolution
}

/// `candidates` must be sorted by rank, highest authority first.
fn settle(key: String, candidates: Vec<Candidate>, descriptor: &CoordinationDescriptor) -> Conflict {
    let strategy = descriptor.strategy;
    let (resolution, winner, escalated) = match strategy {
        ConflictStrategy::Hierarchy => {
            let top = &candidates[0];
            (Some(top.value.clone()), Some(top.role), false)
        }
        ConflictStrategy::Voting => {
            let mut tally: Vec<(&Value, usize)> = Vec::new();
            for c in &candidates {
                match tally.iter_mut().find(|(v, _)| *v == &c.value) {
                    Some((_, n)) => *n += 1,
                    None => tally.push((&c.value, 1)),
                }
            }
            let best = tally.iter().map(|(_, n)| *n).max().unwrap_or(0);
            // candidates are rank-ordered, so the first holder of a
            // top-voted value is the hierarchy tie-break
            let pick = candidates
                .iter()
                .find(|c| tally.iter().any(|(v, n)| *n == best && *v == &c.value));
            (
                pick.map(|c| c.value.clone()),
                pick.map(|c| c.role),
                false,
            )
        }
        ConflictStrategy::Escalation => {
            match candidates
                .iter()
                .find(|c| c.role == AgentRole::QualityGuardian)
            {
                Some(guardian) => (Some(guardian.value.clone()), Some(guardian.role), true),
                None => (None, None, true),
            }
        }
        ConflictStrategy::Merge => {
            let merged = candidates
                .iter()
                .rev()
                .fold(Value::Null, |acc, c| deep_merge(acc, &c.value));
            (Some(merged), None, false)
        }
    };

    Conflict {
        key,
        strategy,
        candidates,
        resolution,
        winner,
        escalated,
    }
}

/// Union of `base` and `overlay`: objects merge key by key, arrays
/// concatenate without duplicates, anything else takes `overlay`.
pub fn deep_merge(base: Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut left), Value::Object(right)) => {
            for (k, v) in right {
                let merged = match left.remove(k) {
                    Some(existing) => deep_merge(existing, v),
                    None => v.clone(),
                };
                left.insert(k.clone(), merged);
            }
            Value::Object(left)
        }
        (Value::Array(mut left), Value::Array(right)) => {
            for v in right {
                if !left.contains(v) {
                    left.push(v.clone());
                }
            }
            Value::Array(left)
        }
        (_, overlay) => overlay.clone(),
    }
}
