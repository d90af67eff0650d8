//! Cross-task context inheritance.
//!
//! Decisions, successful patterns and completion notes of finished tasks are
//! carried into new tasks when they are relevant enough. Results are cached
//! per (target, sources, version) with a time-to-live.
//!
//! Decision relevance is a weighted sum:
//!
//! | signal                         | weight |
//! |--------------------------------|--------|
//! | tag overlap (Jaccard)          | 0.30   |
//! | text similarity to target      | 0.25   |
//! | domain overlap (Jaccard)       | 0.20   |
//! | decision confidence            | 0.15   |
//! | decision impact                | 0.10   |
//!
//! With the default threshold of 0.5, a decision sharing no tags and no text
//! with the target can score at most 0.45 and is never inherited.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::InheritanceConfig;
use crate::domain::TaskProfile;
use crate::metrics::METRICS;

use super::error::{ContextError, ContextResult};
use super::model::{Decision, Pattern};
use super::text::{jaccard, overlaps, tag_set, tokens};

/// Pluggable text similarity in `[0, 1]`. Must be monotonic in overlap.
pub trait TextSimilarity: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Jaccard index over [`tokens`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenJaccard;

impl TextSimilarity for TokenJaccard {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        jaccard(&tokens(a), &tokens(b))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Antipattern,
    Warning,
    Lesson,
    Insight,
}

impl InsightKind {
    fn base_importance(&self) -> f64 {
        match self {
            InsightKind::Antipattern => 0.9,
            InsightKind::Warning => 0.8,
            InsightKind::Lesson => 0.7,
            InsightKind::Insight => 0.5,
        }
    }
}

/// Turns a free-form completion note into a typed insight with an
/// importance in `[0, 1]`. `None` discards the note.
pub trait InsightClassifier: Send + Sync {
    fn classify(&self, note: &str) -> Option<(InsightKind, f64)>;
}

/// Keyword heuristics; the first matching family wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordClassifier;

impl InsightClassifier for KeywordClassifier {
    fn classify(&self, note: &str) -> Option<(InsightKind, f64)> {
        let lower = note.trim().to_lowercase();
        if lower.is_empty() {
            return None;
        }
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        let kind = if has(&["anti-pattern", "antipattern", "avoid", "never "]) {
            InsightKind::Antipattern
        } else if has(&["warning", "careful", "beware", "risk"]) {
            InsightKind::Warning
        } else if has(&["learned", "lesson", "next time", "should have"]) {
            InsightKind::Lesson
        } else {
            InsightKind::Insight
        };

        let mut importance = kind.base_importance();
        if has(&["critical", "important", "must"]) {
            importance += 0.05;
        }
        Some((kind, importance.min(1.0)))
    }
}

/// A finished task together with what it produced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompletedTask {
    pub profile: TaskProfile,
    pub decisions: Vec<Decision>,
    pub patterns: Vec<Pattern>,
    pub notes: Vec<String>,
    /// How many inheritance hops produced this task's own context.
    pub depth: u32,
}

impl CompletedTask {
    pub fn new(profile: TaskProfile) -> Self {
        Self {
            profile,
            ..Self::default()
        }
    }

    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decisions.push(decision);
        self
    }

    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InheritedDecision {
    pub decision: Decision,
    pub relevance: f64,
    pub source_task: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub kind: InsightKind,
    pub text: String,
    pub importance: f64,
    pub source_task: String,
}

/// Decisions, patterns and insights selected for one target task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InheritedContext {
    pub target_task: String,
    pub sources: Vec<String>,
    /// Highest relevance first.
    pub decisions: Vec<InheritedDecision>,
    /// Best success rate first.
    pub patterns: Vec<Pattern>,
    /// Grouped by kind (antipatterns first), then by importance.
    pub insights: Vec<Insight>,
    /// Mean relevance of the inherited decisions; 0 when none.
    pub relevance: f64,
    pub depth: u32,
    /// Sources ignored because they were already at the depth cap.
    pub skipped_sources: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl InheritedContext {
    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty() && self.patterns.is_empty() && self.insights.is_empty()
    }
}

type CacheKey = (String, String, u32);

struct CacheEntry {
    value: InheritedContext,
    stored_at: Instant,
}

/// Relevance-scored, depth-capped, cached inheritance.
pub struct ContextInheritance {
    config: InheritanceConfig,
    similarity: Arc<dyn TextSimilarity>,
    classifier: Arc<dyn InsightClassifier>,
    cache: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl ContextInheritance {
    pub fn new(config: InheritanceConfig) -> Self {
        Self {
            config,
            similarity: Arc::new(TokenJaccard),
            classifier: Arc::new(KeywordClassifier),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn TextSimilarity>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn InsightClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &InheritanceConfig {
        &self.config
    }

    /// Weighted relevance of `decision` to `target`, in `[0, 1]`.
    pub fn relevance(&self, decision: &Decision, target: &TaskProfile) -> f64 {
        let tags = jaccard(&tag_set(&decision.tags), &tag_set(&target.tags));
        let text = self
            .similarity
            .similarity(&decision.text(), &target.description)
            .clamp(0.0, 1.0);
        let domain = jaccard(&tag_set(&decision.domain), &tag_set(&target.domain));
        0.3 * tags
            + 0.25 * text
            + 0.2 * domain
            + 0.15 * decision.confidence.clamp(0.0, 1.0)
            + 0.1 * decision.impact.clamp(0.0, 1.0)
    }

    /// Inherit from a single finished task.
    pub fn inherit_from_one(&self, target: &TaskProfile, source: &CompletedTask) -> InheritedContext {
        self.inherit(target, &[source])
    }

    /// Inherit from several finished tasks, oldest first. Only the newest
    /// `max_depth` sources are considered.
    pub fn inherit_from_chain(
        &self,
        target: &TaskProfile,
        chain: &[CompletedTask],
    ) -> ContextResult<InheritedContext> {
        if chain.is_empty() {
            return Err(ContextError::EmptyChain);
        }
        let sources: Vec<&CompletedTask> = chain.iter().collect();
        Ok(self.inherit(target, &sources))
    }

    fn inherit(&self, target: &TaskProfile, sources: &[&CompletedTask]) -> InheritedContext {
        let max_depth = self.config.max_depth as usize;
        let window = &sources[sources.len().saturating_sub(max_depth)..];
        let key: CacheKey = (
            target.id.clone(),
            window
                .iter()
                .map(|s| s.profile.id.as_str())
                .collect::<Vec<_>>()
                .join(","),
            self.config.version,
        );

        if let Some(hit) = self.cached(&key) {
            METRICS.inc_inheritance_cache_hits();
            debug!(target = %target.id, "inheritance cache hit");
            return hit;
        }

        let mut decisions: BTreeMap<String, InheritedDecision> = BTreeMap::new();
        let mut patterns: BTreeMap<String, (Pattern, f64, f64)> = BTreeMap::new();
        let mut insights = Vec::new();
        let mut used = Vec::new();
        let mut skipped = Vec::new();
        let mut deepest = 0u32;

        for source in window {
            if source.depth >= self.config.max_depth {
                skipped.push(source.profile.id.clone());
                continue;
            }
            used.push(source.profile.id.clone());
            deepest = deepest.max(source.depth + 1);

            for decision in &source.decisions {
                let relevance = self.relevance(decision, target);
                if relevance < self.config.relevance_threshold {
                    continue;
                }
                let candidate = InheritedDecision {
                    decision: decision.clone(),
                    relevance,
                    source_task: source.profile.id.clone(),
                };
                match decisions.get(&decision.id) {
                    Some(existing) if existing.relevance >= relevance => {}
                    _ => {
                        decisions.insert(decision.id.clone(), candidate);
                    }
                }
            }

            for pattern in source.patterns.iter().filter(|p| self.applies(p, target)) {
                let weight = f64::from(pattern.use_count.max(1));
                match patterns.get_mut(&pattern.id) {
                    Some((merged, weighted, total)) => {
                        *weighted += pattern.success_rate * weight;
                        *total += weight;
                        merged.use_count = merged.use_count.saturating_add(pattern.use_count);
                        if merged.last_used < pattern.last_used {
                            merged.last_used = pattern.last_used;
                        }
                    }
                    None => {
                        patterns.insert(
                            pattern.id.clone(),
                            (pattern.clone(), pattern.success_rate * weight, weight),
                        );
                    }
                }
            }

            for (i, note) in source.notes.iter().enumerate() {
                if let Some((kind, importance)) = self.classifier.classify(note) {
                    insights.push(Insight {
                        id: format!("{}-note-{i}", source.profile.id),
                        kind,
                        text: note.trim().to_string(),
                        importance: importance.clamp(0.0, 1.0),
                        source_task: source.profile.id.clone(),
                    });
                }
            }
        }

        let mut decisions: Vec<InheritedDecision> = decisions.into_values().collect();
        decisions.sort_by(|a, b| {
            b.relevance
                .total_cmp(&a.relevance)
                .then_with(|| a.decision.id.cmp(&b.decision.id))
        });
        decisions.truncate(self.config.max_decisions);

        let mut patterns: Vec<Pattern> = patterns
            .into_values()
            .map(|(mut p, weighted, weight)| {
                p.success_rate = weighted / weight;
                p
            })
            .collect();
        sort_patterns(&mut patterns);
        patterns.truncate(self.config.max_patterns);

        insights.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        insights.truncate(self.config.max_insights);
        insights.sort_by_key(|i| i.kind);

        let relevance = if decisions.is_empty() {
            0.0
        } else {
            decisions.iter().map(|d| d.relevance).sum::<f64>() / decisions.len() as f64
        };
        let depth = deepest.max(used.len() as u32).min(self.config.max_depth);

        let inherited = InheritedContext {
            target_task: target.id.clone(),
            sources: used,
            decisions,
            patterns,
            insights,
            relevance,
            depth,
            skipped_sources: skipped,
            created_at: Utc::now(),
        };
        self.store(key, inherited.clone());
        inherited
    }

    /// Success rate above the bar and applicable to the target's category,
    /// domain or tags.
    fn applies(&self, pattern: &Pattern, target: &TaskProfile) -> bool {
        if pattern.success_rate <= self.config.pattern_success_bar {
            return false;
        }
        pattern.category.eq_ignore_ascii_case(&target.category)
            || overlaps(&tag_set(&pattern.domain), &tag_set(&target.domain))
            || overlaps(&tag_set(&pattern.tags), &tag_set(&target.tags))
    }

    fn cached(&self, key: &CacheKey) -> Option<InheritedContext> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(key)
            .filter(|e| e.stored_at.elapsed() < self.config.cache_ttl())
            .map(|e| e.value.clone())
    }

    /// Insert after dropping expired entries; evicts the oldest entry when
    /// the cache is still at `max_cache_entries`.
    fn store(&self, key: CacheKey, value: InheritedContext) {
        let ttl = self.config.cache_ttl();
        let cap = self.config.max_cache_entries.max(1);
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.retain(|_, e| e.stored_at.elapsed() < ttl);
        while cache.len() >= cap && !cache.contains_key(&key) {
            let oldest = cache
                .iter()
                .min_by_key(|(_, e)| e.stored_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    cache.remove(&k);
                }
                None => break,
            }
        }
        cache.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop expired cache entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let ttl = self.config.cache_ttl();
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let before = cache.len();
        cache.retain(|_, e| e.stored_at.elapsed() < ttl);
        before - cache.len()
    }

    pub fn cache_len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for ContextInheritance {
    fn default() -> Self {
        Self::new(InheritanceConfig::default())
    }
}

/// Success rate desc, then most recently used, then simplest.
pub fn sort_patterns(patterns: &mut [Pattern]) {
    patterns.sort_by(|a, b| {
        b.success_rate
            .total_cmp(&a.success_rate)
            .then_with(|| b.last_used.cmp(&a.last_used))
            .then_with(|| a.complexity.cmp(&b.complexity))
    });
}
