//! Size-bounded, three-tier context assembly for one task.

use std::collections::{BTreeSet, HashSet};

use chrono::Utc;
use tracing::debug;

use crate::config::ContextConfig;
use crate::domain::{TaskComplexity, TaskProfile};

use super::error::{ContextError, ContextResult};
use super::inheritance::InheritedContext;
use super::model::{
    ContextItem, Decision, EdgeCase, ExtendedTrigger, ItemKind, Pattern, SmartContext,
    SourceMaterial,
};
use super::text::{jaccard, overlaps, tag_set, tokens};

/// Context carried over from earlier work, merged into the extended tier.
#[derive(Debug, Clone, PartialEq)]
pub enum PriorContext {
    /// The context a previous task was given.
    Smart(SmartContext),
    /// The result of [`super::ContextInheritance`].
    Inherited(InheritedContext),
}

/// Builds [`SmartContext`]s under a fixed character budget.
#[derive(Debug, Clone, Default)]
pub struct ContextEmbedder {
    config: ContextConfig,
}

impl ContextEmbedder {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Assemble the context for `task`.
    ///
    /// The core tier is always built in full. The extended tier is added only
    /// when at least one [`ExtendedTrigger`] fires, and is the only tier ever
    /// trimmed. Fails when core and reference alone exceed the budget.
    pub fn embed(
        &self,
        task: &TaskProfile,
        material: &SourceMaterial,
        confidence: f64,
        previous: Option<&PriorContext>,
    ) -> ContextResult<SmartContext> {
        let max_size = self.config.max_context_size;
        if max_size == 0 {
            return Err(ContextError::InvalidBudget(
                "max_context_size must be positive".into(),
            ));
        }

        let keywords = task_keywords(task);
        let core = build_core(task, material, &keywords);
        let reference: Vec<ContextItem> = material
            .references
            .iter()
            .enumerate()
            .map(|(i, r)| ContextItem::new(format!("ref-{i}"), ItemKind::Reference, r.clone(), 0.0))
            .collect();

        let triggers = self.triggers(task, material, confidence);

        let mut ctx = SmartContext {
            task_id: task.id.clone(),
            core,
            extended: Vec::new(),
            reference,
            max_size,
            triggers,
            trimmed: Vec::new(),
            inherited_from: Vec::new(),
            confidence: confidence.clamp(0.0, 100.0),
        };

        let fixed = ctx.core_size() + ctx.reference_size();
        if fixed > max_size {
            return Err(ContextError::CoreExceedsBudget {
                core_size: ctx.core_size(),
                reference_size: ctx.reference_size(),
                max_size,
            });
        }

        if !ctx.triggers.is_empty() {
            ctx.extended = build_extended(task, material);
            if let Some(prior) = previous {
                merge_prior(&mut ctx, prior);
            }
        }

        fit_to_budget(&mut ctx);
        ctx.confidence = final_confidence(&ctx);

        debug!(
            task_id = %ctx.task_id,
            core = ctx.core.len(),
            extended = ctx.extended.len(),
            trimmed = ctx.trimmed.len(),
            rendered = ctx.total_size(),
            "context embedded"
        );
        Ok(ctx)
    }

    /// Which extended-tier triggers fire for this task. Empty means the
    /// extended tier is omitted.
    pub fn triggers(
        &self,
        task: &TaskProfile,
        material: &SourceMaterial,
        confidence: f64,
    ) -> Vec<ExtendedTrigger> {
        let mut triggers = Vec::new();
        if confidence < self.config.confidence_threshold {
            triggers.push(ExtendedTrigger::LowConfidence);
        }
        if task.complexity == TaskComplexity::Complex {
            triggers.push(ExtendedTrigger::ComplexTask);
        }
        if task.dependencies.len() > self.config.dependency_threshold {
            triggers.push(ExtendedTrigger::ManyDependencies);
        }
        if !material.patterns.iter().any(|p| pattern_applies(p, task)) {
            triggers.push(ExtendedTrigger::NoMatchingPattern);
        }
        triggers
    }
}

/// Drop extended items until the rendered context fits `max_size`: lowest
/// trim rank first, lowest score within a rank. Core and reference items are
/// never touched, so the result can still exceed the budget if they alone do.
pub fn fit_to_budget(ctx: &mut SmartContext) {
    while ctx.total_size() > ctx.max_size && !ctx.extended.is_empty() {
        let victim = ctx
            .extended
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                let ra = a.kind.trim_rank().unwrap_or(u8::MAX);
                let rb = b.kind.trim_rank().unwrap_or(u8::MAX);
                ra.cmp(&rb).then_with(|| a.score.total_cmp(&b.score))
            })
            .map(|(i, _)| i);
        let Some(index) = victim else { break };
        let removed = ctx.extended.remove(index);
        ctx.trimmed.push(removed.id);
    }
}

fn task_keywords(task: &TaskProfile) -> BTreeSet<String> {
    let mut keywords = tokens(&task.description);
    keywords.extend(tag_set(&task.tags));
    keywords.extend(tag_set(&task.domain));
    if !task.category.is_empty() {
        keywords.insert(task.category.to_lowercase());
    }
    keywords
}

fn build_core(
    task: &TaskProfile,
    material: &SourceMaterial,
    keywords: &BTreeSet<String>,
) -> Vec<ContextItem> {
    let mut core = vec![ContextItem::new(
        format!("task:{}", task.id),
        ItemKind::TaskMetadata,
        format!("{} ({})", task.description, task.category),
        1.0,
    )];

    let mut selected = HashSet::new();
    for req in &material.requirements {
        let mut words = tokens(&req.text);
        words.extend(tag_set(&req.keywords));
        if req.priority.is_mandatory() || overlaps(&words, keywords) {
            selected.insert(req.id.as_str());
            core.push(ContextItem::new(
                req.id.clone(),
                ItemKind::Requirement,
                req.text.clone(),
                1.0,
            ));
        }
    }

    for criterion in &material.acceptance_criteria {
        let linked = criterion
            .requirement_id
            .as_deref()
            .is_some_and(|id| selected.contains(id));
        if linked
            || criterion.priority.is_mandatory()
            || overlaps(&tokens(&criterion.text), keywords)
        {
            core.push(ContextItem::new(
                criterion.id.clone(),
                ItemKind::AcceptanceCriterion,
                criterion.text.clone(),
                1.0,
            ));
        }
    }

    for summary in &material.dependency_summaries {
        if task.dependencies.contains(&summary.task_id) {
            core.push(ContextItem::new(
                format!("dep:{}", summary.task_id),
                ItemKind::DependencySummary,
                summary.summary.clone(),
                1.0,
            ));
        }
    }

    for (i, rule) in material.governance_rules.iter().enumerate() {
        core.push(ContextItem::new(
            format!("governance-{i}"),
            ItemKind::GovernanceRule,
            rule.clone(),
            1.0,
        ));
    }
    core
}

fn build_extended(task: &TaskProfile, material: &SourceMaterial) -> Vec<ContextItem> {
    let mut extended = Vec::new();

    for p in material.patterns.iter().filter(|p| pattern_applies(p, task)) {
        extended.push(pattern_item(p, pattern_relevance(p, task)));
    }
    for d in &material.decisions {
        extended.push(decision_item(d, decision_score(d)));
    }
    for e in &material.edge_cases {
        extended.push(edge_case_item(e));
    }
    for ex in &material.examples {
        extended.push(ContextItem::new(
            ex.id.clone(),
            ItemKind::Example,
            format!("{}\n{}", ex.description, ex.snippet),
            ex.relevance,
        ));
    }
    for note in &material.technical_notes {
        extended.push(ContextItem::new(
            note.id.clone(),
            ItemKind::TechnicalNote,
            note.text.clone(),
            note.relevance,
        ));
    }
    extended
}

fn merge_prior(ctx: &mut SmartContext, prior: &PriorContext) {
    let mut seen: HashSet<String> = ctx.extended.iter().map(|i| i.id.clone()).collect();
    let mut push = |ctx: &mut SmartContext, item: ContextItem| {
        if seen.insert(item.id.clone()) {
            ctx.extended.push(item);
        }
    };

    match prior {
        PriorContext::Smart(previous) => {
            for item in previous.extended.iter().filter(|i| {
                matches!(
                    i.kind,
                    ItemKind::Pattern | ItemKind::Decision | ItemKind::TechnicalNote
                )
            }) {
                push(ctx, item.clone());
            }
            ctx.inherited_from.push(previous.task_id.clone());
        }
        PriorContext::Inherited(inherited) => {
            for d in &inherited.decisions {
                push(ctx, decision_item(&d.decision, d.relevance));
            }
            for p in &inherited.patterns {
                push(ctx, pattern_item(p, p.success_rate));
            }
            for insight in &inherited.insights {
                push(
                    ctx,
                    ContextItem::new(
                        insight.id.clone(),
                        ItemKind::TechnicalNote,
                        insight.text.clone(),
                        insight.importance,
                    ),
                );
            }
            ctx.inherited_from.extend(inherited.sources.iter().cloned());
        }
    }
}

fn pattern_applies(pattern: &Pattern, task: &TaskProfile) -> bool {
    (!task.category.is_empty() && pattern.category.eq_ignore_ascii_case(&task.category))
        || overlaps(&tag_set(&pattern.domain), &tag_set(&task.domain))
        || overlaps(&tag_set(&pattern.tags), &tag_set(&task.tags))
}

fn pattern_relevance(pattern: &Pattern, task: &TaskProfile) -> f64 {
    let mut pattern_tags = tag_set(&pattern.tags);
    pattern_tags.extend(tag_set(&pattern.domain));
    let mut task_tags = tag_set(&task.tags);
    task_tags.extend(tag_set(&task.domain));
    0.6 * pattern.success_rate.clamp(0.0, 1.0) + 0.4 * jaccard(&pattern_tags, &task_tags)
}

/// 0.5 confidence + 0.3 recency + 0.2 impact. Recency halves after 30 days.
fn decision_score(decision: &Decision) -> f64 {
    let age_days = (Utc::now() - decision.made_at).num_days().max(0) as f64;
    let recency = 1.0 / (1.0 + age_days / 30.0);
    0.5 * decision.confidence.clamp(0.0, 1.0) + 0.3 * recency + 0.2 * decision.impact.clamp(0.0, 1.0)
}

fn pattern_item(pattern: &Pattern, score: f64) -> ContextItem {
    ContextItem::new(
        pattern.id.clone(),
        ItemKind::Pattern,
        format!("{}: {}", pattern.name, pattern.description),
        score,
    )
}

fn decision_item(decision: &Decision, score: f64) -> ContextItem {
    ContextItem::new(decision.id.clone(), ItemKind::Decision, decision.text(), score)
}

fn edge_case_item(edge: &EdgeCase) -> ContextItem {
    ContextItem::new(
        edge.id.clone(),
        ItemKind::EdgeCase,
        edge.description.clone(),
        edge.severity.clamp(0.0, 1.0) * edge.likelihood.clamp(0.0, 1.0),
    )
}

/// Rewards patterns (+5), examples (+3) and a complete core (+5).
fn final_confidence(ctx: &SmartContext) -> f64 {
    let mut confidence = ctx.confidence;
    if ctx.items_of(ItemKind::Pattern).next().is_some() {
        confidence += 5.0;
    }
    if ctx.items_of(ItemKind::Example).next().is_some() {
        confidence += 3.0;
    }
    let complete_core = ctx.items_of(ItemKind::Requirement).next().is_some()
        && ctx.items_of(ItemKind::AcceptanceCriterion).next().is_some();
    if complete_core {
        confidence += 5.0;
    }
    confidence.clamp(0.0, 100.0)
}
