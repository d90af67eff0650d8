//! Context assembly under a size budget, tier triggers and cross-task
//! inheritance.

use chrono::Utc;

use phasegate_core::config::{ContextConfig, InheritanceConfig};
use phasegate_core::context::{
    fit_to_budget, AcceptanceCriterion, ContextItem, Decision, EdgeCase, Example, ExtendedTrigger,
    ItemKind, Pattern, Priority, Requirement, TechnicalNote,
};
use phasegate_core::{
    CompletedTask, ContextEmbedder, ContextError, ContextInheritance, PriorContext, SmartContext,
    SourceMaterial, TaskProfile,
};

fn profile() -> TaskProfile {
    TaskProfile {
        id: "session-api".into(),
        description: "implement session token refresh".into(),
        tags: vec!["auth".into(), "session".into()],
        domain: vec!["backend".into()],
        category: "src".into(),
        ..TaskProfile::default()
    }
}

fn decision(id: &str, title: &str, tags: &[&str], domain: &[&str]) -> Decision {
    Decision {
        id: id.into(),
        title: title.into(),
        rationale: format!("{title} rationale"),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        domain: domain.iter().map(|d| d.to_string()).collect(),
        confidence: 0.8,
        impact: 0.6,
        made_at: Utc::now(),
    }
}

fn rich_material() -> SourceMaterial {
    SourceMaterial {
        requirements: vec![Requirement {
            id: "r-session".into(),
            text: "Session tokens refresh before expiry".into(),
            priority: Priority::High,
            keywords: vec!["session".into()],
        }],
        acceptance_criteria: vec![AcceptanceCriterion {
            id: "ac-refresh".into(),
            requirement_id: Some("r-session".into()),
            text: "Expired refresh token returns 401".into(),
            priority: Priority::High,
        }],
        governance_rules: vec!["tests before code".into()],
        patterns: vec![Pattern {
            id: "p-middleware".into(),
            name: "token middleware".into(),
            description: "validate tokens in middleware".into(),
            category: "src".into(),
            domain: vec!["backend".into()],
            tags: vec!["auth".into()],
            success_rate: 0.9,
            use_count: 4,
            last_used: Utc::now(),
            complexity: 2,
        }],
        decisions: vec![decision("d-jwt", "use signed session tokens", &["auth"], &["backend"])],
        edge_cases: (0..5)
            .map(|i| EdgeCase {
                id: format!("edge-{i}"),
                description: format!("clock skew case {i} around token expiry boundaries"),
                severity: 0.2 * i as f64,
                likelihood: 0.5,
            })
            .collect(),
        examples: vec![Example {
            id: "ex-refresh".into(),
            description: "refresh handler from billing service".into(),
            snippet: "async fn refresh(token: Token) -> Result<Session> { todo!() }".into(),
            relevance: 0.7,
        }],
        technical_notes: vec![TechnicalNote {
            id: "note-clock".into(),
            text: "servers may drift by up to two seconds".into(),
            relevance: 0.6,
        }],
        references: vec!["docs/sessions.md".into()],
        ..SourceMaterial::default()
    }
}

#[test]
fn budget_scenario_trims_extended_to_fit() {
    // Sizes are rendered characters: tier header plus "- [id] text\n" lines.
    let mut ctx = SmartContext {
        task_id: "t".into(),
        core: vec![ContextItem::new("c", ItemKind::Requirement, "c".repeat(25), 1.0)],
        extended: vec![
            ContextItem::new("d", ItemKind::Decision, "d".repeat(5), 0.9),
            ContextItem::new("p", ItemKind::Pattern, "p".repeat(5), 0.9),
            ContextItem::new("x", ItemKind::Example, "x".repeat(5), 0.9),
            ContextItem::new("e", ItemKind::EdgeCase, "e".repeat(5), 0.9),
        ],
        reference: vec![],
        max_size: 50,
        triggers: vec![ExtendedTrigger::LowConfidence],
        trimmed: vec![],
        inherited_from: vec![],
        confidence: 70.0,
    };
    assert_eq!(ctx.core_size(), 40);
    assert_eq!(ctx.extended_size(), 60);
    let core_before = ctx.core.clone();

    fit_to_budget(&mut ctx);
    assert!(ctx.render().chars().count() <= 50);
    assert_eq!(ctx.core_size(), 40);
    assert_eq!(ctx.core, core_before);
    assert!(ctx.trimmed.iter().all(|id| id != "c"));
}

#[test]
fn any_budget_keeps_core_or_refuses() {
    let embedder = ContextEmbedder::default();
    let unconstrained = embedder
        .embed(&profile(), &rich_material(), 40.0, None)
        .unwrap();
    assert!(unconstrained.has_extended());

    let floor = unconstrained.core_size() + unconstrained.reference_size();
    for max in (20..=unconstrained.total_size() + 20).step_by(7) {
        let embedder = ContextEmbedder::new(ContextConfig {
            max_context_size: max,
            ..ContextConfig::default()
        });
        match embedder.embed(&profile(), &rich_material(), 40.0, None) {
            Ok(ctx) => {
                assert!(max >= floor);
                let rendered = ctx.render().chars().count();
                assert!(rendered <= max, "rendered {rendered} over {max}");
                assert_eq!(rendered, ctx.total_size());
                assert_eq!(ctx.core, unconstrained.core);
                assert_eq!(ctx.reference, unconstrained.reference);
            }
            Err(ContextError::CoreExceedsBudget { .. }) => assert!(max < floor),
            Err(other) => panic!("unexpected {other:?}"),
        }
    }
}

#[test]
fn confident_standard_task_with_pattern_skips_extended() {
    let embedder = ContextEmbedder::default();
    let ctx = embedder
        .embed(&profile(), &rich_material(), 85.0, None)
        .unwrap();
    assert!(ctx.triggers.is_empty());
    assert!(!ctx.has_extended());
    assert!(!ctx.core.is_empty());
}

#[test]
fn prior_context_merges_into_extended_tier() {
    let embedder = ContextEmbedder::default();
    let prior = embedder
        .embed(&profile(), &rich_material(), 40.0, None)
        .unwrap();

    let next = TaskProfile {
        id: "session-tests".into(),
        ..profile()
    };
    let ctx = embedder
        .embed(
            &next,
            &SourceMaterial::default(),
            40.0,
            Some(&PriorContext::Smart(prior)),
        )
        .unwrap();
    assert_eq!(ctx.inherited_from, vec!["session-api"]);
    assert!(ctx.items_of(ItemKind::Pattern).count() >= 1);
}

#[test]
fn unrelated_decisions_are_not_inherited() {
    let inheritance = ContextInheritance::new(InheritanceConfig::default());
    let threshold = inheritance.config().relevance_threshold;

    let unrelated = decision("d-pdf", "render invoices as pdf", &["billing"], &["reporting"]);
    assert!(inheritance.relevance(&unrelated, &profile()) < threshold);

    let source = CompletedTask::new(TaskProfile {
        id: "invoices".into(),
        description: "render invoices".into(),
        tags: vec!["billing".into()],
        domain: vec!["reporting".into()],
        category: "docs".into(),
        ..TaskProfile::default()
    })
    .with_decision(unrelated);

    let inherited = inheritance.inherit_from_one(&profile(), &source);
    assert!(inherited.decisions.is_empty());
}

#[test]
fn chain_inheritance_combines_sources() {
    let inheritance = ContextInheritance::new(InheritanceConfig::default());
    let shared = decision(
        "d-session",
        "implement session token refresh with rotation",
        &["auth", "session"],
        &["backend"],
    );
    let first = CompletedTask::new(TaskProfile::new("login", "implement session login"))
        .with_decision(shared.clone())
        .with_note("Critical: never log raw session tokens");
    let second = CompletedTask::new(TaskProfile::new("logout", "implement session logout"))
        .with_decision(shared)
        .with_note("lesson learned: revoke refresh tokens too");

    let inherited = inheritance
        .inherit_from_chain(&profile(), &[first, second])
        .unwrap();
    assert_eq!(inherited.decisions.len(), 1);
    assert_eq!(inherited.sources.len(), 2);
    assert!(!inherited.insights.is_empty());

    assert!(matches!(
        inheritance.inherit_from_chain(&profile(), &[]),
        Err(ContextError::EmptyChain)
    ));
}
