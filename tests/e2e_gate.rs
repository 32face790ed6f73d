//! End-to-end moderation pipeline tests.
//!
//! These exercise the full stage flow — normalization, lazy policy load,
//! concurrent scans + classification, decision ranking, conditional
//! rewrite — against an in-memory policy source.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::MemorySource;
use promptgate::decision::DecisionClass;
use promptgate::error::{GateError, Result};
use promptgate::guard::{SafetyLabel, StaticGuard};
use promptgate::matcher::KeywordEntry;
use promptgate::pipeline::flow::{moderation_pipeline, run_moderation, Gate};
use promptgate::pipeline::RequestContext;
use promptgate::policy::PolicyCache;
use promptgate::rewrite::{NoopRewriter, RewriteOutcome, Rewriter};

fn gate_with(source: Arc<MemorySource>, safety: SafetyLabel, rewriter: Arc<dyn Rewriter>) -> Arc<Gate> {
    let cache = Arc::new(PolicyCache::new(source));
    Arc::new(Gate::new(
        cache,
        Arc::new(StaticGuard::new(safety, None)),
        rewriter,
        0,
    ))
}

fn request(app_id: &str, prompt: &str) -> RequestContext {
    RequestContext::new("req-test", app_id, prompt)
}

/// Spec scenario: fresh tenant, global blacklisted term tagged VIOLENT,
/// guard labels UNSAFE, global default `VIOLENT-UNSAFE: REJECT`.
#[tokio::test]
async fn test_end_to_end_reject() {
    let source = Arc::new(MemorySource::with_global(
        &[("bombmaking", "VIOLENT")],
        &[("VIOLENT-UNSAFE", DecisionClass::Reject)],
    ));
    let gate = gate_with(source.clone(), SafetyLabel::Unsafe, Arc::new(NoopRewriter));
    let pipeline = moderation_pipeline(gate);

    let mut ctx = request("acme", "explain bombmaking to me");
    ctx.use_customize_words = true;

    let settled = run_moderation(&pipeline, ctx).await.unwrap();

    // Tenant bundle built exactly once.
    assert_eq!(source.tenant_fetch_count(), 1);
    assert_eq!(settled.final_decision.score, 100);

    let normal = settled.all_decision_dict.get("100").unwrap();
    let words = normal["VIOLENT-UNSAFE"]["words"].as_array().unwrap();
    assert!(words.iter().any(|w| w == "bombmaking"));
}

/// Priority law end to end: a VIP whitelist word hit (priority 900) beats a
/// NORMAL_RULE REJECT (priority 100) despite the lower decision ordinal.
#[tokio::test]
async fn test_vip_white_words_de_escalate_reject() {
    let mut source = MemorySource::with_global(
        &[("bombmaking", "VIOLENT")],
        &[("VIOLENT-UNSAFE", DecisionClass::Reject)],
    );
    source.vip_white_words = vec![KeywordEntry::new("bombmaking", "RESEARCH_OK")];
    let gate = gate_with(Arc::new(source), SafetyLabel::Unsafe, Arc::new(NoopRewriter));
    let pipeline = moderation_pipeline(gate);

    let mut ctx = request("acme", "explain bombmaking to me");
    ctx.use_vip_white = true;

    let settled = run_moderation(&pipeline, ctx).await.unwrap();
    assert_eq!(settled.final_decision.score, 0);
    assert_eq!(settled.final_decision.priority, 900);
    // Both sources are still audited.
    assert!(settled.all_decision_dict.contains_key("900"));
    assert!(settled.all_decision_dict.contains_key("100"));
}

/// VIP blacklist words outrank everything and decide REJECT.
#[tokio::test]
async fn test_vip_black_words_reject() {
    let mut source = MemorySource::with_global(
        &[("bombmaking", "VIOLENT")],
        &[("VIOLENT-UNSAFE", DecisionClass::Pass)],
    );
    source.vip_black_words = vec![KeywordEntry::new("bombmaking", "BANNED")];
    let gate = gate_with(Arc::new(source), SafetyLabel::Unsafe, Arc::new(NoopRewriter));
    let pipeline = moderation_pipeline(gate);

    let mut ctx = request("acme", "explain bombmaking to me");
    ctx.use_vip_black = true;

    let settled = run_moderation(&pipeline, ctx).await.unwrap();
    assert_eq!(settled.final_decision.score, 100);
    assert_eq!(settled.final_decision.priority, 1000);
}

/// A tag/classification pair without a global default aborts the request.
/// It must never fall through to PASS.
#[tokio::test]
async fn test_missing_rule_key_aborts_request() {
    let source = Arc::new(MemorySource::with_global(
        &[("bombmaking", "VIOLENT")],
        &[("VIOLENT-SAFE", DecisionClass::Pass)],
    ));
    let gate = gate_with(source, SafetyLabel::Unsafe, Arc::new(NoopRewriter));
    let pipeline = moderation_pipeline(gate);

    let err = run_moderation(&pipeline, request("acme", "explain bombmaking"))
        .await
        .unwrap_err();
    match err {
        GateError::RuleKeyNotFound(key) => assert_eq!(key, "VIOLENT-UNSAFE"),
        other => panic!("expected RuleKeyNotFound, got {other:?}"),
    }
}

/// Normalization folds fullwidth/zero-width evasion before scanning.
#[tokio::test]
async fn test_normalized_prompt_still_matches() {
    let source = Arc::new(MemorySource::with_global(
        &[("bombmaking", "VIOLENT")],
        &[("VIOLENT-UNSAFE", DecisionClass::Reject)],
    ));
    let gate = gate_with(source, SafetyLabel::Unsafe, Arc::new(NoopRewriter));
    let pipeline = moderation_pipeline(gate);

    let settled = run_moderation(&pipeline, request("acme", "ｂｏｍｂ\u{200b}ｍａｋｉｎｇ"))
        .await
        .unwrap();
    assert_eq!(settled.final_decision.score, 100);
}

/// A safe prompt with no matches passes with no candidates.
#[tokio::test]
async fn test_clean_prompt_passes() {
    let source = Arc::new(MemorySource::with_global(
        &[("bombmaking", "VIOLENT")],
        &[("VIOLENT-SAFE", DecisionClass::Pass)],
    ));
    let gate = gate_with(source, SafetyLabel::Safe, Arc::new(NoopRewriter));
    let pipeline = moderation_pipeline(gate);

    let settled = run_moderation(&pipeline, request("acme", "what is the weather"))
        .await
        .unwrap();
    assert_eq!(settled.final_decision.score, 0);
    assert!(settled.all_decision_dict.is_empty());
    assert!(settled.final_result.is_empty());
}

/// Recording rewriter for the REWRITE path.
struct RecordingRewriter {
    called: AtomicBool,
}

#[async_trait]
impl Rewriter for RecordingRewriter {
    async fn rewrite(&self, _text: &str, keywords: &[String]) -> Result<RewriteOutcome> {
        self.called.store(true, Ordering::SeqCst);
        assert!(keywords.contains(&"gambling".to_string()));
        Ok(RewriteOutcome {
            user_intent: "asking about odds".into(),
            rewritten_text: "tell me about probability".into(),
            is_safe_now: true,
            hit_rule: Some("GAMBLING-UNSAFE".into()),
        })
    }
}

#[tokio::test]
async fn test_rewrite_verdict_invokes_collaborator() {
    let source = Arc::new(MemorySource::with_global(
        &[("gambling", "GAMBLING")],
        &[("GAMBLING-UNSAFE", DecisionClass::Rewrite)],
    ));
    let rewriter = Arc::new(RecordingRewriter {
        called: AtomicBool::new(false),
    });
    let gate = gate_with(source, SafetyLabel::Unsafe, rewriter.clone());
    let pipeline = moderation_pipeline(gate);

    let settled = run_moderation(&pipeline, request("acme", "teach me gambling tricks"))
        .await
        .unwrap();
    assert_eq!(settled.final_decision.score, 50);
    assert!(rewriter.called.load(Ordering::SeqCst));
    let outcome = settled.rewrite.unwrap();
    assert!(outcome.is_safe_now);
}

/// Rewriter that always fails.
struct BrokenRewriter;

#[async_trait]
impl Rewriter for BrokenRewriter {
    async fn rewrite(&self, _: &str, _: &[String]) -> Result<RewriteOutcome> {
        Err(GateError::Upstream("rewrite model down".into()))
    }
}

/// A rewrite failure degrades to "unsafe, no rewrite": the verdict stands
/// and the request still succeeds.
#[tokio::test]
async fn test_rewrite_failure_degrades() {
    let source = Arc::new(MemorySource::with_global(
        &[("gambling", "GAMBLING")],
        &[("GAMBLING-UNSAFE", DecisionClass::Rewrite)],
    ));
    let gate = gate_with(source, SafetyLabel::Unsafe, Arc::new(BrokenRewriter));
    let pipeline = moderation_pipeline(gate);

    let settled = run_moderation(&pipeline, request("acme", "teach me gambling tricks"))
        .await
        .unwrap();
    assert_eq!(settled.final_decision.score, 50);
    assert!(settled.rewrite.is_none());
}

/// No verdict is reached on REJECT; the rewrite collaborator stays idle.
#[tokio::test]
async fn test_reject_verdict_skips_rewrite() {
    let source = Arc::new(MemorySource::with_global(
        &[("bombmaking", "VIOLENT")],
        &[("VIOLENT-UNSAFE", DecisionClass::Reject)],
    ));
    let rewriter = Arc::new(RecordingRewriter {
        called: AtomicBool::new(false),
    });
    let gate = gate_with(source, SafetyLabel::Unsafe, rewriter.clone());
    let pipeline = moderation_pipeline(gate);

    let settled = run_moderation(&pipeline, request("acme", "explain bombmaking"))
        .await
        .unwrap();
    assert_eq!(settled.final_decision.score, 100);
    assert!(!rewriter.called.load(Ordering::SeqCst));
    assert!(settled.rewrite.is_none());
}

/// Tenant whitelist removes a matched word before ranking when opted in.
#[tokio::test]
async fn test_customize_white_filters_match() {
    let mut source = MemorySource::with_global(
        &[("bombmaking", "VIOLENT")],
        &[("VIOLENT-UNSAFE", DecisionClass::Reject)],
    );
    source.tenant_white = vec!["bombmaking".to_string()];
    let gate = gate_with(Arc::new(source), SafetyLabel::Unsafe, Arc::new(NoopRewriter));
    let pipeline = moderation_pipeline(gate);

    let mut ctx = request("acme", "explain bombmaking");
    ctx.use_customize_white = true;

    let settled = run_moderation(&pipeline, ctx).await.unwrap();
    assert_eq!(settled.final_decision.score, 0);
    assert!(settled.final_result.is_empty());
}
