//! Decision engine.
//!
//! Reconciles up to five independent rule sources into one verdict plus a
//! full per-source audit trail. The invariant that keeps VIP overrides
//! meaningful: the winning verdict is chosen by *source priority* on the
//! fixed ladder, never by decision severity — decision ordinals only break
//! ties among a single source's own candidates. A VIP white-list hit can
//! therefore de-escalate a global REJECT, and a VIP black-list hit can
//! escalate past a tenant PASS.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{GateError, Result};
use crate::pipeline::RequestContext;
use crate::policy::{CustomBundle, VipBundle};

/// Action class attached to a rule.
///
/// The ordinal value selects the most severe decision within one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DecisionClass {
    Pass,
    Rewrite,
    Reject,
    Manual,
}

impl DecisionClass {
    /// Ordinal score carried in the final verdict.
    pub fn score(self) -> i64 {
        match self {
            DecisionClass::Pass => 0,
            DecisionClass::Rewrite => 50,
            DecisionClass::Reject => 100,
            DecisionClass::Manual => 1000,
        }
    }

    /// Resolve a score back to its class. Unknown scores are fatal: they
    /// indicate a decision/data mismatch, never a condition to pass through.
    pub fn from_score(score: i64) -> Result<Self> {
        match score {
            0 => Ok(DecisionClass::Pass),
            50 => Ok(DecisionClass::Rewrite),
            100 => Ok(DecisionClass::Reject),
            1000 => Ok(DecisionClass::Manual),
            other => Err(GateError::NoDecisionFound(other)),
        }
    }

    /// Parse a data-source strategy string (`PASS`/`BLOCK`/`REWRITE`/`REVIEW`).
    pub fn from_strategy(strategy: &str) -> Result<Self> {
        match strategy.trim().to_ascii_uppercase().as_str() {
            "PASS" => Ok(DecisionClass::Pass),
            "REWRITE" => Ok(DecisionClass::Rewrite),
            "BLOCK" | "REJECT" => Ok(DecisionClass::Reject),
            "REVIEW" | "MANUAL" => Ok(DecisionClass::Manual),
            other => Err(GateError::DataSource(format!("unknown strategy: {other}"))),
        }
    }
}

/// Rule sources, ordered by fixed priority (low to high).
///
/// Higher priority always overrides lower, independent of decision severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DecisionSource {
    NormalRule,
    VipWhiteRule,
    VipBlackRule,
    VipWhiteWords,
    VipBlackWords,
}

impl DecisionSource {
    /// Position on the priority ladder.
    pub fn priority(self) -> i64 {
        match self {
            DecisionSource::NormalRule => 100,
            DecisionSource::VipWhiteRule => 700,
            DecisionSource::VipBlackRule => 800,
            DecisionSource::VipWhiteWords => 900,
            DecisionSource::VipBlackWords => 1000,
        }
    }
}

/// Final verdict: the winning decision score and the priority of the source
/// that produced it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Verdict {
    pub score: i64,
    pub priority: i64,
}

/// Running winner during source evaluation.
#[derive(Default)]
struct Ballot {
    best: Option<Verdict>,
}

impl Ballot {
    /// Offer a candidate; the highest source priority wins.
    fn offer(&mut self, score: i64, priority: i64) {
        match &mut self.best {
            None => self.best = Some(Verdict { score, priority }),
            Some(current) if priority > current.priority => {
                *current = Verdict { score, priority };
            },
            _ => {},
        }
    }
}

/// Highest-ordinal candidate among tags matching a VIP rule table.
///
/// Returns the winning score plus the `{tag: words}` detail payload, or
/// `None` when no tag in `final_result` keys into the table.
fn rank_by_vip_rules(
    final_result: &BTreeMap<String, Vec<String>>,
    rule_table: &BTreeMap<String, DecisionClass>,
) -> Option<(i64, serde_json::Value)> {
    let mut winner: Option<(i64, serde_json::Value)> = None;
    for (label, words) in final_result {
        if let Some(decision) = rule_table.get(label) {
            let score = decision.score();
            if winner.as_ref().is_none_or(|(best, _)| score > *best) {
                winner = Some((score, json!({ label: words })));
            }
        }
    }
    winner
}

/// Resolve every tag in `final_result` against the rule tables.
///
/// Each tag's label is `"{tag_code}-{classification_label}"`. The label must
/// exist in the global table — a miss is a `RuleKeyNotFound` hard error. When
/// the tenant opted in and its custom table carries the label, the custom
/// decision overrides the global default. Every tag's resolved decision lands
/// in the detail payload regardless of which one wins the source.
fn rank_by_normal_rules(
    ctx: &RequestContext,
    global_rules: &BTreeMap<String, DecisionClass>,
    custom: Option<&CustomBundle>,
) -> Result<(i64, serde_json::Value)> {
    let customize_rule = custom
        .filter(|_| ctx.use_customize_rule)
        .map(|bundle| &bundle.rules)
        .filter(|rules| !rules.is_empty());

    let mut final_score: i64 = -1;
    let mut details = serde_json::Map::new();

    for (tag, words) in &ctx.final_result {
        let label = format!("{tag}-{}", ctx.safety);
        let Some(global_decision) = global_rules.get(&label) else {
            tracing::error!(label = %label, "KEY_NOT_IN_RULE_ERROR");
            return Err(GateError::RuleKeyNotFound(label));
        };

        let decision = customize_rule
            .and_then(|rules| rules.get(&label))
            .copied()
            .unwrap_or(*global_decision);

        if decision.score() > final_score {
            final_score = decision.score();
        }
        details.insert(label, json!({ "decision": decision.score(), "words": words }));
    }

    Ok((final_score, serde_json::Value::Object(details)))
}

/// Evaluate all sources in fixed order and settle the final verdict.
///
/// Populates `ctx.final_decision` and `ctx.all_decision_dict` (keyed by the
/// stringified source priority). With no candidates at all the verdict
/// defaults to PASS.
pub fn make_decision(
    ctx: &mut RequestContext,
    global_rules: &BTreeMap<String, DecisionClass>,
    custom: Option<&CustomBundle>,
    vip: Option<&VipBundle>,
) -> Result<()> {
    let mut ballot = Ballot::default();
    let mut all_decisions: BTreeMap<String, serde_json::Value> = BTreeMap::new();

    if ctx.use_vip_black && !ctx.vip_black_words_result.is_empty() {
        let source = DecisionSource::VipBlackWords;
        ballot.offer(DecisionClass::Reject.score(), source.priority());
        all_decisions.insert(
            source.priority().to_string(),
            json!(ctx.vip_black_words_result),
        );
    }

    if ctx.use_vip_white && !ctx.vip_white_words_result.is_empty() {
        let source = DecisionSource::VipWhiteWords;
        ballot.offer(DecisionClass::Pass.score(), source.priority());
        all_decisions.insert(
            source.priority().to_string(),
            json!(ctx.vip_white_words_result),
        );
    }

    if !ctx.final_result.is_empty() {
        let source = DecisionSource::NormalRule;
        let (score, details) = rank_by_normal_rules(ctx, global_rules, custom)?;
        ballot.offer(score, source.priority());
        all_decisions.insert(source.priority().to_string(), details);
    }

    if ctx.use_vip_black {
        if let Some(bundle) = vip.filter(|b| !b.black_rules.is_empty()) {
            let source = DecisionSource::VipBlackRule;
            if let Some((score, details)) = rank_by_vip_rules(&ctx.final_result, &bundle.black_rules)
            {
                ballot.offer(score, source.priority());
                all_decisions.insert(source.priority().to_string(), details);
            }
        }
    }

    if ctx.use_vip_white {
        if let Some(bundle) = vip.filter(|b| !b.white_rules.is_empty()) {
            let source = DecisionSource::VipWhiteRule;
            if let Some((score, details)) = rank_by_vip_rules(&ctx.final_result, &bundle.white_rules)
            {
                ballot.offer(score, source.priority());
                all_decisions.insert(source.priority().to_string(), details);
            }
        }
    }

    let verdict = ballot.best.unwrap_or(Verdict {
        score: DecisionClass::Pass.score(),
        priority: -1,
    });
    // Reject anything outside the known enum before it reaches a caller.
    DecisionClass::from_score(verdict.score)?;

    ctx.final_decision = verdict;
    ctx.all_decision_dict = all_decisions;
    Ok(())
}
