//! The moderation flow.
//!
//! Wires the shared services into the four-stage pipeline every request
//! runs: normalize + policy load, then the four scans and the guard
//! classification fanned out together, then merge + decision, then the
//! conditional rewrite.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use super::{Pipeline, RequestContext, SharedContext, Step};
use crate::decision::{make_decision, DecisionClass};
use crate::error::{GateError, Result};
use crate::guard::GuardClassifier;
use crate::matcher::normalize_prompt;
use crate::policy::{CacheKind, PolicyCache};
use crate::rewrite::Rewriter;

/// Shared gate services, constructed once at startup and handed by reference
/// to every pipeline run.
pub struct Gate {
    pub cache: Arc<PolicyCache>,
    pub guard: Arc<dyn GuardClassifier>,
    pub rewriter: Arc<dyn Rewriter>,
    /// Byte window for exemption phrases; 0 matches anywhere in the text.
    pub exemption_distance: usize,
}

impl Gate {
    pub fn new(
        cache: Arc<PolicyCache>,
        guard: Arc<dyn GuardClassifier>,
        rewriter: Arc<dyn Rewriter>,
        exemption_distance: usize,
    ) -> Self {
        Self {
            cache,
            guard,
            rewriter,
            exemption_distance,
        }
    }
}

/// Build the per-request moderation pipeline. The shape is static; the
/// returned pipeline is reused for every request.
pub fn moderation_pipeline(gate: Arc<Gate>) -> Pipeline {
    Pipeline::new()
        .stage(vec![normalize_step(), load_policies_step(gate.clone())])
        .stage(vec![
            global_scan_step(gate.clone()),
            customize_scan_step(gate.clone()),
            vip_black_scan_step(gate.clone()),
            vip_white_scan_step(gate.clone()),
            classify_step(gate.clone()),
        ])
        .stage(vec![resolve_step(gate.clone())])
        .stage(vec![rewrite_step(gate)])
}

fn normalize_step() -> Step {
    Step::new("normalize", |ctx: SharedContext| async move {
        let mut guard = ctx.write().await;
        let normalized = normalize_prompt(&guard.input_prompt);
        guard.original_input_prompt = std::mem::replace(&mut guard.input_prompt, normalized);
        Ok(())
    })
}

fn load_policies_step(gate: Arc<Gate>) -> Step {
    Step::new("load-policies", move |ctx: SharedContext| {
        let gate = gate.clone();
        async move {
            let (app_id, need_custom, need_vip) = {
                let guard = ctx.read().await;
                (
                    guard.app_id.clone(),
                    guard.use_customize_words
                        | guard.use_customize_rule
                        | guard.use_customize_white,
                    guard.use_vip_black | guard.use_vip_white,
                )
            };

            gate.cache.ensure_global().await?;
            if need_custom {
                gate.cache.ensure_tenant(&app_id, CacheKind::Customize).await?;
            }
            if need_vip {
                gate.cache.ensure_tenant(&app_id, CacheKind::Vip).await?;
            }
            Ok(())
        }
    })
}

fn global_scan_step(gate: Arc<Gate>) -> Step {
    Step::new("global-scan", move |ctx: SharedContext| {
        let gate = gate.clone();
        async move {
            let text = ctx.read().await.input_prompt.clone();
            let outcome = gate.cache.scan_global(&text, gate.exemption_distance).await?;
            let mut guard = ctx.write().await;
            guard.global_result = outcome.hits;
            guard.exempted = outcome.exempted;
            Ok(())
        }
    })
}

fn customize_scan_step(gate: Arc<Gate>) -> Step {
    Step::new("customize-scan", move |ctx: SharedContext| {
        let gate = gate.clone();
        async move {
            let (enabled, app_id, text) = {
                let guard = ctx.read().await;
                (
                    guard.use_customize_words,
                    guard.app_id.clone(),
                    guard.input_prompt.clone(),
                )
            };
            if !enabled {
                return Ok(());
            }

            let hits = match gate.cache.custom(&app_id).await {
                Some(bundle) => match &bundle.black {
                    Some(automaton) => automaton.scan(&text, 0).hits,
                    None => BTreeMap::new(),
                },
                // Unloaded tier reads as "no matches", never an error here.
                None => BTreeMap::new(),
            };
            ctx.write().await.customize_result = hits;
            Ok(())
        }
    })
}

fn vip_black_scan_step(gate: Arc<Gate>) -> Step {
    Step::new("vip-black-scan", move |ctx: SharedContext| {
        let gate = gate.clone();
        async move {
            let (enabled, app_id, text) = {
                let guard = ctx.read().await;
                (guard.use_vip_black, guard.app_id.clone(), guard.input_prompt.clone())
            };
            if !enabled {
                return Ok(());
            }

            let hits = match gate.cache.vip(&app_id).await {
                Some(bundle) => match &bundle.black {
                    Some(automaton) => automaton.scan(&text, 0).hits,
                    None => BTreeMap::new(),
                },
                None => BTreeMap::new(),
            };
            ctx.write().await.vip_black_words_result = hits;
            Ok(())
        }
    })
}

fn vip_white_scan_step(gate: Arc<Gate>) -> Step {
    Step::new("vip-white-scan", move |ctx: SharedContext| {
        let gate = gate.clone();
        async move {
            let (enabled, app_id, text) = {
                let guard = ctx.read().await;
                (guard.use_vip_white, guard.app_id.clone(), guard.input_prompt.clone())
            };
            if !enabled {
                return Ok(());
            }

            let hits = match gate.cache.vip(&app_id).await {
                Some(bundle) => match &bundle.white {
                    Some(automaton) => automaton.scan(&text, 0).hits,
                    None => BTreeMap::new(),
                },
                None => BTreeMap::new(),
            };
            ctx.write().await.vip_white_words_result = hits;
            Ok(())
        }
    })
}

fn classify_step(gate: Arc<Gate>) -> Step {
    Step::new("classify", move |ctx: SharedContext| {
        let gate = gate.clone();
        async move {
            let text = ctx.read().await.input_prompt.clone();
            let verdict = gate.guard.classify(&text).await?;
            let mut guard = ctx.write().await;
            guard.safety = verdict.safety.to_string();
            guard.category = verdict.category;
            Ok(())
        }
    })
}

fn resolve_step(gate: Arc<Gate>) -> Step {
    Step::new("resolve", move |ctx: SharedContext| {
        let gate = gate.clone();
        async move {
            let global = gate.cache.global().await.ok_or(GateError::NoWordList)?;
            let app_id = ctx.read().await.app_id.clone();
            let custom = gate.cache.custom(&app_id).await;
            let vip = gate.cache.vip(&app_id).await;

            let mut guard = ctx.write().await;
            merge_final_result(&mut guard, custom.as_deref());
            make_decision(&mut guard, &global.rules, custom.as_deref(), vip.as_deref())
        }
    })
}

fn rewrite_step(gate: Arc<Gate>) -> Step {
    Step::new("rewrite", move |ctx: SharedContext| {
        let gate = gate.clone();
        async move {
            let (score, text, keywords) = {
                let guard = ctx.read().await;
                (
                    guard.final_decision.score,
                    guard.input_prompt.clone(),
                    triggered_keywords(&guard),
                )
            };
            if score != DecisionClass::Rewrite.score() {
                return Ok(());
            }

            match gate.rewriter.rewrite(&text, &keywords).await {
                Ok(outcome) => ctx.write().await.rewrite = Some(outcome),
                // Degrade to "unsafe, no rewrite"; the verdict stands.
                Err(e) => tracing::warn!(error = %e, "rewrite collaborator failed"),
            }
            Ok(())
        }
    })
}

/// Union of matched keywords across every source, deduplicated.
fn triggered_keywords(ctx: &RequestContext) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();
    for words in ctx
        .final_result
        .values()
        .chain(ctx.vip_black_words_result.values())
        .chain(ctx.vip_white_words_result.values())
    {
        for word in words {
            if seen.insert(word.clone()) {
                keywords.push(word.clone());
            }
        }
    }
    keywords
}

/// Merge global and tenant hits per tag, subtract the tenant whitelist, and
/// drop tags left empty. VIP tiers are intentionally untouched here.
fn merge_final_result(ctx: &mut RequestContext, custom: Option<&crate::policy::CustomBundle>) {
    ctx.final_result.clear();

    let tags: Vec<String> = ctx
        .global_result
        .keys()
        .chain(ctx.customize_result.keys())
        .cloned()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    if tags.is_empty() {
        return;
    }

    let white: Option<&HashSet<String>> = custom
        .filter(|_| ctx.use_customize_white)
        .map(|bundle| &bundle.white);

    for tag in tags {
        let mut seen = HashSet::new();
        let mut words = Vec::new();
        for word in ctx
            .global_result
            .get(&tag)
            .into_iter()
            .chain(ctx.customize_result.get(&tag))
            .flatten()
        {
            if white.is_some_and(|set| set.contains(word)) {
                continue;
            }
            if seen.insert(word.clone()) {
                words.push(word.clone());
            }
        }
        if !words.is_empty() {
            ctx.final_result.insert(tag, words);
        }
    }
}

/// Validate and run one request against the pipeline, returning the settled
/// context.
pub async fn run_moderation(pipeline: &Pipeline, ctx: RequestContext) -> Result<RequestContext> {
    let shared: SharedContext = Arc::new(tokio::sync::RwLock::new(ctx));
    let shared = pipeline.run(shared).await?;
    let ctx = Arc::try_unwrap(shared)
        .map_err(|_| GateError::Server("pipeline leaked context handle".into()))?
        .into_inner();
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_subtracts_whitelist_when_opted_in() {
        let mut ctx = RequestContext::default();
        ctx.use_customize_white = true;
        ctx.global_result
            .insert("VIOLENT".into(), vec!["bomb".into(), "harmless".into()]);
        ctx.customize_result
            .insert("VIOLENT".into(), vec!["bomb".into(), "knife".into()]);

        let custom = crate::policy::CustomBundle {
            black: None,
            white: HashSet::from(["harmless".to_string()]),
            rules: BTreeMap::new(),
        };
        merge_final_result(&mut ctx, Some(&custom));

        let words = ctx.final_result.get("VIOLENT").unwrap();
        assert!(words.contains(&"bomb".to_string()));
        assert!(words.contains(&"knife".to_string()));
        assert!(!words.contains(&"harmless".to_string()));
        // Merged words deduplicate across tiers.
        assert_eq!(words.iter().filter(|w| *w == "bomb").count(), 1);
    }

    #[test]
    fn test_merge_ignores_whitelist_without_opt_in() {
        let mut ctx = RequestContext::default();
        ctx.global_result
            .insert("VIOLENT".into(), vec!["harmless".into()]);

        let custom = crate::policy::CustomBundle {
            black: None,
            white: HashSet::from(["harmless".to_string()]),
            rules: BTreeMap::new(),
        };
        merge_final_result(&mut ctx, Some(&custom));
        assert!(ctx.final_result.contains_key("VIOLENT"));
    }

    #[test]
    fn test_merge_drops_fully_whitelisted_tags() {
        let mut ctx = RequestContext::default();
        ctx.use_customize_white = true;
        ctx.global_result
            .insert("VIOLENT".into(), vec!["harmless".into()]);

        let custom = crate::policy::CustomBundle {
            black: None,
            white: HashSet::from(["harmless".to_string()]),
            rules: BTreeMap::new(),
        };
        merge_final_result(&mut ctx, Some(&custom));
        assert!(ctx.final_result.is_empty());
    }

    #[test]
    fn test_triggered_keywords_union() {
        let mut ctx = RequestContext::default();
        ctx.final_result
            .insert("VIOLENT".into(), vec!["bomb".into()]);
        ctx.vip_black_words_result
            .insert("BANNED".into(), vec!["bomb".into(), "guns".into()]);
        let keywords = triggered_keywords(&ctx);
        assert_eq!(keywords.len(), 2);
        assert!(keywords.contains(&"bomb".to_string()));
        assert!(keywords.contains(&"guns".to_string()));
    }
}
