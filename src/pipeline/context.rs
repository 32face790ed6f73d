//! Per-request state.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::decision::Verdict;
use crate::guard::RiskCategory;
use crate::rewrite::RewriteOutcome;

/// Mutable state carried through one pipeline run.
///
/// Owned by exactly one request; steps within a stage may run concurrently
/// but each writes its own fields. Nothing here outlives the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub request_id: String,
    pub app_id: String,
    /// Prompt text; replaced by its normalized form in stage one.
    pub input_prompt: String,
    /// Raw prompt as received, kept for auditing.
    pub original_input_prompt: String,

    pub use_customize_white: bool,
    pub use_customize_words: bool,
    pub use_customize_rule: bool,
    pub use_vip_black: bool,
    pub use_vip_white: bool,

    /// Global-tier scan hits: tag_code -> matched words.
    pub global_result: BTreeMap<String, Vec<String>>,
    /// Tenant blacklist scan hits.
    pub customize_result: BTreeMap<String, Vec<String>>,
    /// VIP black word hits; any hit decides REJECT at top priority.
    pub vip_black_words_result: BTreeMap<String, Vec<String>>,
    /// VIP white word hits; any hit decides PASS just below VIP black.
    pub vip_white_words_result: BTreeMap<String, Vec<String>>,
    /// Keywords suppressed by an exemption phrase during the global scan.
    pub exempted: HashSet<String>,

    /// Guard classification label (upper-case), joined into rule keys.
    pub safety: String,
    pub category: Option<RiskCategory>,

    /// Merged global+custom hits after whitelist filtering.
    pub final_result: BTreeMap<String, Vec<String>>,

    /// Settled verdict. `{-1, -1}` until the decision stage ran.
    pub final_decision: Verdict,
    /// Every source's independent decision, keyed by source priority.
    pub all_decision_dict: BTreeMap<String, serde_json::Value>,

    /// Present only when a REWRITE verdict triggered the collaborator and it
    /// answered.
    pub rewrite: Option<RewriteOutcome>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            request_id: String::new(),
            app_id: String::new(),
            input_prompt: String::new(),
            original_input_prompt: String::new(),
            use_customize_white: false,
            use_customize_words: false,
            use_customize_rule: false,
            use_vip_black: false,
            use_vip_white: false,
            global_result: BTreeMap::new(),
            customize_result: BTreeMap::new(),
            vip_black_words_result: BTreeMap::new(),
            vip_white_words_result: BTreeMap::new(),
            exempted: HashSet::new(),
            safety: String::new(),
            category: None,
            final_result: BTreeMap::new(),
            final_decision: Verdict {
                score: -1,
                priority: -1,
            },
            all_decision_dict: BTreeMap::new(),
            rewrite: None,
        }
    }
}

impl RequestContext {
    /// Fresh context for one prompt.
    pub fn new(
        request_id: impl Into<String>,
        app_id: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            app_id: app_id.into(),
            input_prompt: prompt.into(),
            ..Self::default()
        }
    }
}
