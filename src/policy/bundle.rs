//! Per-tenant policy bundles.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::decision::DecisionClass;
use crate::matcher::KeywordAutomaton;

/// Tenant-customized policy tier: black/white keyword lists plus rule
/// overrides keyed by `"tag_code-classification_label"`.
pub struct CustomBundle {
    /// Tenant blacklist automaton, absent when the tenant has none.
    pub black: Option<Arc<KeywordAutomaton>>,
    /// Tenant whitelist; matched words in this set are dropped from the
    /// merged scan result.
    pub white: HashSet<String>,
    /// Tenant rule overrides applied over the global defaults.
    pub rules: BTreeMap<String, DecisionClass>,
}

/// VIP override tier: word lists that decide outright, and rule tables
/// joined against the merged tag output.
pub struct VipBundle {
    pub black: Option<Arc<KeywordAutomaton>>,
    pub white: Option<Arc<KeywordAutomaton>>,
    pub black_rules: BTreeMap<String, DecisionClass>,
    pub white_rules: BTreeMap<String, DecisionClass>,
}

/// Global tier: the startup automaton and the default rule table.
///
/// Built once, immutable afterwards; readers need no lock.
pub struct GlobalPolicy {
    pub automaton: Arc<KeywordAutomaton>,
    pub rules: BTreeMap<String, DecisionClass>,
}
