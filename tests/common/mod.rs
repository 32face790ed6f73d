//! Shared test fixtures: an in-memory policy source with fetch counting.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use promptgate::decision::DecisionClass;
use promptgate::error::Result;
use promptgate::matcher::KeywordEntry;
use promptgate::policy::{DataSource, VipPolicyRows};

/// In-memory policy store. Tenant fetches are counted and artificially
/// slowed a little to widen the race window in concurrency tests.
#[derive(Default)]
pub struct MemorySource {
    pub global_keywords: Vec<KeywordEntry>,
    pub global_rules: BTreeMap<String, DecisionClass>,
    pub tenant_black: Vec<KeywordEntry>,
    pub tenant_white: Vec<String>,
    pub tenant_rules: BTreeMap<String, DecisionClass>,
    pub vip_black_words: Vec<KeywordEntry>,
    pub vip_white_words: Vec<KeywordEntry>,
    pub vip_black_rules: BTreeMap<String, DecisionClass>,
    pub vip_white_rules: BTreeMap<String, DecisionClass>,
    pub tenant_fetches: AtomicUsize,
    pub vip_fetches: AtomicUsize,
}

impl MemorySource {
    pub fn with_global(words: &[(&str, &str)], rules: &[(&str, DecisionClass)]) -> Self {
        Self {
            global_keywords: words
                .iter()
                .map(|(w, t)| KeywordEntry::new(*w, *t))
                .collect(),
            global_rules: rules
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            ..Self::default()
        }
    }

    pub fn tenant_fetch_count(&self) -> usize {
        self.tenant_fetches.load(Ordering::SeqCst)
    }

    pub fn vip_fetch_count(&self) -> usize {
        self.vip_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn load_global_keywords(&self) -> Result<Vec<KeywordEntry>> {
        Ok(self.global_keywords.clone())
    }

    async fn load_global_rules(&self) -> Result<BTreeMap<String, DecisionClass>> {
        Ok(self.global_rules.clone())
    }

    async fn load_tenant_keywords(
        &self,
        _app_id: &str,
    ) -> Result<(Vec<KeywordEntry>, Vec<String>)> {
        self.tenant_fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok((self.tenant_black.clone(), self.tenant_white.clone()))
    }

    async fn load_tenant_rules(&self, _app_id: &str) -> Result<BTreeMap<String, DecisionClass>> {
        Ok(self.tenant_rules.clone())
    }

    async fn load_vip_policy(&self, _app_id: &str) -> Result<VipPolicyRows> {
        self.vip_fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(VipPolicyRows {
            black_words: self.vip_black_words.clone(),
            black_rules: self.vip_black_rules.clone(),
            white_words: self.vip_white_words.clone(),
            white_rules: self.vip_white_rules.clone(),
        })
    }
}
