//! Policy cache.
//!
//! Single authoritative holder of the global automaton/rule table and of all
//! tenant bundles. Tenant bundles populate lazily, exactly once, under
//! concurrent load: a fast read of the published map, then a per-tenant
//! per-kind lock taken from a lock table whose *insertion* is guarded by one
//! table-wide lock, then a re-check before building. Unrelated tenants never
//! serialize behind each other; duplicate automaton construction cannot
//! happen. A data-source failure leaves the slot unloaded so the next
//! request retries the build.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task;

use super::bundle::{CustomBundle, GlobalPolicy, VipBundle};
use super::source::DataSource;
use crate::error::{GateError, Result};
use crate::matcher::{KeywordAutomaton, KeywordEntry, ScanOutcome};

/// Lazily-built cache tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Customize,
    Vip,
}

impl FromStr for CacheKind {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "customize" => Ok(CacheKind::Customize),
            "vip" => Ok(CacheKind::Vip),
            other => Err(GateError::UnsupportedCacheKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for CacheKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKind::Customize => write!(f, "customize"),
            CacheKind::Vip => write!(f, "vip"),
        }
    }
}

/// Process-wide policy holder, injected into every pipeline run.
pub struct PolicyCache {
    source: Arc<dyn DataSource>,
    global: RwLock<Option<Arc<GlobalPolicy>>>,
    global_build: Mutex<()>,
    custom: RwLock<HashMap<String, Arc<CustomBundle>>>,
    vip: RwLock<HashMap<String, Arc<VipBundle>>>,
    /// Per-tenant per-kind build locks; insertion guarded by the outer mutex,
    /// never the build itself.
    locks: Mutex<HashMap<(String, CacheKind), Arc<Mutex<()>>>>,
}

impl PolicyCache {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self {
            source,
            global: RwLock::new(None),
            global_build: Mutex::new(()),
            custom: RwLock::new(HashMap::new()),
            vip: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Load the global keyword set and rule table. Idempotent; later calls
    /// are no-ops once loaded.
    pub async fn ensure_global(&self) -> Result<()> {
        if self.global.read().await.is_some() {
            return Ok(());
        }
        let _guard = self.global_build.lock().await;
        if self.global.read().await.is_some() {
            return Ok(());
        }

        let keywords = self.source.load_global_keywords().await?;
        let rules = self.source.load_global_rules().await?;
        let automaton = build_automaton(keywords).await?;

        tracing::info!(patterns = automaton.len(), rules = rules.len(), "global policy loaded");
        *self.global.write().await = Some(Arc::new(GlobalPolicy { automaton, rules }));
        Ok(())
    }

    /// Ensure the tenant bundle of `kind` is loaded, building it at most once
    /// under concurrent first access.
    pub async fn ensure_tenant(&self, app_id: &str, kind: CacheKind) -> Result<()> {
        // Fast path: published bundle, no lock contention.
        let loaded = match kind {
            CacheKind::Customize => self.custom.read().await.contains_key(app_id),
            CacheKind::Vip => self.vip.read().await.contains_key(app_id),
        };
        if loaded {
            return Ok(());
        }

        let lock = self.lock_for(app_id, kind).await;
        let _guard = lock.lock().await;

        // Re-check: another caller may have finished while we waited.
        match kind {
            CacheKind::Customize => {
                if self.custom.read().await.contains_key(app_id) {
                    return Ok(());
                }
                let bundle = self.build_custom(app_id).await?;
                self.custom
                    .write()
                    .await
                    .insert(app_id.to_string(), Arc::new(bundle));
            },
            CacheKind::Vip => {
                if self.vip.read().await.contains_key(app_id) {
                    return Ok(());
                }
                let bundle = self.build_vip(app_id).await?;
                self.vip
                    .write()
                    .await
                    .insert(app_id.to_string(), Arc::new(bundle));
            },
        }
        tracing::info!(app_id = %app_id, kind = %kind, "tenant bundle loaded");
        Ok(())
    }

    /// Fetch (or lazily create) the build lock for one tenant+kind.
    async fn lock_for(&self, app_id: &str, kind: CacheKind) -> Arc<Mutex<()>> {
        let mut table = self.locks.lock().await;
        table
            .entry((app_id.to_string(), kind))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn build_custom(&self, app_id: &str) -> Result<CustomBundle> {
        let (black_list, white_list) = self.source.load_tenant_keywords(app_id).await?;
        let rules = self.source.load_tenant_rules(app_id).await?;

        let black = if black_list.is_empty() {
            None
        } else {
            Some(build_automaton(black_list).await?)
        };

        Ok(CustomBundle {
            black,
            white: white_list.into_iter().collect(),
            rules,
        })
    }

    async fn build_vip(&self, app_id: &str) -> Result<VipBundle> {
        let rows = self.source.load_vip_policy(app_id).await?;

        let black = if rows.black_words.is_empty() {
            None
        } else {
            Some(build_automaton(rows.black_words).await?)
        };
        let white = if rows.white_words.is_empty() {
            None
        } else {
            Some(build_automaton(rows.white_words).await?)
        };

        Ok(VipBundle {
            black,
            white,
            black_rules: rows.black_rules,
            white_rules: rows.white_rules,
        })
    }

    /// Read-only view of the global tier. `None` until `ensure_global` ran.
    pub async fn global(&self) -> Option<Arc<GlobalPolicy>> {
        self.global.read().await.clone()
    }

    /// Scan against the global automaton. Querying before the global load is
    /// a programming error surfaced as `NoWordList`.
    pub async fn scan_global(&self, text: &str, exemption_distance: usize) -> Result<ScanOutcome> {
        let global = self.global.read().await.clone().ok_or(GateError::NoWordList)?;
        Ok(global.automaton.scan(text, exemption_distance))
    }

    /// Read-only view of one tenant's custom bundle; `None` means unloaded
    /// and is treated as "no matches for that tier" by callers.
    pub async fn custom(&self, app_id: &str) -> Option<Arc<CustomBundle>> {
        self.custom.read().await.get(app_id).cloned()
    }

    /// Read-only view of one tenant's VIP bundle.
    pub async fn vip(&self, app_id: &str) -> Option<Arc<VipBundle>> {
        self.vip.read().await.get(app_id).cloned()
    }

    /// Cached tenant bundle counts `(custom, vip)`, for status reporting.
    pub async fn cached_tenants(&self) -> (usize, usize) {
        (self.custom.read().await.len(), self.vip.read().await.len())
    }
}

/// Build an automaton on the blocking pool; large tenant word lists must not
/// stall the request executor.
async fn build_automaton(entries: Vec<KeywordEntry>) -> Result<Arc<KeywordAutomaton>> {
    let automaton = task::spawn_blocking(move || KeywordAutomaton::build(&entries)).await??;
    Ok(Arc::new(automaton))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionClass;
    use crate::policy::source::VipPolicyRows;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source that counts tenant fetches and can fail on demand.
    struct FlakySource {
        fetches: AtomicUsize,
        fail_first: AtomicUsize,
    }

    impl FlakySource {
        fn new(failures: usize) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                fail_first: AtomicUsize::new(failures),
            }
        }
    }

    #[async_trait]
    impl DataSource for FlakySource {
        async fn load_global_keywords(&self) -> Result<Vec<KeywordEntry>> {
            Ok(vec![KeywordEntry::new("bomb", "VIOLENT")])
        }

        async fn load_global_rules(&self) -> Result<BTreeMap<String, DecisionClass>> {
            Ok(BTreeMap::from([(
                "VIOLENT-UNSAFE".to_string(),
                DecisionClass::Reject,
            )]))
        }

        async fn load_tenant_keywords(
            &self,
            _app_id: &str,
        ) -> Result<(Vec<KeywordEntry>, Vec<String>)> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self
                .fail_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(GateError::DataSource("store down".into()));
            }
            Ok((vec![KeywordEntry::new("custom", "LOCAL")], vec![]))
        }

        async fn load_tenant_rules(&self, _: &str) -> Result<BTreeMap<String, DecisionClass>> {
            Ok(BTreeMap::new())
        }

        async fn load_vip_policy(&self, _: &str) -> Result<VipPolicyRows> {
            Ok(VipPolicyRows::default())
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = CacheKind::from_str("super-vip").unwrap_err();
        match err {
            GateError::UnsupportedCacheKind(kind) => assert_eq!(kind, "super-vip"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(CacheKind::from_str("vip").unwrap(), CacheKind::Vip);
    }

    #[tokio::test]
    async fn test_ensure_global_idempotent() {
        let cache = PolicyCache::new(Arc::new(FlakySource::new(0)));
        cache.ensure_global().await.unwrap();
        cache.ensure_global().await.unwrap();
        assert!(cache.global().await.is_some());
    }

    #[tokio::test]
    async fn test_scan_before_global_load_is_no_word_list() {
        let cache = PolicyCache::new(Arc::new(FlakySource::new(0)));
        assert!(matches!(
            cache.scan_global("text", 0).await,
            Err(GateError::NoWordList)
        ));
    }

    #[tokio::test]
    async fn test_failed_build_retries_on_next_request() {
        let source = Arc::new(FlakySource::new(1));
        let cache = PolicyCache::new(source.clone());

        // First attempt fails and leaves the slot unloaded.
        assert!(cache.ensure_tenant("acme", CacheKind::Customize).await.is_err());
        assert!(cache.custom("acme").await.is_none());

        // Next request retries and succeeds.
        cache.ensure_tenant("acme", CacheKind::Customize).await.unwrap();
        assert!(cache.custom("acme").await.is_some());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_loaded_tenant_short_circuits() {
        let source = Arc::new(FlakySource::new(0));
        let cache = PolicyCache::new(source.clone());
        cache.ensure_tenant("acme", CacheKind::Customize).await.unwrap();
        cache.ensure_tenant("acme", CacheKind::Customize).await.unwrap();
        cache.ensure_tenant("acme", CacheKind::Customize).await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }
}
