//! Policy data sources.
//!
//! One interface over interchangeable backing stores. The cache never
//! branches on the store type; a relational backend and the bundled JSON
//! file backend both surface the same rows. All methods are read-only and
//! idempotent; failures map to [`GateError::DataSource`] and are not retried
//! here — the cache defers the tenant bundle to the next request.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::decision::DecisionClass;
use crate::error::{GateError, Result};
use crate::matcher::KeywordEntry;

/// VIP policy rows for one tenant, partitioned by match type and strategy.
#[derive(Default)]
pub struct VipPolicyRows {
    pub black_words: Vec<KeywordEntry>,
    pub black_rules: BTreeMap<String, DecisionClass>,
    pub white_words: Vec<KeywordEntry>,
    pub white_rules: BTreeMap<String, DecisionClass>,
}

/// Read-only policy store consumed by the cache.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Global keyword set.
    async fn load_global_keywords(&self) -> Result<Vec<KeywordEntry>>;

    /// Global rule defaults keyed by `"tag_code-extra_condition"`.
    async fn load_global_rules(&self) -> Result<BTreeMap<String, DecisionClass>>;

    /// Tenant keyword lists, partitioned by category flag (0=white, 1=black).
    async fn load_tenant_keywords(
        &self,
        app_id: &str,
    ) -> Result<(Vec<KeywordEntry>, Vec<String>)>;

    /// Tenant rule overrides keyed like the global table.
    async fn load_tenant_rules(&self, app_id: &str) -> Result<BTreeMap<String, DecisionClass>>;

    /// VIP word lists and rule tables for one tenant.
    async fn load_vip_policy(&self, app_id: &str) -> Result<VipPolicyRows>;
}

/// Composite join key: `"{match_value}-{extra_condition}"`, trailing dash
/// stripped when the extra condition is empty. This exact shape is what scan
/// tags plus the classification label join against.
pub fn rule_key(match_value: &str, extra_condition: Option<&str>) -> String {
    let extra = extra_condition.unwrap_or("");
    format!("{match_value}-{extra}")
        .trim_end_matches('-')
        .to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct GlobalKeywordRow {
    keyword: String,
    tag_code: String,
    #[serde(default)]
    risk_level: Option<String>,
    #[serde(default)]
    exemptions: Option<Vec<String>>,
    #[serde(default = "default_true")]
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct ScenarioKeywordRow {
    scenario_id: String,
    keyword: String,
    #[serde(default)]
    tag_code: Option<String>,
    /// 0 = white, 1 = black.
    category: i64,
    #[serde(default)]
    risk_level: Option<String>,
    #[serde(default)]
    exemptions: Option<Vec<String>>,
    #[serde(default = "default_true")]
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct ScenarioPolicyRow {
    scenario_id: String,
    /// `TAG` joins against scan output; `KEYWORD` feeds a VIP word list.
    match_type: String,
    match_value: String,
    #[serde(default)]
    extra_condition: Option<String>,
    strategy: String,
    /// 1 = custom scenario rule, 0 = VIP override.
    rule_mode: i64,
    #[serde(default = "default_true")]
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct GlobalDefaultRow {
    tag_code: String,
    #[serde(default)]
    extra_condition: Option<String>,
    strategy: String,
    #[serde(default = "default_true")]
    is_active: bool,
}

/// Flat-file policy store reading JSON exports.
///
/// Expects `global_keywords.json`, `global_defaults.json`,
/// `scenario_keywords.json` and `scenario_policies.json` under the base
/// path. A missing file yields empty data; a malformed file is an error.
pub struct FileDataSource {
    base_path: PathBuf,
}

impl FileDataSource {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    async fn read_rows<T: serde::de::DeserializeOwned>(&self, filename: &str) -> Result<Vec<T>> {
        let path: PathBuf = self.base_path.join(filename);
        if !Path::new(&path).exists() {
            return Ok(Vec::new());
        }
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| GateError::DataSource(format!("failed to read {filename}: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| GateError::DataSource(format!("failed to parse {filename}: {e}")))
    }
}

#[async_trait]
impl DataSource for FileDataSource {
    async fn load_global_keywords(&self) -> Result<Vec<KeywordEntry>> {
        let rows: Vec<GlobalKeywordRow> = self.read_rows("global_keywords.json").await?;
        Ok(rows
            .into_iter()
            .filter(|r| r.is_active)
            .map(|r| KeywordEntry {
                keyword: r.keyword,
                tag_code: r.tag_code,
                risk_level: r.risk_level,
                exemptions: r.exemptions,
                scenario_id: None,
            })
            .collect())
    }

    async fn load_global_rules(&self) -> Result<BTreeMap<String, DecisionClass>> {
        let rows: Vec<GlobalDefaultRow> = self.read_rows("global_defaults.json").await?;
        let mut table = BTreeMap::new();
        for row in rows.into_iter().filter(|r| r.is_active) {
            let key = rule_key(&row.tag_code, row.extra_condition.as_deref());
            table.insert(key, DecisionClass::from_strategy(&row.strategy)?);
        }
        Ok(table)
    }

    async fn load_tenant_keywords(
        &self,
        app_id: &str,
    ) -> Result<(Vec<KeywordEntry>, Vec<String>)> {
        let rows: Vec<ScenarioKeywordRow> = self.read_rows("scenario_keywords.json").await?;
        let mut black = Vec::new();
        let mut white = Vec::new();
        for row in rows
            .into_iter()
            .filter(|r| r.is_active && r.scenario_id == app_id)
        {
            if row.category == 1 {
                // Blacklist entries without a tag cannot be ranked; skip them.
                let Some(tag_code) = row.tag_code.filter(|t| !t.trim().is_empty()) else {
                    continue;
                };
                black.push(KeywordEntry {
                    keyword: row.keyword,
                    tag_code,
                    risk_level: row.risk_level,
                    exemptions: row.exemptions,
                    scenario_id: Some(row.scenario_id),
                });
            } else {
                white.push(row.keyword);
            }
        }
        Ok((black, white))
    }

    async fn load_tenant_rules(&self, app_id: &str) -> Result<BTreeMap<String, DecisionClass>> {
        let rows: Vec<ScenarioPolicyRow> = self.read_rows("scenario_policies.json").await?;
        let mut table = BTreeMap::new();
        for row in rows.into_iter().filter(|r| {
            r.is_active && r.rule_mode == 1 && r.match_type == "TAG" && r.scenario_id == app_id
        }) {
            let key = rule_key(&row.match_value, row.extra_condition.as_deref());
            table.insert(key, DecisionClass::from_strategy(&row.strategy)?);
        }
        Ok(table)
    }

    async fn load_vip_policy(&self, app_id: &str) -> Result<VipPolicyRows> {
        let rows: Vec<ScenarioPolicyRow> = self.read_rows("scenario_policies.json").await?;
        let mut vip = VipPolicyRows::default();
        for row in rows
            .into_iter()
            .filter(|r| r.is_active && r.rule_mode == 0 && r.scenario_id == app_id)
        {
            let decision = DecisionClass::from_strategy(&row.strategy)?;
            match row.match_type.as_str() {
                "KEYWORD" => {
                    let tag = row
                        .extra_condition
                        .clone()
                        .filter(|c| !c.trim().is_empty())
                        .unwrap_or_else(|| row.match_value.clone());
                    let entry = KeywordEntry {
                        keyword: row.match_value,
                        tag_code: tag,
                        risk_level: None,
                        exemptions: None,
                        scenario_id: Some(row.scenario_id),
                    };
                    if decision == DecisionClass::Pass {
                        vip.white_words.push(entry);
                    } else {
                        vip.black_words.push(entry);
                    }
                },
                "TAG" => {
                    let key = rule_key(&row.match_value, row.extra_condition.as_deref());
                    // PASS rows whitelist; every other strategy restricts and
                    // keeps its decision for the ranking stage.
                    if decision == DecisionClass::Pass {
                        vip.white_rules.insert(key, decision);
                    } else {
                        vip.black_rules.insert(key, decision);
                    }
                },
                other => {
                    return Err(GateError::DataSource(format!(
                        "unknown match_type: {other}"
                    )))
                },
            }
        }
        Ok(vip)
    }
}
