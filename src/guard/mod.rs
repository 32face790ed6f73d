//! Guard-model classification collaborator.
//!
//! The external guard model labels a prompt Safe/Unsafe/Controversial with
//! an optional risk category. Classification runs once per request, in
//! parallel with keyword scanning; the label feeds the normal-rule join key
//! (`"{tag_code}-{label}"`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};

/// Safety label emitted by the guard model. Serialized upper-case because
/// the rule tables key on the upper-case form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SafetyLabel {
    Safe,
    Unsafe,
    Controversial,
}

impl std::fmt::Display for SafetyLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SafetyLabel::Safe => write!(f, "SAFE"),
            SafetyLabel::Unsafe => write!(f, "UNSAFE"),
            SafetyLabel::Controversial => write!(f, "CONTROVERSIAL"),
        }
    }
}

/// Risk category attached to non-safe labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Violent,
    IllegalNonViolent,
    Sexual,
    Pii,
    SelfHarm,
    Unethical,
    Political,
    Copyright,
    Jailbreak,
}

/// One classification result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardVerdict {
    pub safety: SafetyLabel,
    #[serde(default)]
    pub category: Option<RiskCategory>,
}

/// Guard classification interface.
#[async_trait]
pub trait GuardClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<GuardVerdict>;
}

/// HTTP-backed guard classifier.
pub struct HttpGuardClassifier {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

impl HttpGuardClassifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl GuardClassifier for HttpGuardClassifier {
    async fn classify(&self, text: &str) -> Result<GuardVerdict> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ClassifyRequest { text })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GateError::Upstream(format!(
                "guard model returned {}",
                response.status()
            )));
        }

        let verdict: GuardVerdict = response
            .json()
            .await
            .map_err(|e| GateError::Upstream(format!("malformed guard response: {e}")))?;
        Ok(verdict)
    }
}

/// Fixed-label classifier for tests and the offline CLI.
pub struct StaticGuard {
    pub safety: SafetyLabel,
    pub category: Option<RiskCategory>,
}

impl StaticGuard {
    pub fn safe() -> Self {
        Self {
            safety: SafetyLabel::Safe,
            category: None,
        }
    }

    pub fn new(safety: SafetyLabel, category: Option<RiskCategory>) -> Self {
        Self { safety, category }
    }
}

#[async_trait]
impl GuardClassifier for StaticGuard {
    async fn classify(&self, _text: &str) -> Result<GuardVerdict> {
        Ok(GuardVerdict {
            safety: self.safety,
            category: self.category,
        })
    }
}
