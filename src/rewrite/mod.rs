//! Rewrite collaborator.
//!
//! Invoked only when the verdict is REWRITE: the prompt plus the union of
//! triggered keywords go to an external LLM that attempts a safe rephrase.
//! A collaborator failure degrades to "unsafe, no rewrite" at the call site
//! instead of failing the request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};

/// Result of one rewrite attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteOutcome {
    /// The model's reading of what the user actually wanted.
    pub user_intent: String,
    /// Rephrased prompt, safe to forward when `is_safe_now` holds.
    pub rewritten_text: String,
    /// Whether the rewrite removed the unsafe content.
    pub is_safe_now: bool,
    /// Which rule the original text tripped, as reported by the model.
    #[serde(default)]
    pub hit_rule: Option<String>,
}

/// Prompt-rewrite interface.
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(&self, text: &str, triggered_keywords: &[String]) -> Result<RewriteOutcome>;
}

/// HTTP-backed rewriter.
pub struct HttpRewriter {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct RewriteRequest<'a> {
    text: &'a str,
    triggered_keywords: &'a [String],
}

impl HttpRewriter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Rewriter for HttpRewriter {
    async fn rewrite(&self, text: &str, triggered_keywords: &[String]) -> Result<RewriteOutcome> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RewriteRequest {
                text,
                triggered_keywords,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GateError::Upstream(format!(
                "rewrite model returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| GateError::Upstream(format!("malformed rewrite response: {e}")))
    }
}

/// Rewriter that never rewrites; used offline and in tests.
pub struct NoopRewriter;

#[async_trait]
impl Rewriter for NoopRewriter {
    async fn rewrite(&self, _text: &str, _keywords: &[String]) -> Result<RewriteOutcome> {
        Ok(RewriteOutcome {
            user_intent: String::new(),
            rewritten_text: String::new(),
            is_safe_now: false,
            hit_rule: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_rewriter_is_not_safe() {
        let outcome = NoopRewriter.rewrite("text", &[]).await.unwrap();
        assert!(!outcome.is_safe_now);
        assert!(outcome.rewritten_text.is_empty());
    }
}
