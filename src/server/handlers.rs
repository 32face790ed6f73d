//! HTTP request handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::state::AppState;
use crate::decision::Verdict;
use crate::error::GateError;
use crate::pipeline::flow::run_moderation;
use crate::pipeline::RequestContext;
use crate::rewrite::RewriteOutcome;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
        .route("/v1/check", post(check))
        .with_state(state.clone());

    if state.config.cors_enabled {
        router = router.layer(CorsLayer::permissive());
    }
    if state.config.logging {
        router = router.layer(TraceLayer::new_for_http());
    }
    router
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Status endpoint
async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (custom, vip) = state.gate.cache.cached_tenants().await;
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.uptime().as_secs(),
        "cached_custom_tenants": custom,
        "cached_vip_tenants": vip,
    }))
}

/// Moderation request
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub request_id: String,
    pub app_id: String,
    pub apikey: String,
    pub input_prompt: String,
    #[serde(default)]
    pub use_customize_white: bool,
    #[serde(default)]
    pub use_customize_words: bool,
    #[serde(default)]
    pub use_customize_rule: bool,
    #[serde(default)]
    pub use_vip_black: bool,
    #[serde(default)]
    pub use_vip_white: bool,
}

impl CheckRequest {
    fn validate(&self) -> Result<(), GateError> {
        if self.request_id.is_empty() {
            return Err(GateError::Validation("request_id must not be empty".into()));
        }
        if self.app_id.len() < 3 || self.app_id.len() > 20 {
            return Err(GateError::Validation(
                "app_id must be 3..=20 characters".into(),
            ));
        }
        if self.apikey.is_empty() {
            return Err(GateError::Validation("apikey must not be empty".into()));
        }
        if self.input_prompt.is_empty() {
            return Err(GateError::Validation(
                "input_prompt must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Moderation response
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub request_id: String,
    pub final_decision: Verdict,
    pub all_decision_dict: BTreeMap<String, serde_json::Value>,
    pub final_result: BTreeMap<String, Vec<String>>,
    pub safety: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<RewriteOutcome>,
}

/// Error body for failed requests. A failed request never carries a PASS
/// verdict.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: &'static str,
}

fn status_for(err: &GateError) -> StatusCode {
    match err {
        GateError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        GateError::UnsupportedCacheKind(_) => StatusCode::BAD_REQUEST,
        GateError::DataSource(_) => StatusCode::SERVICE_UNAVAILABLE,
        GateError::Network(_) | GateError::Upstream(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Run one prompt through the moderation pipeline
async fn check(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CheckRequest>,
) -> impl IntoResponse {
    if let Err(err) = request.validate() {
        return (
            status_for(&err),
            Json(serde_json::json!(ErrorResponse {
                error: err.to_string(),
                error_code: err.code(),
            })),
        );
    }

    let mut ctx = RequestContext::new(
        request.request_id.clone(),
        request.app_id,
        request.input_prompt,
    );
    ctx.use_customize_white = request.use_customize_white;
    ctx.use_customize_words = request.use_customize_words;
    ctx.use_customize_rule = request.use_customize_rule;
    ctx.use_vip_black = request.use_vip_black;
    ctx.use_vip_white = request.use_vip_white;

    match run_moderation(&state.pipeline, ctx).await {
        Ok(ctx) => (
            StatusCode::OK,
            Json(serde_json::json!(CheckResponse {
                request_id: ctx.request_id,
                final_decision: ctx.final_decision,
                all_decision_dict: ctx.all_decision_dict,
                final_result: ctx.final_result,
                safety: ctx.safety,
                rewrite: ctx.rewrite,
            })),
        ),
        Err(err) => {
            tracing::error!(request_id = %request.request_id, error = %err, "moderation failed");
            (
                status_for(&err),
                Json(serde_json::json!(ErrorResponse {
                    error: err.to_string(),
                    error_code: err.code(),
                })),
            )
        },
    }
}
