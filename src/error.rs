//! PromptGate error types.
//!
//! One crate-wide error enum in the taxonomy the decision path relies on:
//! data-completeness failures (`RuleKeyNotFound`) and decision mismatches
//! (`NoDecisionFound`) are hard errors that abort a request, while a
//! `DataSource` failure only defers the tenant bundle to the next request.
//! None of these may ever be downgraded to a PASS verdict.

use thiserror::Error;

/// PromptGate errors.
#[derive(Error, Debug)]
pub enum GateError {
    /// An automaton was queried before any word list was loaded.
    #[error("No word list loaded")]
    NoWordList,

    /// Unknown cache build kind. Caller bug.
    #[error("Unsupported cache kind: {0}")]
    UnsupportedCacheKind(String),

    /// A tag/classification combination has no global rule default.
    ///
    /// This is a data completeness error. It is surfaced loudly because
    /// silently defaulting to PASS would be a safety hole.
    #[error("Key not in rule table: {0}")]
    RuleKeyNotFound(String),

    /// Backing store unavailable or returned malformed data.
    #[error("Data source error: {0}")]
    DataSource(String),

    /// A decision score outside the known enum was produced.
    #[error("No decision found for score: {0}")]
    NoDecisionFound(i64),

    /// Request failed validation before entering the pipeline.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network communication error.
    #[error("Network error: {0}")]
    Network(String),

    /// Guard or rewrite collaborator returned an error.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Server-side error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for gate operations
pub type Result<T> = std::result::Result<T, GateError>;

impl GateError {
    /// Stable machine-readable code for API responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            GateError::NoWordList => "NO_WORD_LIST_ERROR",
            GateError::UnsupportedCacheKind(_) => "NO_MATCHED_AC_TYPE_ERROR",
            GateError::RuleKeyNotFound(_) => "KEY_NOT_IN_RULE_ERROR",
            GateError::DataSource(_) => "DATA_SOURCE_ERROR",
            GateError::NoDecisionFound(_) => "NO_DECISION_FOUND_ERROR",
            GateError::Validation(_) => "VALIDATION_ERROR",
            GateError::Network(_) => "NETWORK_ERROR",
            GateError::Upstream(_) => "UPSTREAM_ERROR",
            GateError::Server(_) => "INTERNAL_ERROR",
            GateError::Config(_) => "CONFIG_ERROR",
            GateError::Json(_) => "JSON_ERROR",
            GateError::Io(_) => "IO_ERROR",
        }
    }
}

impl From<reqwest::Error> for GateError {
    fn from(err: reqwest::Error) -> Self {
        GateError::Network(err.to_string())
    }
}

impl From<toml::de::Error> for GateError {
    fn from(err: toml::de::Error) -> Self {
        GateError::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for GateError {
    fn from(err: tokio::task::JoinError) -> Self {
        GateError::Server(format!("background task failed: {err}"))
    }
}
