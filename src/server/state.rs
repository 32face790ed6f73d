//! Server state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::config::ServerConfig;
use crate::pipeline::flow::{moderation_pipeline, Gate};
use crate::pipeline::Pipeline;

/// Application state shared across handlers
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Shared gate services (cache, guard, rewriter)
    pub gate: Arc<Gate>,
    /// The moderation pipeline; built once, run per request
    pub pipeline: Pipeline,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(config: ServerConfig, gate: Arc<Gate>) -> Self {
        let pipeline = moderation_pipeline(gate.clone());
        Self {
            config,
            gate,
            pipeline,
            start_time: Instant::now(),
        }
    }

    /// Get server uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}
