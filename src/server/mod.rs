//! PromptGate HTTP server.
//!
//! Provides the minimal moderation surface:
//! - `POST /v1/check` runs one prompt through the pipeline
//! - `GET /health`, `GET /status`
//!
//! # Example
//!
//! ```rust,ignore
//! use promptgate::server::{create_router, AppState, ServerConfig};
//!
//! let state = Arc::new(AppState::new(ServerConfig::default(), gate));
//! let app = create_router(state);
//! axum::serve(listener, app).await?;
//! ```

mod config;
mod handlers;
mod state;

pub use config::ServerConfig;
pub use handlers::{create_router, health_check, CheckRequest, CheckResponse};
pub use state::AppState;
