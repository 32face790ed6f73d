//! # PromptGate - Content safety gate for LLM endpoints
//!
//! Every inbound prompt is scanned for sensitive terms, classified by an
//! external guard model, and resolved to one action — pass, reject, rewrite,
//! or escalate to manual review — under per-tenant policy overrides, VIP
//! overrides, and global defaults.
//!
//! ## Architecture
//!
//! ```text
//! request
//!    │
//!    ▼
//! stage 1 ── normalize text ─┬─ ensure tenant policy loaded
//!    │                       │
//!    ▼                       ▼
//! stage 2 ── global scan ─ custom scan ─ VIP scans ─ guard classify
//!    │              (all concurrent, fan-out/fan-in)
//!    ▼
//! stage 3 ── merge hits, rank five rule sources by fixed priority
//!    │
//!    ▼
//! stage 4 ── rewrite collaborator (only on a REWRITE verdict)
//!    │
//!    ▼
//! response { final_decision, all_decision_dict }
//! ```
//!
//! ## Decision model
//!
//! Five rule sources compete for the verdict, ranked by a fixed priority
//! ladder (low to high):
//!
//! | Source           | Priority | Decides                         |
//! |------------------|----------|---------------------------------|
//! | `NormalRule`     | 100      | global defaults + tenant rules  |
//! | `VipWhiteRule`   | 700      | VIP tag whitelist               |
//! | `VipBlackRule`   | 800      | VIP tag blacklist               |
//! | `VipWhiteWords`  | 900      | VIP word whitelist (PASS)       |
//! | `VipBlackWords`  | 1000     | VIP word blacklist (REJECT)     |
//!
//! Source priority strictly determines the winner; decision severity only
//! breaks ties inside a single source. A VIP whitelist hit can therefore
//! de-escalate a global REJECT.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use promptgate::guard::StaticGuard;
//! use promptgate::pipeline::flow::{moderation_pipeline, run_moderation, Gate};
//! use promptgate::pipeline::RequestContext;
//! use promptgate::policy::{FileDataSource, PolicyCache};
//! use promptgate::rewrite::NoopRewriter;
//!
//! let cache = Arc::new(PolicyCache::new(Arc::new(FileDataSource::new("./data"))));
//! let gate = Arc::new(Gate::new(cache, Arc::new(StaticGuard::safe()), Arc::new(NoopRewriter), 0));
//! let pipeline = moderation_pipeline(gate);
//!
//! let ctx = RequestContext::new("req-1", "acme", "some prompt");
//! let settled = run_moderation(&pipeline, ctx).await?;
//! println!("verdict: {:?}", settled.final_decision);
//! ```
//!
//! ## Module Structure
//!
//! - [`matcher`]: multi-pattern keyword automatons and prompt normalization
//! - [`policy`]: data sources and the lazily-populated tenant policy cache
//! - [`decision`]: the five-source decision engine
//! - [`pipeline`]: sequential-stage/parallel-step orchestration
//! - [`guard`] / [`rewrite`]: external collaborator interfaces
//! - [`server`]: the HTTP moderation surface
//! - [`config`]: configuration management
//! - [`error`]: error types and result alias

pub mod config;
pub mod decision;
pub mod error;
pub mod guard;
pub mod matcher;
pub mod pipeline;
pub mod policy;
pub mod rewrite;
pub mod server;

// Re-exports for convenience
pub use config::Config;
pub use decision::{make_decision, DecisionClass, DecisionSource, Verdict};
pub use error::{GateError, Result};
pub use guard::{GuardClassifier, GuardVerdict, SafetyLabel, StaticGuard};
pub use matcher::{normalize_prompt, KeywordAutomaton, KeywordEntry, ScanOutcome};
pub use pipeline::flow::{moderation_pipeline, run_moderation, Gate};
pub use pipeline::{Pipeline, RequestContext, Step};
pub use policy::{CacheKind, DataSource, FileDataSource, PolicyCache};
pub use rewrite::{NoopRewriter, RewriteOutcome, Rewriter};
pub use server::{create_router, AppState, ServerConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
