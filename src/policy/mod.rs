//! Tenant policy loading and caching.
//!
//! The [`PolicyCache`] is the single authoritative holder of the global
//! automaton, the global rule table, and every tenant's lazily-built policy
//! bundles. Data arrives through the [`DataSource`] interface so the cache
//! never branches on the backing store.

mod bundle;
mod cache;
mod source;

pub use bundle::{CustomBundle, GlobalPolicy, VipBundle};
pub use cache::{CacheKind, PolicyCache};
pub use source::{rule_key, DataSource, FileDataSource, VipPolicyRows};
