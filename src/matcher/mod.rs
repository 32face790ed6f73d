//! Keyword matching.
//!
//! Multi-pattern substring detection over fixed keyword sets, with
//! per-keyword exemption phrases and prompt normalization. Automatons are
//! built once (per cache generation) and queried lock-free afterwards.

mod automaton;
mod normalize;

pub use automaton::{KeywordAutomaton, KeywordEntry, ScanOutcome};
pub use normalize::normalize_prompt;
