//! Multi-pattern keyword automaton.
//!
//! Wraps an Aho-Corasick automaton over a fixed keyword set. Keywords that
//! share identical surface text are merged into one pattern carrying the
//! union of their tag codes, so a single physical match can report multiple
//! risk categories. The automaton is built once and read-only afterwards;
//! scans take `&self` and need no locking.

use std::collections::{BTreeMap, HashMap, HashSet};

use aho_corasick::AhoCorasick;
use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};

/// One keyword as loaded from the data source.
///
/// Immutable once folded into an automaton generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordEntry {
    /// Surface text to match (case-sensitive, exact).
    pub keyword: String,
    /// Risk category this keyword belongs to.
    pub tag_code: String,
    /// Risk level label, informational only.
    #[serde(default)]
    pub risk_level: Option<String>,
    /// Phrases whose nearby presence suppresses a match of this keyword.
    #[serde(default)]
    pub exemptions: Option<Vec<String>>,
    /// Owning tenant; empty/None means global.
    #[serde(default)]
    pub scenario_id: Option<String>,
}

impl KeywordEntry {
    /// Plain global keyword with a single tag.
    pub fn new(keyword: impl Into<String>, tag_code: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            tag_code: tag_code.into(),
            risk_level: None,
            exemptions: None,
            scenario_id: None,
        }
    }

    /// Attach exemption phrases.
    pub fn with_exemptions(mut self, exemptions: Vec<String>) -> Self {
        self.exemptions = Some(exemptions);
        self
    }
}

/// Merged metadata for one distinct pattern.
#[derive(Debug, Clone)]
struct PatternMeta {
    keyword: String,
    tags: Vec<String>,
    exemptions: Vec<String>,
}

/// Result of one scan pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanOutcome {
    /// tag_code -> distinct matched keywords, in match order.
    pub hits: BTreeMap<String, Vec<String>>,
    /// Keywords that matched but were suppressed by an exemption phrase.
    pub exempted: HashSet<String>,
}

impl ScanOutcome {
    /// True when nothing matched (exempted hits do not count).
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Immutable multi-pattern matcher over a keyword set.
#[derive(Debug)]
pub struct KeywordAutomaton {
    ac: AhoCorasick,
    meta: Vec<PatternMeta>,
}

impl KeywordAutomaton {
    /// Build an automaton from a keyword list.
    ///
    /// Entries with identical surface text are merged: their tag codes and
    /// exemption phrases become one pattern record. Fails with `NoWordList`
    /// on an empty list so a misconfigured tier is caught at build time.
    pub fn build(entries: &[KeywordEntry]) -> Result<Self> {
        if entries.is_empty() {
            return Err(GateError::NoWordList);
        }

        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut meta: Vec<PatternMeta> = Vec::new();

        for entry in entries {
            let slot = *index.entry(entry.keyword.as_str()).or_insert_with(|| {
                meta.push(PatternMeta {
                    keyword: entry.keyword.clone(),
                    tags: Vec::new(),
                    exemptions: Vec::new(),
                });
                meta.len() - 1
            });
            let record = &mut meta[slot];
            if !record.tags.contains(&entry.tag_code) {
                record.tags.push(entry.tag_code.clone());
            }
            if let Some(exemptions) = &entry.exemptions {
                for phrase in exemptions {
                    if !record.exemptions.contains(phrase) {
                        record.exemptions.push(phrase.clone());
                    }
                }
            }
        }

        let ac = AhoCorasick::new(meta.iter().map(|m| m.keyword.as_str()))
            .map_err(|e| GateError::Server(format!("automaton build failed: {e}")))?;

        Ok(Self { ac, meta })
    }

    /// Number of distinct patterns.
    pub fn len(&self) -> usize {
        self.meta.len()
    }

    /// True when no patterns are loaded. Unreachable via `build`.
    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    /// Scan `text` for all keyword occurrences, overlapping included.
    ///
    /// Keywords of a single character or less are discarded as noise. A match
    /// whose pattern carries exemption phrases is suppressed when a phrase
    /// occurs anywhere in the text (`exemption_distance == 0`) or within
    /// `exemption_distance` bytes around the match (`> 0`); suppressed
    /// keywords are recorded in [`ScanOutcome::exempted`] and excluded from
    /// the hit map.
    pub fn scan(&self, text: &str, exemption_distance: usize) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        let mut seen: HashSet<(&str, &str)> = HashSet::new();

        for mat in self.ac.find_overlapping_iter(text) {
            let record = &self.meta[mat.pattern().as_usize()];
            if record.keyword.chars().count() <= 1 {
                continue;
            }

            if !record.exemptions.is_empty()
                && is_exempted(text, mat.start(), mat.end(), &record.exemptions, exemption_distance)
            {
                outcome.exempted.insert(record.keyword.clone());
                continue;
            }

            for tag in &record.tags {
                if seen.insert((tag.as_str(), record.keyword.as_str())) {
                    outcome
                        .hits
                        .entry(tag.clone())
                        .or_default()
                        .push(record.keyword.clone());
                }
            }
        }

        outcome
    }
}

/// Check whether any exemption phrase suppresses the match at `[start, end)`.
fn is_exempted(
    text: &str,
    start: usize,
    end: usize,
    exemptions: &[String],
    distance: usize,
) -> bool {
    if distance == 0 {
        return exemptions.iter().any(|phrase| text.contains(phrase.as_str()));
    }
    let window = char_window(text, start.saturating_sub(distance), end + distance);
    exemptions.iter().any(|phrase| window.contains(phrase.as_str()))
}

/// Byte-range slice clamped outward to char boundaries.
fn char_window(text: &str, mut start: usize, mut end: usize) -> &str {
    start = start.min(text.len());
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    end = end.min(text.len());
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    &text[start..end]
}
