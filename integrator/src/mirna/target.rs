//! target.rs - a single predicted or experimentally validated miRNA target.

use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Target gene of a miRNA with the evidence behind it.
///
/// Identity and ordering use (target, experimental first, source, score);
/// the symbol is display-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirnaTarget {
    pub target: u32,
    pub experimental: bool,
    pub source: String,
    pub score: Option<f64>,
    #[serde(default)]
    pub target_symbol: Option<String>,
}

impl MirnaTarget {
    pub fn new(target: u32, experimental: bool, source: impl Into<String>, score: Option<f64>) -> Self {
        Self {
            target,
            experimental,
            source: source.into(),
            score: score.filter(|s| !s.is_nan()),
            target_symbol: None,
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.target_symbol = Some(symbol.into());
        self
    }

    /// True if `source` is one of the ";"-joined sources of this target.
    pub fn has_source(&self, source: &str) -> bool {
        source.is_empty() || self.source.split(';').any(|s| s.eq_ignore_ascii_case(source))
    }
}

impl PartialEq for MirnaTarget {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MirnaTarget {}

impl PartialOrd for MirnaTarget {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MirnaTarget {
    fn cmp(&self, other: &Self) -> Ordering {
        self.target
            .cmp(&other.target)
            .then_with(|| other.experimental.cmp(&self.experimental))
            .then_with(|| self.source.cmp(&other.source))
            .then_with(|| match (self.score, other.score) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
            })
    }
}

/// Merges targets pointing at the same gene: experimental is ORed, new
/// sources are appended with ";", the score of the first kept target wins.
/// The result is sorted by gene id.
pub fn unique_targets(targets: &[MirnaTarget]) -> Vec<MirnaTarget> {
    let mut sorted: Vec<&MirnaTarget> = targets.iter().collect();
    sorted.sort();

    let mut merged: BTreeMap<u32, MirnaTarget> = BTreeMap::new();
    for t in sorted {
        match merged.entry(t.target) {
            Entry::Vacant(e) => {
                e.insert(t.clone());
            }
            Entry::Occupied(mut e) => {
                let kept = e.get_mut();
                kept.experimental |= t.experimental;
                if !kept.has_source(&t.source) {
                    kept.source = if kept.source.is_empty() {
                        t.source.clone()
                    } else {
                        format!("{};{}", kept.source, t.source)
                    };
                }
                if kept.target_symbol.is_none() {
                    kept.target_symbol = t.target_symbol.clone();
                }
            }
        }
    }
    merged.into_values().collect()
}
