//! targets.rs - index of miRNA name to target genes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use crate::mirna::target::MirnaTarget;
use crate::models::Record;

/// Canonical form of a miRNA name: upper case, trimmed, a leading "[" and a
/// trailing "]" removed, a trailing "STAR" or "-STAR" written as "*".
pub fn format_mirna(name: &str) -> String {
    let mut s = name.trim().to_uppercase();
    if s.starts_with('[') {
        s.remove(0);
    }
    if s.ends_with(']') {
        s.pop();
    }
    if let Some(stem) = s.strip_suffix("STAR") {
        let stem = stem.strip_suffix('-').unwrap_or(stem);
        s = format!("{stem}*");
    }
    s
}

// ─── Name fallbacks ──────────────────────────────────────────────────────────

/// MIR-1-2 style names: identical mature sequence from another precursor.
fn identical_precursor() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^.*(MIR|LET)-\d+[A-Z]?-\d$").expect("valid regex"))
}

/// LET-7A style names: family member differing in the letter suffix.
fn family_member() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^.*(MIR|LET)-\d+?[A-Z]$").expect("valid regex"))
}

// ─── MirnaTargets ────────────────────────────────────────────────────────────

/// Targets per canonical miRNA name, each list sorted and duplicate-free.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MirnaTargets {
    targets: BTreeMap<String, Vec<MirnaTarget>>,
}

impl MirnaTargets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the target was already present.
    pub fn add_target(&mut self, mirna: &str, target: MirnaTarget) -> bool {
        let list = self.targets.entry(format_mirna(mirna)).or_default();
        match list.binary_search(&target) {
            Ok(_) => false,
            Err(pos) => {
                list.insert(pos, target);
                true
            }
        }
    }

    pub fn add_targets(&mut self, mirna: &str, targets: impl IntoIterator<Item = MirnaTarget>) {
        for t in targets {
            self.add_target(mirna, t);
        }
    }

    /// Appends every target of `other`; existing lists are extended, never replaced.
    pub fn add_all(&mut self, other: &MirnaTargets) {
        for (mirna, targets) in &other.targets {
            self.add_targets(mirna, targets.iter().cloned());
        }
    }

    /// Exact lookup on the canonical name.
    pub fn targets_of(&self, mirna: &str) -> Option<&[MirnaTarget]> {
        self.targets.get(&format_mirna(mirna)).map(Vec::as_slice)
    }

    /// Lookup with fallbacks. A "*" name without targets of its own uses the
    /// mature name. The precursor without its trailing "-n" and the family
    /// without its letter suffix are always added, each step working on the
    /// name left by the previous one.
    pub fn get_targets(&self, mirna: &str) -> Option<Vec<MirnaTarget>> {
        let mut pre = format_mirna(mirna);
        let mut found: BTreeSet<MirnaTarget> = BTreeSet::new();
        if let Some(t) = self.targets.get(&pre) {
            found.extend(t.iter().cloned());
        }

        if found.is_empty() && pre.ends_with('*') {
            pre.pop();
            if let Some(t) = self.targets.get(&pre) {
                found.extend(t.iter().cloned());
            }
        }

        if identical_precursor().is_match(&pre) {
            if let Some(pos) = pre.rfind('-') {
                pre.truncate(pos);
                if let Some(t) = self.targets.get(&pre) {
                    debug!("Adding targets of {} for {}", pre, mirna);
                    found.extend(t.iter().cloned());
                }
            }
        }

        if family_member().is_match(&pre) {
            pre.pop();
            if let Some(t) = self.targets.get(&pre) {
                debug!("Adding targets of {} for {}", pre, mirna);
                found.extend(t.iter().cloned());
            }
        }

        (!found.is_empty()).then(|| found.into_iter().collect())
    }

    /// Keeps targets of `source` with a score at or above `threshold`. Targets
    /// of other sources are kept unless `remove_all_below` is set, in which
    /// case any scored target below the threshold is dropped. Returns the
    /// number of removed targets.
    pub fn filter_targets(&mut self, source: Option<&str>, threshold: f64, remove_all_below: bool) -> usize {
        self.retain(|t| {
            let applies = remove_all_below || source.map_or(true, |s| t.has_source(s));
            match (applies, t.score) {
                (true, Some(score)) => score >= threshold,
                _ => true,
            }
        })
    }

    /// Drops every predicted target.
    pub fn filter_targets_only_experimental(&mut self) -> usize {
        self.retain(|t| t.experimental)
    }

    /// Removes miRNAs whose canonical name starts with `prefix` (e.g. "MMU-").
    pub fn remove_targets_from(&mut self, prefix: &str) -> usize {
        let prefix = format_mirna(prefix);
        let before = self.targets.len();
        self.targets.retain(|mirna, _| !mirna.starts_with(&prefix));
        before - self.targets.len()
    }

    fn retain(&mut self, keep: impl Fn(&MirnaTarget) -> bool) -> usize {
        let mut removed = 0;
        for list in self.targets.values_mut() {
            let before = list.len();
            list.retain(|t| keep(t));
            removed += before - list.len();
        }
        self.targets.retain(|_, list| !list.is_empty());
        removed
    }

    /// Number of miRNAs.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn size_of_targets(&self) -> usize {
        self.targets.values().map(Vec::len).sum()
    }

    /// Distinct target genes over all miRNAs.
    pub fn size_of_unique_targets(&self, only_experimental: bool) -> usize {
        self.targets
            .values()
            .flatten()
            .filter(|t| !only_experimental || t.experimental)
            .map(|t| t.target)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// (miRNA, targets) in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[MirnaTarget])> {
        self.targets.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn summary(&self) -> String {
        format!(
            "{} miRNAs, {} targets, {} unique target genes ({} experimental)",
            self.len(),
            self.size_of_targets(),
            self.size_of_unique_targets(false),
            self.size_of_unique_targets(true)
        )
    }
}

/// Attaches targets to every miRNA record; records without targets in the
/// index have theirs cleared. Returns how many records got targets.
pub fn link_mirna_and_targets(targets: &MirnaTargets, mirnas: &mut [Record]) -> usize {
    let mut matched = 0;
    for record in mirnas.iter_mut() {
        match targets.get_targets(&record.name) {
            Some(t) => {
                record.set_targets(t);
                matched += 1;
            }
            None => record.targets.clear(),
        }
    }
    info!("Linked targets to {} of {} miRNAs", matched, mirnas.len());
    matched
}
