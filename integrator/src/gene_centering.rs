//! gene_centering.rs - collapse multi-probe datasets into one record per gene.
//!
//! Records sharing a canonical id (or, without an id, the same upper-cased
//! name) are merged. Each signal is merged with the `MergeType` the
//! `MergePolicyTable` selects for the record kind and signal kind.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{EntityId, Record, RecordKind, SignalKey, SignalType};

// ─── MergeType ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeType {
    Mean,
    Median,
    Minimum,
    Maximum,
    /// Value with the largest absolute magnitude, sign kept.
    MaximumDistanceToZero,
    Sum,
    /// Mean of |log2(v)|, used for p-value like signals.
    NormalizedSumOfLog2Values,
    /// Only kept when every merged value is identical.
    Unset,
}

impl MergeType {
    /// NaN values are ignored; `None` when nothing is left to merge.
    pub fn calculate(self, values: &[f64]) -> Option<f64> {
        let values: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if values.is_empty() {
            return None;
        }
        if values.len() == 1 {
            return Some(values[0]);
        }
        let n = values.len() as f64;
        let merged = match self {
            MergeType::Mean => values.iter().sum::<f64>() / n,
            MergeType::Median => {
                let mut sorted = values.clone();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
            MergeType::Minimum => values.iter().copied().fold(f64::INFINITY, f64::min),
            MergeType::Maximum => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            MergeType::MaximumDistanceToZero => values
                .iter()
                .copied()
                .fold(0.0, |best: f64, v| if v.abs() > best.abs() { v } else { best }),
            MergeType::Sum => values.iter().sum(),
            MergeType::NormalizedSumOfLog2Values => {
                values.iter().map(|v| v.log2().abs()).sum::<f64>() / n
            }
            MergeType::Unset => {
                let first = values[0];
                if values.iter().all(|v| *v == first) {
                    first
                } else {
                    return None;
                }
            }
        };
        Some(merged)
    }
}

// ─── MergePolicyTable ────────────────────────────────────────────────────────

/// Which merge to use for which data. Signal-kind overrides win over the
/// record-kind entry, which wins over `default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergePolicyTable {
    pub default: MergeType,
    pub by_kind: BTreeMap<RecordKind, MergeType>,
    pub by_signal: BTreeMap<SignalType, MergeType>,
}

impl Default for MergePolicyTable {
    fn default() -> Self {
        let mut by_kind = BTreeMap::new();
        by_kind.insert(RecordKind::DnaMethylation, MergeType::MaximumDistanceToZero);
        by_kind.insert(RecordKind::ProteinModification, MergeType::MaximumDistanceToZero);

        let mut by_signal = BTreeMap::new();
        by_signal.insert(SignalType::PValue, MergeType::Minimum);
        by_signal.insert(SignalType::QValue, MergeType::Minimum);

        Self { default: MergeType::Mean, by_kind, by_signal }
    }
}

impl MergePolicyTable {
    /// A table that merges everything the same way.
    pub fn uniform(merge: MergeType) -> Self {
        Self { default: merge, by_kind: BTreeMap::new(), by_signal: BTreeMap::new() }
    }

    pub fn merge_type_for(&self, kind: RecordKind, signal: SignalType) -> MergeType {
        self.by_signal
            .get(&signal)
            .or_else(|| self.by_kind.get(&kind))
            .copied()
            .unwrap_or(self.default)
    }
}

// ─── Gene-centering ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    Id(EntityId),
    Name(String),
}

fn group_key(record: &Record) -> GroupKey {
    match (&record.id, record.is_mirna()) {
        (Some(id), false) => GroupKey::Id(id.clone()),
        _ => GroupKey::Name(record.name.trim().to_uppercase()),
    }
}

/// One record per gene. Group order follows the first occurrence in `records`.
pub fn gene_centered(records: &[Record], policies: &MergePolicyTable) -> Vec<Record> {
    let mut groups: Vec<Vec<&Record>> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    for record in records {
        let key = group_key(record);
        match index.get(&key) {
            Some(&i) => groups[i].push(record),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![record]);
            }
        }
    }

    let merged = groups.iter().filter(|g| g.len() > 1).count();
    debug!("Gene-centering {} records into {} groups ({} merged)", records.len(), groups.len(), merged);

    groups.into_iter().map(|group| merge_records(&group, policies)).collect()
}

/// Merges `group` into a single record. `group` must not be empty.
pub fn merge_records(group: &[&Record], policies: &MergePolicyTable) -> Record {
    let first = group[0];
    if group.len() == 1 {
        let mut single = first.clone();
        single.gene_centered = true;
        return single;
    }

    let mut merged = Record::new(first.kind, join_unique(group.iter().map(|r| r.name.as_str())));
    let probes = join_unique(group.iter().filter_map(|r| r.probe.as_deref()));
    merged.probe = (!probes.is_empty()).then_some(probes);
    merged.id = if group.iter().all(|r| r.id == first.id) { first.id.clone() } else { None };

    let mut values: BTreeMap<&SignalKey, Vec<f64>> = BTreeMap::new();
    for record in group {
        for (key, value) in &record.signals {
            values.entry(key).or_default().push(*value);
        }
    }
    for (key, vals) in values {
        let merge = policies.merge_type_for(first.kind, key.kind);
        if let Some(v) = merge.calculate(&vals) {
            merged.signals.insert(key.clone(), v);
        }
    }

    let mut data: BTreeMap<&String, Vec<&str>> = BTreeMap::new();
    for record in group {
        for (key, value) in &record.data {
            data.entry(key).or_default().push(value.as_str());
        }
    }
    for (key, vals) in data {
        merged.data.insert(key.clone(), join_unique(vals.into_iter()));
    }

    merged.set_targets(group.iter().flat_map(|r| r.targets.iter().cloned()).collect());
    merged.gene_centered = true;
    merged
}

//───── helpers ─────//

fn join_unique<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for item in items {
        if !item.is_empty() && !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen.join(", ")
}
