//! result.rs - per-class enrichment outcome and its table form.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::models::EntityId;

/// Something from the input list that fell into a class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ClassMember {
    /// A plain identifier from an identifier list.
    Id(EntityId),
    /// A (gene-centered) record, labelled by its name.
    Record { label: String, id: EntityId },
    /// A miRNA counted through one of its target genes.
    MirnaTarget { mirna: String, target: u32 },
}

impl ClassMember {
    pub fn entity(&self) -> EntityId {
        match self {
            ClassMember::Id(id) | ClassMember::Record { id, .. } => id.clone(),
            ClassMember::MirnaTarget { target, .. } => EntityId::Gene(*target),
        }
    }
}

impl fmt::Display for ClassMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassMember::Id(id) => write!(f, "{id}"),
            ClassMember::Record { label, .. } => write!(f, "{label}"),
            ClassMember::MirnaTarget { mirna, target } => write!(f, "{mirna} ({target})"),
        }
    }
}

/// Outcome for one class. Built once per run, read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentResult {
    class_id: String,
    class_name: String,
    observed: usize,
    list_size: usize,
    class_size: usize,
    genome_size: usize,
    p_value: f64,
    q_value: f64,
    members: BTreeSet<ClassMember>,
}

impl EnrichmentResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        class_id: String,
        class_name: String,
        observed: usize,
        list_size: usize,
        class_size: usize,
        genome_size: usize,
        p_value: f64,
        q_value: f64,
        members: BTreeSet<ClassMember>,
    ) -> Self {
        Self { class_id, class_name, observed, list_size, class_size, genome_size, p_value, q_value, members }
    }

    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn observed(&self) -> usize {
        self.observed
    }

    pub fn list_size(&self) -> usize {
        self.list_size
    }

    pub fn class_size(&self) -> usize {
        self.class_size
    }

    pub fn genome_size(&self) -> usize {
        self.genome_size
    }

    pub fn p_value(&self) -> f64 {
        self.p_value
    }

    pub fn q_value(&self) -> f64 {
        self.q_value
    }

    pub fn members(&self) -> &BTreeSet<ClassMember> {
        &self.members
    }

    /// (k/n) / (K/N); 0 when either ratio is undefined.
    pub fn fold_enrichment(&self) -> f64 {
        if self.list_size == 0 || self.class_size == 0 || self.genome_size == 0 {
            return 0.0;
        }
        (self.observed as f64 / self.list_size as f64) / (self.class_size as f64 / self.genome_size as f64)
    }

    pub fn to_row(&self) -> EnrichmentRow {
        EnrichmentRow {
            id: self.class_id.clone(),
            name: self.class_name.clone(),
            list_ratio: format!("{}/{}", self.observed, self.list_size),
            background_ratio: format!("{}/{}", self.class_size, self.genome_size),
            p_value: self.p_value,
            q_value: self.q_value,
            members: self.members.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichmentRow {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "List ratio")]
    pub list_ratio: String,
    #[serde(rename = "BG ratio")]
    pub background_ratio: String,
    #[serde(rename = "P-value")]
    pub p_value: f64,
    #[serde(rename = "Q-value")]
    pub q_value: f64,
    #[serde(rename = "Genes")]
    pub members: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_and_fold() {
        let members: BTreeSet<ClassMember> = [
            ClassMember::Record { label: "TP53".into(), id: EntityId::Gene(7157) },
            ClassMember::MirnaTarget { mirna: "HSA-MIR-21".into(), target: 1956 },
        ]
        .into_iter()
        .collect();
        let r = EnrichmentResult::new("hsa04115".into(), "p53".into(), 2, 10, 20, 200, 0.01, 0.02, members);
        assert!((r.fold_enrichment() - 2.0).abs() < 1e-12);

        let row = r.to_row();
        assert_eq!(row.list_ratio, "2/10");
        assert_eq!(row.background_ratio, "20/200");
        assert_eq!(row.members, "TP53, HSA-MIR-21 (1956)");
    }
}
