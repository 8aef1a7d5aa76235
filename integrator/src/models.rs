//! models.rs - records, identifiers and signal keys shared by the enrichment
//! and pairing code.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::mirna::target::MirnaTarget;

// ─── Dataset ─────────────────────────────────────────────────────────────────

/// Anything that can be read into a `DataFrame`.
pub trait Dataset {
    fn load(&self) -> PolarsResult<DataFrame>;
}

pub fn polars_err(e: Box<dyn std::error::Error>) -> PolarsError {
    PolarsError::ComputeError(format!("{}", e).into())
}

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Canonical identifier of a gene (NCBI Entrez) or a compound (KEGG).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityId {
    Gene(u32),
    Compound(String),
}

impl EntityId {
    /// All-digit tokens are gene ids, everything else is taken as a compound id.
    /// Empty input, a zero gene id and out-of-range numbers give `None`.
    pub fn parse_canonical(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.bytes().all(|b| b.is_ascii_digit()) {
            return match raw.parse::<u32>() {
                Ok(0) | Err(_) => None,
                Ok(id) => Some(EntityId::Gene(id)),
            };
        }
        let compound = raw.strip_prefix("cpd:").unwrap_or(raw);
        Some(EntityId::Compound(compound.to_uppercase()))
    }

    pub fn gene_id(&self) -> Option<u32> {
        match self {
            EntityId::Gene(id) => Some(*id),
            EntityId::Compound(_) => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Gene(id) => write!(f, "{id}"),
            EntityId::Compound(id) => write!(f, "{id}"),
        }
    }
}

/// Identifier space of an input list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierType {
    NcbiGeneId,
    GeneSymbol,
    Affymetrix,
    Ensembl,
    RefSeq,
    UniProt,
    KeggGenes,
    KeggCompound,
    InChIKey,
    CompoundName,
    MicroRnaName,
    Unknown,
}

impl IdentifierType {
    /// Types the engine can bucket without a translation step.
    pub fn is_canonical(self) -> bool {
        matches!(self, IdentifierType::NcbiGeneId | IdentifierType::KeggCompound)
    }
}

impl fmt::Display for IdentifierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IdentifierType::NcbiGeneId => "NCBI gene id",
            IdentifierType::GeneSymbol => "gene symbol",
            IdentifierType::Affymetrix => "Affymetrix probe id",
            IdentifierType::Ensembl => "Ensembl id",
            IdentifierType::RefSeq => "RefSeq id",
            IdentifierType::UniProt => "UniProt accession",
            IdentifierType::KeggGenes => "KEGG gene id",
            IdentifierType::KeggCompound => "KEGG compound id",
            IdentifierType::InChIKey => "InChIKey",
            IdentifierType::CompoundName => "compound name",
            IdentifierType::MicroRnaName => "microRNA name",
            IdentifierType::Unknown => "unknown identifier",
        };
        write!(f, "{s}")
    }
}

// ─── Signals ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    FoldChange,
    PValue,
    QValue,
    Ratio,
    LogRatio,
    Raw,
    Unknown,
}

/// A signal is addressed by experiment name and signal kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalKey {
    pub experiment: String,
    pub kind: SignalType,
}

impl SignalKey {
    pub fn new(experiment: impl Into<String>, kind: SignalType) -> Self {
        Self { experiment: experiment.into(), kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Mrna,
    Mirna,
    Compound,
    ProteinModification,
    DnaMethylation,
    Gene,
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// One row of an omics dataset: a name, optional identifiers, named signals,
/// free-text annotations and, for miRNAs, the attached targets.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub kind: RecordKind,
    pub name: String,
    pub probe: Option<String>,
    pub id: Option<EntityId>,
    pub signals: BTreeMap<SignalKey, f64>,
    pub data: BTreeMap<String, String>,
    pub targets: Vec<MirnaTarget>,
    pub gene_centered: bool,
}

impl Record {
    pub fn new(kind: RecordKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            probe: None,
            id: None,
            signals: BTreeMap::new(),
            data: BTreeMap::new(),
            targets: Vec::new(),
            gene_centered: false,
        }
    }

    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_probe(mut self, probe: impl Into<String>) -> Self {
        self.probe = Some(probe.into());
        self
    }

    pub fn with_signal(mut self, experiment: &str, kind: SignalType, value: f64) -> Self {
        self.signals.insert(SignalKey::new(experiment, kind), value);
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn signal(&self, experiment: &str, kind: SignalType) -> Option<f64> {
        self.signals
            .get(&SignalKey::new(experiment, kind))
            .copied()
            .filter(|v| !v.is_nan())
    }

    pub fn fold_change(&self, experiment: &str) -> Option<f64> {
        self.signal(experiment, SignalType::FoldChange)
    }

    pub fn p_value(&self, experiment: &str) -> Option<f64> {
        self.signal(experiment, SignalType::PValue)
    }

    pub fn description(&self) -> Option<&str> {
        self.data.get("description").map(String::as_str)
    }

    pub fn gene_id(&self) -> Option<u32> {
        self.id.as_ref().and_then(EntityId::gene_id)
    }

    pub fn is_mirna(&self) -> bool {
        self.kind == RecordKind::Mirna
    }

    /// Stores `targets` sorted and without duplicates.
    pub fn set_targets(&mut self, mut targets: Vec<MirnaTarget>) {
        targets.sort();
        targets.dedup();
        self.targets = targets;
    }

    pub fn has_targets(&self) -> bool {
        !self.targets.is_empty()
    }

    /// Distinct target genes of a miRNA record.
    pub fn target_gene_ids(&self) -> BTreeSet<u32> {
        self.targets.iter().map(|t| t.target).collect()
    }

    /// Name used in member lists and relation tables.
    pub fn label(&self) -> String {
        match &self.probe {
            Some(probe) if !probe.is_empty() && probe != &self.name => {
                format!("{} ({})", self.name, probe)
            }
            _ => self.name.clone(),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
