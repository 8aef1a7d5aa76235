//! Identifier translation and class membership lookups.

pub mod cache;
pub mod classification;
pub mod flat_file;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::IdentifierType;

pub use cache::MapperCache;
pub use classification::{ClassificationSource, ClassificationTable, MappedClassification};
pub use flat_file::{FileFormat, FlatFileMapper, MapperSpec};

/// Directed mapping from one identifier space into another.
pub trait IdentifierMapper {
    /// Loads the backing data on first use. A failed load stays failed.
    fn is_ready(&self) -> bool;

    fn species(&self) -> Option<&str>;

    fn map_multiple(&self, source: &str) -> Option<&[String]>;

    /// First target of `source`.
    fn map(&self, source: &str) -> Option<&str> {
        self.map_multiple(source)
            .and_then(|targets| targets.first())
            .map(String::as_str)
    }
}

/// What a mapper translates. Together with the species this keys the
/// `MapperCache`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingKind {
    /// Identifiers of the given type to the canonical id of their entity:
    /// NCBI gene ids for genes, KEGG compound ids for compounds.
    ToCanonical(IdentifierType),
    GeneToPathway,
    CompoundToPathway,
    /// Pathway id to its human-readable name.
    PathwayName,
    /// Gene symbol to gene set (GMT).
    GeneSets,
}

impl fmt::Display for MappingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingKind::ToCanonical(from) => write!(f, "{from} to canonical id"),
            MappingKind::GeneToPathway => write!(f, "gene to pathway"),
            MappingKind::CompoundToPathway => write!(f, "compound to pathway"),
            MappingKind::PathwayName => write!(f, "pathway name"),
            MappingKind::GeneSets => write!(f, "gene sets"),
        }
    }
}
