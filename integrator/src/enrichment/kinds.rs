//! kinds.rs - the named enrichment configurations.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{IntegratorError, Result};
use crate::mapping::{MappedClassification, MapperCache, MappingKind};
use crate::models::IdentifierType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentKind {
    KeggPathway,
    KeggCompound,
    MsigDb,
}

impl EnrichmentKind {
    pub fn display_name(self) -> &'static str {
        match self {
            EnrichmentKind::KeggPathway => "KEGG Pathway Enrichment",
            EnrichmentKind::KeggCompound => "KEGG Pathway Enrichment for Compounds",
            EnrichmentKind::MsigDb => "MSigDB Enrichment",
        }
    }

    /// Used in output file names.
    pub fn slug(self) -> &'static str {
        match self {
            EnrichmentKind::KeggPathway => "kegg_pathway",
            EnrichmentKind::KeggCompound => "kegg_compound",
            EnrichmentKind::MsigDb => "msigdb",
        }
    }

    pub fn membership_mapping(self) -> MappingKind {
        match self {
            EnrichmentKind::KeggPathway => MappingKind::GeneToPathway,
            EnrichmentKind::KeggCompound => MappingKind::CompoundToPathway,
            EnrichmentKind::MsigDb => MappingKind::GeneSets,
        }
    }

    pub fn name_mapping(self) -> Option<MappingKind> {
        match self {
            EnrichmentKind::KeggPathway | EnrichmentKind::KeggCompound => Some(MappingKind::PathwayName),
            EnrichmentKind::MsigDb => None,
        }
    }

    /// Gene sets list symbols, which need translating to gene ids.
    pub fn symbol_mapping(self) -> Option<MappingKind> {
        match self {
            EnrichmentKind::MsigDb => Some(MappingKind::ToCanonical(IdentifierType::GeneSymbol)),
            _ => None,
        }
    }

    pub fn canonical_identifier(self) -> IdentifierType {
        match self {
            EnrichmentKind::KeggCompound => IdentifierType::KeggCompound,
            _ => IdentifierType::NcbiGeneId,
        }
    }

    /// Builds the classification source from the cache. The membership
    /// mapping is required; names fall back to raw class ids.
    pub fn classification(self, species: &str, cache: &MapperCache) -> Result<MappedClassification> {
        let membership = self.membership_mapping();
        let memberships = cache.get(species, &membership).ok_or_else(|| {
            IntegratorError::Config(format!(
                "{} needs a '{}' mapping for species '{}'",
                self.display_name(),
                membership,
                species
            ))
        })?;

        let names = self.name_mapping().and_then(|kind| {
            let mapper = cache.get(species, &kind);
            if mapper.is_none() {
                warn!("No {} mapping for {}, class ids are reported as names", kind, species);
            }
            mapper
        });

        let symbols = match self.symbol_mapping() {
            Some(kind) => Some(cache.get(species, &kind).ok_or_else(|| {
                IntegratorError::Config(format!(
                    "{} needs a '{}' mapping for species '{}'",
                    self.display_name(),
                    kind,
                    species
                ))
            })?),
            None => None,
        };

        MappedClassification::new(memberships, names, symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{ClassificationSource, FlatFileMapper};

    #[test]
    fn missing_membership_is_config_error() {
        let cache = MapperCache::new(Vec::new());
        assert!(matches!(
            EnrichmentKind::KeggPathway.classification("hsa", &cache),
            Err(IntegratorError::Config(_))
        ));
        cache.insert(FlatFileMapper::from_pairs("hsa", MappingKind::GeneSets, Vec::new()));
        assert!(matches!(
            EnrichmentKind::MsigDb.classification("hsa", &cache),
            Err(IntegratorError::Config(_))
        ));
    }

    #[test]
    fn names_are_optional() {
        let cache = MapperCache::new(Vec::new());
        cache.insert(FlatFileMapper::from_pairs(
            "hsa",
            MappingKind::CompoundToPathway,
            vec![("cpd:C00031".to_string(), "path:map00010".to_string())],
        ));
        let source = EnrichmentKind::KeggCompound.classification("hsa", &cache).unwrap();
        assert_eq!(source.species(), Some("hsa"));
        assert_eq!(source.class_population_size("map00010"), 1);
        assert_eq!(source.class_name_for("map00010"), None);
    }
}
