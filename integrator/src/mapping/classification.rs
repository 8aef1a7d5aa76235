//! classification.rs - class membership sources for the enrichment engine.

use std::cell::OnceCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use tracing::{debug, warn};

use super::{FlatFileMapper, IdentifierMapper};
use crate::error::{IntegratorError, Result};
use crate::models::EntityId;

/// Which classes an entity belongs to, how large each class is and what it
/// is called.
pub trait ClassificationSource {
    fn is_ready(&self) -> bool;

    fn species(&self) -> Option<&str>;

    fn classes_of(&self, id: &EntityId) -> Vec<String>;

    /// Number of distinct entities annotated with `class_id`.
    fn class_population_size(&self, class_id: &str) -> usize;

    fn class_name_for(&self, class_id: &str) -> Option<String>;

    /// Number of distinct entities annotated with any class.
    fn genome_size(&self) -> usize;
}

/// Tries `class_id` and, for species-prefixed KEGG ids such as `hsa04110`,
/// the reference pathway `map04110`.
pub fn lookup_class_name(class_id: &str, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    if let Some(name) = lookup(class_id) {
        return Some(name);
    }
    let digits_at = class_id.find(|c: char| c.is_ascii_digit())?;
    let (prefix, number) = class_id.split_at(digits_at);
    if prefix.is_empty() || prefix == "map" || !prefix.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    lookup(&format!("map{number}"))
}

// ─── ClassificationTable ─────────────────────────────────────────────────────

/// In-memory membership index.
#[derive(Debug, Clone, Default)]
pub struct ClassificationTable {
    species: Option<String>,
    memberships: HashMap<EntityId, BTreeSet<String>>,
    class_sizes: HashMap<String, usize>,
    names: HashMap<String, String>,
}

impl ClassificationTable {
    pub fn new(species: Option<String>) -> Self {
        Self { species, ..Default::default() }
    }

    pub fn add_membership(&mut self, id: EntityId, class_id: impl Into<String>) {
        let class_id = class_id.into();
        if self.memberships.entry(id).or_default().insert(class_id.clone()) {
            *self.class_sizes.entry(class_id).or_insert(0) += 1;
        }
    }

    pub fn set_name(&mut self, class_id: impl Into<String>, name: impl Into<String>) {
        self.names.insert(class_id.into(), name.into());
    }

    pub fn class_count(&self) -> usize {
        self.class_sizes.len()
    }
}

impl ClassificationSource for ClassificationTable {
    fn is_ready(&self) -> bool {
        true
    }

    fn species(&self) -> Option<&str> {
        self.species.as_deref()
    }

    fn classes_of(&self, id: &EntityId) -> Vec<String> {
        self.memberships
            .get(id)
            .map(|classes| classes.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn class_population_size(&self, class_id: &str) -> usize {
        self.class_sizes.get(class_id).copied().unwrap_or(0)
    }

    fn class_name_for(&self, class_id: &str) -> Option<String> {
        lookup_class_name(class_id, |id| self.names.get(id).cloned())
    }

    fn genome_size(&self) -> usize {
        self.memberships.len()
    }
}

// ─── MappedClassification ────────────────────────────────────────────────────

/// Classification built from flat-file mappers: a membership mapper
/// (entity -> classes), an optional class name mapper and, for gene sets
/// keyed by symbol, an optional symbol -> gene id mapper.
pub struct MappedClassification {
    memberships: Rc<FlatFileMapper>,
    names: Option<Rc<FlatFileMapper>>,
    symbols: Option<Rc<FlatFileMapper>>,
    index: OnceCell<Option<ClassificationTable>>,
}

impl MappedClassification {
    /// Fails when the mappers were built for different species.
    pub fn new(
        memberships: Rc<FlatFileMapper>,
        names: Option<Rc<FlatFileMapper>>,
        symbols: Option<Rc<FlatFileMapper>>,
    ) -> Result<Self> {
        for other in names.iter().chain(symbols.iter()) {
            if let (Some(left), Some(right)) = (memberships.species(), other.species()) {
                if left != right {
                    return Err(IntegratorError::IncompatibleSpecies {
                        left: left.to_string(),
                        right: right.to_string(),
                    });
                }
            }
        }
        Ok(Self { memberships, names, symbols, index: OnceCell::new() })
    }

    fn index(&self) -> Option<&ClassificationTable> {
        self.index.get_or_init(|| self.build_index()).as_ref()
    }

    fn build_index(&self) -> Option<ClassificationTable> {
        let entries = match self.memberships.entries() {
            Some(e) => e,
            None => {
                warn!("Class membership mapping {} is not available", self.memberships.kind());
                return None;
            }
        };

        let mut table = ClassificationTable::new(self.memberships.species().map(str::to_string));
        let mut unresolved = 0usize;
        for (member, classes) in entries {
            let Some(id) = self.resolve_member(member) else {
                unresolved += 1;
                continue;
            };
            for class_id in classes {
                table.add_membership(id.clone(), class_id.as_str());
            }
        }
        if unresolved > 0 {
            debug!("{} class members could not be resolved to canonical ids", unresolved);
        }
        debug!("Indexed {} entities in {} classes", table.genome_size(), table.class_count());
        Some(table)
    }

    fn resolve_member(&self, member: &str) -> Option<EntityId> {
        match &self.symbols {
            Some(symbols) if !member.bytes().all(|b| b.is_ascii_digit()) => symbols
                .map(member)
                .and_then(EntityId::parse_canonical)
                .filter(|id| id.gene_id().is_some()),
            _ => EntityId::parse_canonical(member),
        }
    }
}

impl ClassificationSource for MappedClassification {
    fn is_ready(&self) -> bool {
        self.index().is_some()
    }

    fn species(&self) -> Option<&str> {
        self.memberships.species()
    }

    fn classes_of(&self, id: &EntityId) -> Vec<String> {
        self.index().map(|t| t.classes_of(id)).unwrap_or_default()
    }

    fn class_population_size(&self, class_id: &str) -> usize {
        self.index().map(|t| t.class_population_size(class_id)).unwrap_or(0)
    }

    fn class_name_for(&self, class_id: &str) -> Option<String> {
        let names = self.names.as_ref()?;
        lookup_class_name(class_id, |id| names.map(id).map(str::to_string))
    }

    fn genome_size(&self) -> usize {
        self.index().map(ClassificationTable::genome_size).unwrap_or(0)
    }
}
