//! cache.rs - mappers shared across enrichment runs, keyed by species and
//! mapping kind.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use super::{FlatFileMapper, MapperSpec, MappingKind};

type CacheKey = (String, MappingKind);

/// Builds each configured mapper on first request and hands out shared
/// references. Entries live until `invalidate` or `clear`.
#[derive(Debug, Default)]
pub struct MapperCache {
    specs: Vec<MapperSpec>,
    mappers: RefCell<HashMap<CacheKey, Rc<FlatFileMapper>>>,
}

impl MapperCache {
    pub fn new(specs: Vec<MapperSpec>) -> Self {
        Self { specs, mappers: RefCell::new(HashMap::new()) }
    }

    /// Registers an already built mapper, replacing any cached one.
    pub fn insert(&self, mapper: FlatFileMapper) -> Rc<FlatFileMapper> {
        let key = (mapper.spec().species.clone(), mapper.kind().clone());
        let mapper = Rc::new(mapper);
        self.mappers.borrow_mut().insert(key, Rc::clone(&mapper));
        mapper
    }

    pub fn spec_for(&self, species: &str, kind: &MappingKind) -> Option<&MapperSpec> {
        self.specs.iter().find(|s| s.species == species && &s.kind == kind)
    }

    /// The cached mapper, or a new one from the matching spec. `None` when
    /// nothing is configured for (species, kind).
    pub fn get(&self, species: &str, kind: &MappingKind) -> Option<Rc<FlatFileMapper>> {
        let key = (species.to_string(), kind.clone());
        if let Some(mapper) = self.mappers.borrow().get(&key) {
            return Some(Rc::clone(mapper));
        }
        let spec = self.spec_for(species, kind)?;
        debug!("Creating {} mapper for {}", kind, species);
        let mapper = Rc::new(FlatFileMapper::new(spec.clone()));
        self.mappers.borrow_mut().insert(key, Rc::clone(&mapper));
        Some(mapper)
    }

    /// Drops the cached mapper; the next `get` reloads it from its spec.
    pub fn invalidate(&self, species: &str, kind: &MappingKind) -> bool {
        self.mappers
            .borrow_mut()
            .remove(&(species.to_string(), kind.clone()))
            .is_some()
    }

    pub fn clear(&self) {
        self.mappers.borrow_mut().clear();
    }

    /// Number of mappers currently cached.
    pub fn len(&self) -> usize {
        self.mappers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::IdentifierMapper;
    use std::io::Write;

    #[test]
    fn shared_until_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gene2kegg.txt");
        std::fs::File::create(&path).unwrap().write_all(b"7157\thsa04115\n").unwrap();

        let cache = MapperCache::new(vec![MapperSpec::new("hsa", MappingKind::GeneToPathway, &path)]);
        let first = cache.get("hsa", &MappingKind::GeneToPathway).unwrap();
        let second = cache.get("hsa", &MappingKind::GeneToPathway).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.map("7157"), Some("hsa04115"));

        // new file content is only seen after invalidation
        std::fs::File::create(&path).unwrap().write_all(b"7157\thsa04110\n").unwrap();
        assert_eq!(cache.get("hsa", &MappingKind::GeneToPathway).unwrap().map("7157"), Some("hsa04115"));
        assert!(cache.invalidate("hsa", &MappingKind::GeneToPathway));
        let reloaded = cache.get("hsa", &MappingKind::GeneToPathway).unwrap();
        assert!(!Rc::ptr_eq(&first, &reloaded));
        assert_eq!(reloaded.map("7157"), Some("hsa04110"));
    }

    #[test]
    fn unknown_key_and_clear() {
        let cache = MapperCache::new(Vec::new());
        assert!(cache.get("mmu", &MappingKind::GeneToPathway).is_none());
        cache.insert(FlatFileMapper::from_pairs("mmu", MappingKind::PathwayName, Vec::new()));
        assert!(cache.get("mmu", &MappingKind::PathwayName).is_some());
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.invalidate("mmu", &MappingKind::PathwayName));
    }
}
