//! engine.rs - maps an input list onto classes, tests every class for
//! over-representation and corrects for multiple testing.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::enrichment::kinds::EnrichmentKind;
use crate::enrichment::result::{ClassMember, EnrichmentResult};
use crate::error::{IntegratorError, Result};
use crate::gene_centering::{gene_centered, MergePolicyTable};
use crate::mapping::{
    ClassificationSource, FlatFileMapper, IdentifierMapper, MappedClassification, MapperCache, MappingKind,
};
use crate::mirna::target::unique_targets;
use crate::models::{EntityId, IdentifierType, Record};
use crate::stats::{adjust_keyed, Correction, CorrectionMethod, EnrichmentPvalue, HypergeometricTest};

// ─── Options ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentOptions {
    pub correction: CorrectionMethod,
    /// Drop very large, unspecific classes before correction.
    pub remove_uninformative_terms: bool,
    pub min_size_of_terms_to_remove: usize,
    /// miRNA inputs: count target genes instead of miRNAs in the list ratio.
    pub count_mirna_targets_for_list_ratio: bool,
    pub kinds: Vec<EnrichmentKind>,
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        Self {
            correction: CorrectionMethod::BenjaminiHochberg,
            remove_uninformative_terms: true,
            min_size_of_terms_to_remove: 400,
            count_mirna_targets_for_list_ratio: false,
            kinds: vec![EnrichmentKind::KeggPathway],
        }
    }
}

/// What to enrich: plain identifiers or domain records.
#[derive(Debug, Clone, Copy)]
pub enum EnrichmentInput<'i> {
    Identifiers(&'i [String]),
    Records(&'i [Record]),
}

/// The resolved input list: every (entity, member) pair to bucket and the
/// sample size `n` of the test.
#[derive(Debug, Default)]
struct Sample {
    entries: Vec<(EntityId, ClassMember)>,
    list_size: usize,
    mirna_targets: bool,
}

// ─── EnrichmentEngine ────────────────────────────────────────────────────────

pub struct EnrichmentEngine<'a, S: ClassificationSource> {
    name: String,
    species: String,
    source: S,
    mappers: &'a MapperCache,
    options: EnrichmentOptions,
    merge_policies: MergePolicyTable,
    correction: Box<dyn Correction>,
    progress: Option<Box<dyn FnMut(usize, usize) + 'a>>,
}

impl<'a> EnrichmentEngine<'a, MappedClassification> {
    /// Engine for one of the named configurations.
    pub fn for_kind(
        kind: EnrichmentKind,
        species: &str,
        mappers: &'a MapperCache,
        options: EnrichmentOptions,
    ) -> Result<Self> {
        let source = kind.classification(species, mappers)?;
        Self::new(kind.display_name(), species, source, mappers, options)
    }
}

impl<'a, S: ClassificationSource> EnrichmentEngine<'a, S> {
    /// Fails when `source` was built for another species.
    pub fn new(
        name: impl Into<String>,
        species: &str,
        source: S,
        mappers: &'a MapperCache,
        options: EnrichmentOptions,
    ) -> Result<Self> {
        if let Some(source_species) = source.species() {
            if source_species != species {
                return Err(IntegratorError::IncompatibleSpecies {
                    left: species.to_string(),
                    right: source_species.to_string(),
                });
            }
        }
        let correction = options.correction.build();
        Ok(Self {
            name: name.into(),
            species: species.to_string(),
            source,
            mappers,
            options,
            merge_policies: MergePolicyTable::default(),
            correction,
            progress: None,
        })
    }

    pub fn with_merge_policies(mut self, policies: MergePolicyTable) -> Self {
        self.merge_policies = policies;
        self
    }

    pub fn with_correction(mut self, correction: Box<dyn Correction>) -> Self {
        self.correction = correction;
        self
    }

    /// Called with (scored, total) after every class.
    pub fn with_progress(mut self, progress: impl FnMut(usize, usize) + 'a) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn species(&self) -> &str {
        &self.species
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Ranked results, most significant first. Problems with the input or
    /// the mappings are logged and give an empty list.
    pub fn get_enrichments(&mut self, input: EnrichmentInput<'_>, id_type: IdentifierType) -> Vec<EnrichmentResult> {
        if !self.source.is_ready() {
            warn!("{}: classification for {} is not available", self.name, self.species);
            return Vec::new();
        }

        let sample = match input {
            EnrichmentInput::Identifiers(ids) => self.resolve_identifiers(ids, id_type),
            EnrichmentInput::Records(records) => self.resolve_records(records, id_type),
        };
        let Some(sample) = sample else {
            return Vec::new();
        };
        if sample.list_size == 0 {
            warn!("{}: empty input list", self.name);
            return Vec::new();
        }

        let buckets = self.populate_buckets(&sample);
        let results = self.score(buckets, &sample);
        info!("{}: {} classes tested for {} list elements", self.name, results.len(), sample.list_size);
        results
    }

    // ─── Resolution ──────────────────────────────────────────────────────────

    fn resolve_identifiers(&self, ids: &[String], id_type: IdentifierType) -> Option<Sample> {
        let distinct: Vec<&str> = {
            let mut seen = HashSet::new();
            ids.iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty() && seen.insert(*s))
                .collect()
        };

        let translator = self.translator(id_type)?;
        let mut sample = Sample { list_size: distinct.len(), ..Default::default() };
        let mut failed = 0usize;
        for raw in distinct {
            match self.to_canonical(raw, id_type, translator.as_deref()) {
                Some(id) => sample.entries.push((id.clone(), ClassMember::Id(id))),
                None => {
                    warn!("{}: could not map '{}' ({}) to a canonical identifier", self.name, raw, id_type);
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            info!("{}: {} of {} identifiers could not be mapped", self.name, failed, sample.list_size);
        }
        Some(sample)
    }

    fn resolve_records(&self, records: &[Record], id_type: IdentifierType) -> Option<Sample> {
        let centered = gene_centered(records, &self.merge_policies);
        let needs_translation = centered.iter().any(|r| r.id.is_none() && !r.is_mirna());
        let translator = if needs_translation && !id_type.is_canonical() {
            self.translator(id_type)?
        } else {
            None
        };

        let mut sample = Sample::default();
        let mut target_genes: BTreeSet<u32> = BTreeSet::new();
        let mut mirnas = 0usize;
        let mut others = 0usize;
        for record in &centered {
            if record.is_mirna() {
                mirnas += 1;
                for target in unique_targets(&record.targets) {
                    target_genes.insert(target.target);
                    sample.entries.push((
                        EntityId::Gene(target.target),
                        ClassMember::MirnaTarget { mirna: record.name.clone(), target: target.target },
                    ));
                }
                continue;
            }
            others += 1;
            let id = record
                .id
                .clone()
                .or_else(|| self.to_canonical(&record.name, id_type, translator.as_deref()));
            match id {
                Some(id) => sample.entries.push((id.clone(), ClassMember::Record { label: record.label(), id })),
                None => warn!("{}: no identifier for record '{}'", self.name, record.name),
            }
        }

        sample.mirna_targets = mirnas > 0 && self.options.count_mirna_targets_for_list_ratio;
        sample.list_size = if sample.mirna_targets { target_genes.len() + others } else { mirnas + others };
        debug!(
            "{}: {} records gene-centered to {} ({} miRNAs, {} target genes)",
            self.name,
            records.len(),
            centered.len(),
            mirnas,
            target_genes.len()
        );
        Some(sample)
    }

    /// `Some(None)` for canonical types, the `ToCanonical` mapper otherwise.
    /// `None` (logged) when no usable mapper exists.
    fn translator(&self, id_type: IdentifierType) -> Option<Option<Rc<FlatFileMapper>>> {
        if id_type.is_canonical() {
            return Some(None);
        }
        let kind = MappingKind::ToCanonical(id_type);
        let Some(mapper) = self.mappers.get(&self.species, &kind) else {
            warn!("{}: no mapping to translate {} identifiers for {}", self.name, id_type, self.species);
            return None;
        };
        if !mapper.is_ready() {
            warn!("{}: {} mapping for {} is not available", self.name, kind, self.species);
            return None;
        }
        Some(Some(mapper))
    }

    fn to_canonical(
        &self,
        raw: &str,
        id_type: IdentifierType,
        translator: Option<&FlatFileMapper>,
    ) -> Option<EntityId> {
        match (id_type, translator) {
            (IdentifierType::NcbiGeneId, _) => EntityId::parse_canonical(raw).filter(|id| id.gene_id().is_some()),
            (IdentifierType::KeggCompound, _) => {
                EntityId::parse_canonical(raw).filter(|id| id.gene_id().is_none())
            }
            (_, Some(mapper)) => mapper.map(raw).and_then(EntityId::parse_canonical),
            (_, None) => None,
        }
    }

    // ─── Buckets and scoring ─────────────────────────────────────────────────

    fn populate_buckets(&self, sample: &Sample) -> BTreeMap<String, BTreeSet<ClassMember>> {
        let mut buckets: BTreeMap<String, BTreeSet<ClassMember>> = BTreeMap::new();
        for (id, member) in &sample.entries {
            for class_id in self.source.classes_of(id) {
                buckets.entry(class_id).or_default().insert(member.clone());
            }
        }
        debug!("{}: input hits {} classes", self.name, buckets.len());
        buckets
    }

    fn observed(&self, members: &BTreeSet<ClassMember>, sample: &Sample) -> usize {
        let mut genes: HashSet<EntityId> = HashSet::new();
        let mut mirnas: HashSet<&str> = HashSet::new();
        for member in members {
            match member {
                ClassMember::MirnaTarget { mirna, .. } if !sample.mirna_targets => {
                    mirnas.insert(mirna.as_str());
                }
                other => {
                    genes.insert(other.entity());
                }
            }
        }
        genes.len() + mirnas.len()
    }

    fn score(&mut self, buckets: BTreeMap<String, BTreeSet<ClassMember>>, sample: &Sample) -> Vec<EnrichmentResult> {
        let genome_size = self.source.genome_size();
        if genome_size == 0 {
            warn!("{}: classification has no annotated entities", self.name);
            return Vec::new();
        }
        if sample.list_size > genome_size {
            warn!(
                "{}: list size {} exceeds genome size {}",
                self.name, sample.list_size, genome_size
            );
        }
        let test = HypergeometricTest::new(genome_size, sample.list_size);

        struct Scored {
            class_id: String,
            members: BTreeSet<ClassMember>,
            observed: usize,
            class_size: usize,
            p_value: f64,
        }

        let total = buckets.len();
        let mut scored: Vec<Scored> = Vec::with_capacity(total);
        let mut removed = 0usize;
        for (done, (class_id, members)) in buckets.into_iter().enumerate() {
            let class_size = self.source.class_population_size(&class_id);
            if self.options.remove_uninformative_terms && class_size >= self.options.min_size_of_terms_to_remove {
                removed += 1;
            } else {
                let observed = self.observed(&members, sample);
                let p_value = test.p_value(class_size, observed);
                scored.push(Scored { class_id, members, observed, class_size, p_value });
            }
            if let Some(progress) = self.progress.as_mut() {
                progress(done + 1, total);
            }
        }
        if removed > 0 {
            debug!(
                "{}: removed {} classes with {} or more members",
                self.name, removed, self.options.min_size_of_terms_to_remove
            );
        }

        let keyed: Vec<(String, f64)> = scored.iter().map(|s| (s.class_id.clone(), s.p_value)).collect();
        let q_values = adjust_keyed(self.correction.as_ref(), &keyed);

        let mut results: Vec<EnrichmentResult> = scored
            .into_iter()
            .map(|s| {
                let q_value = q_values.get(&s.class_id).copied().unwrap_or(1.0);
                let class_name = self.source.class_name_for(&s.class_id).unwrap_or_else(|| s.class_id.clone());
                EnrichmentResult::new(
                    s.class_id,
                    class_name,
                    s.observed,
                    sample.list_size,
                    s.class_size,
                    genome_size,
                    s.p_value,
                    q_value,
                    s.members,
                )
            })
            .collect();
        results.sort_by(|a, b| a.p_value().total_cmp(&b.p_value()));
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::ClassificationTable;
    use crate::mirna::target::MirnaTarget;
    use crate::models::{RecordKind, SignalType};
    use crate::stats::Bonferroni;
    use std::cell::RefCell;

    /// 1000 genes (1..=1000): class A holds genes 1..=10, B holds 1..=100,
    /// C holds 501..=1000.
    fn table(species: &str) -> ClassificationTable {
        let mut t = ClassificationTable::new(Some(species.to_string()));
        for g in 1..=1000u32 {
            if g <= 10 {
                t.add_membership(EntityId::Gene(g), "A");
            }
            if g <= 100 {
                t.add_membership(EntityId::Gene(g), "B");
            }
            if g > 500 {
                t.add_membership(EntityId::Gene(g), "C");
            }
            t.add_membership(EntityId::Gene(g), "ALL");
        }
        t.set_name("A", "Small class");
        t
    }

    fn options() -> EnrichmentOptions {
        EnrichmentOptions { remove_uninformative_terms: false, ..Default::default() }
    }

    fn ids(range: impl Iterator<Item = u32>) -> Vec<String> {
        range.map(|g| g.to_string()).collect()
    }

    #[test]
    fn ranks_by_p_value() {
        let cache = MapperCache::default();
        let mut engine = EnrichmentEngine::new("test", "hsa", table("hsa"), &cache, options()).unwrap();
        let list = ids(1..=10);
        let results = engine.get_enrichments(EnrichmentInput::Identifiers(&list), IdentifierType::NcbiGeneId);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].class_id(), "A");
        assert_eq!(results[0].class_name(), "Small class");
        assert_eq!(results[0].observed(), 10);
        assert_eq!(results[0].list_size(), 10);
        assert_eq!(results[0].class_size(), 10);
        assert_eq!(results[0].genome_size(), 1000);
        assert_eq!(results[1].class_id(), "B");
        // unnamed classes report their id
        assert_eq!(results[2].class_name(), "ALL");
        assert_eq!(results[2].p_value(), 1.0);
        for w in results.windows(2) {
            assert!(w[0].p_value() <= w[1].p_value());
        }
        for r in &results {
            assert!(r.q_value() >= r.p_value());
        }
    }

    #[test]
    fn tied_classes_come_back_in_id_order() {
        let cache = MapperCache::default();
        let mut t = ClassificationTable::new(Some("hsa".to_string()));
        for g in 1..=100u32 {
            if g <= 10 {
                t.add_membership(EntityId::Gene(g), "hsa00020");
            }
            if (11..=20).contains(&g) {
                t.add_membership(EntityId::Gene(g), "hsa00010");
            }
            t.add_membership(EntityId::Gene(g), "hsa01100");
        }
        let mut engine = EnrichmentEngine::new("test", "hsa", t, &cache, options()).unwrap();
        let list = ids([1, 2, 3, 11, 12, 13].into_iter());
        let results = engine.get_enrichments(EnrichmentInput::Identifiers(&list), IdentifierType::NcbiGeneId);

        let order: Vec<&str> = results.iter().map(|r| r.class_id()).collect();
        assert_eq!(order, vec!["hsa00010", "hsa00020", "hsa01100"]);
        assert_eq!(results[0].p_value(), results[1].p_value());
        assert_eq!(results[0].q_value(), results[1].q_value());
    }

    #[test]
    fn list_larger_than_genome_keeps_its_size() {
        let cache = MapperCache::default();
        let mut engine = EnrichmentEngine::new("test", "hsa", table("hsa"), &cache, options()).unwrap();
        let list = ids(1..=1200);
        let results = engine.get_enrichments(EnrichmentInput::Identifiers(&list), IdentifierType::NcbiGeneId);

        assert!(!results.is_empty());
        for r in &results {
            assert_eq!(r.list_size(), 1200);
            assert_eq!(r.genome_size(), 1000);
            assert!((0.0..=1.0).contains(&r.p_value()));
        }
    }

    #[test]
    fn unmappable_symbols_count_toward_list_size() {
        let cache = MapperCache::default();
        let symbols: Vec<(String, String)> = (1..=99u32).map(|g| (format!("GENE{g}"), g.to_string())).collect();
        cache.insert(FlatFileMapper::from_pairs("hsa", MappingKind::ToCanonical(IdentifierType::GeneSymbol), symbols));

        let mut engine = EnrichmentEngine::new("test", "hsa", table("hsa"), &cache, options()).unwrap();
        let mut list: Vec<String> = (1..=99u32).map(|g| format!("GENE{g}")).collect();
        list.push("NOT_A_GENE".to_string());
        let results = engine.get_enrichments(EnrichmentInput::Identifiers(&list), IdentifierType::GeneSymbol);

        assert!(!results.is_empty());
        for r in &results {
            assert_eq!(r.list_size(), 100);
        }
        let b = results.iter().find(|r| r.class_id() == "B").unwrap();
        assert_eq!(b.observed(), 99);
    }

    #[test]
    fn missing_translation_gives_empty_result() {
        let cache = MapperCache::default();
        let mut engine = EnrichmentEngine::new("test", "hsa", table("hsa"), &cache, options()).unwrap();
        let list = vec!["TP53".to_string()];
        assert!(engine
            .get_enrichments(EnrichmentInput::Identifiers(&list), IdentifierType::GeneSymbol)
            .is_empty());
        assert!(engine
            .get_enrichments(EnrichmentInput::Identifiers(&[]), IdentifierType::NcbiGeneId)
            .is_empty());
    }

    #[test]
    fn species_mismatch_is_rejected() {
        let cache = MapperCache::default();
        let engine = EnrichmentEngine::new("test", "hsa", table("mmu"), &cache, options());
        assert!(matches!(engine, Err(IntegratorError::IncompatibleSpecies { .. })));
    }

    #[test]
    fn source_not_ready_gives_empty_result() {
        let cache = MapperCache::new(vec![crate::mapping::MapperSpec::new(
            "hsa",
            MappingKind::GeneToPathway,
            "/nonexistent/gene2kegg.txt",
        )]);
        let mut engine =
            EnrichmentEngine::for_kind(EnrichmentKind::KeggPathway, "hsa", &cache, options()).unwrap();
        assert_eq!(engine.name(), "KEGG Pathway Enrichment");
        let list = ids(1..=5);
        assert!(engine
            .get_enrichments(EnrichmentInput::Identifiers(&list), IdentifierType::NcbiGeneId)
            .is_empty());
    }

    #[test]
    fn uninformative_terms_are_removed() {
        let cache = MapperCache::default();
        let opts = EnrichmentOptions { min_size_of_terms_to_remove: 500, ..Default::default() };
        let mut engine = EnrichmentEngine::new("test", "hsa", table("hsa"), &cache, opts).unwrap();
        let list = ids(1..=10);
        let results = engine.get_enrichments(EnrichmentInput::Identifiers(&list), IdentifierType::NcbiGeneId);
        let classes: Vec<&str> = results.iter().map(|r| r.class_id()).collect();
        assert_eq!(classes, vec!["A", "B"]);
    }

    #[test]
    fn correction_reattaches_by_class() {
        let cache = MapperCache::default();
        let mut engine = EnrichmentEngine::new("test", "hsa", table("hsa"), &cache, options())
            .unwrap()
            .with_correction(Box::new(Bonferroni::default()));
        let list = ids(1..=10);
        let results = engine.get_enrichments(EnrichmentInput::Identifiers(&list), IdentifierType::NcbiGeneId);
        for r in &results {
            assert_eq!(r.q_value(), (r.p_value() * results.len() as f64).min(1.0));
        }
    }

    #[test]
    fn records_are_gene_centered() {
        let cache = MapperCache::default();
        let mut engine = EnrichmentEngine::new("test", "hsa", table("hsa"), &cache, options()).unwrap();
        let mut records: Vec<Record> = (1..=5u32)
            .map(|g| {
                Record::new(RecordKind::Mrna, format!("G{g}"))
                    .with_id(EntityId::Gene(g))
                    .with_signal("exp", SignalType::FoldChange, 1.0)
            })
            .collect();
        records.push(Record::new(RecordKind::Mrna, "G1").with_probe("p2").with_id(EntityId::Gene(1)));
        let results = engine.get_enrichments(EnrichmentInput::Records(&records), IdentifierType::NcbiGeneId);
        let a = results.iter().find(|r| r.class_id() == "A").unwrap();
        assert_eq!(a.list_size(), 5);
        assert_eq!(a.observed(), 5);
        assert_eq!(a.members().len(), 5);
    }

    #[test]
    fn mirna_list_ratio_modes() {
        let cache = MapperCache::default();
        let mut mir = Record::new(RecordKind::Mirna, "HSA-MIR-21");
        mir.set_targets(vec![
            MirnaTarget::new(1, true, "miRTarBase", None),
            MirnaTarget::new(2, false, "TargetScan", Some(0.3)),
            MirnaTarget::new(2, true, "miRTarBase", None),
        ]);
        let mut other = Record::new(RecordKind::Mirna, "HSA-MIR-155");
        other.set_targets(vec![MirnaTarget::new(3, true, "miRTarBase", None)]);
        let records = vec![mir, other];

        let mut engine = EnrichmentEngine::new("test", "hsa", table("hsa"), &cache, options()).unwrap();
        let results = engine.get_enrichments(EnrichmentInput::Records(&records), IdentifierType::MicroRnaName);
        let a = results.iter().find(|r| r.class_id() == "A").unwrap();
        assert_eq!(a.list_size(), 2);
        assert_eq!(a.observed(), 2);
        assert_eq!(a.members().len(), 3);

        let opts = EnrichmentOptions { count_mirna_targets_for_list_ratio: true, ..options() };
        let mut engine = EnrichmentEngine::new("test", "hsa", table("hsa"), &cache, opts).unwrap();
        let results = engine.get_enrichments(EnrichmentInput::Records(&records), IdentifierType::MicroRnaName);
        let a = results.iter().find(|r| r.class_id() == "A").unwrap();
        assert_eq!(a.list_size(), 3);
        assert_eq!(a.observed(), 3);
    }

    #[test]
    fn progress_is_reported() {
        let cache = MapperCache::default();
        let calls = RefCell::new(Vec::new());
        let mut engine = EnrichmentEngine::new("test", "hsa", table("hsa"), &cache, options())
            .unwrap()
            .with_progress(|done, total| calls.borrow_mut().push((done, total)));
        let list = ids(1..=3);
        engine.get_enrichments(EnrichmentInput::Identifiers(&list), IdentifierType::NcbiGeneId);
        drop(engine);
        assert_eq!(calls.into_inner(), vec![(1, 3), (2, 3), (3, 3)]);
    }
}
