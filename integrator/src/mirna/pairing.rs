//! pairing.rs - pairs miRNAs with the mRNAs of their target genes and scores
//! how strongly the expression changes oppose each other.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::gene_centering::{gene_centered, MergePolicyTable};
use crate::helper_functions::write_tsv;
use crate::mapping::IdentifierMapper;
use crate::mirna::target::{unique_targets, MirnaTarget};
use crate::mirna::targets::{link_mirna_and_targets, MirnaTargets};
use crate::models::Record;

// ─── FoldChangeRange ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoldChangeRange {
    pub min: f64,
    pub max: f64,
}

impl FoldChangeRange {
    pub fn of(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values.into_iter().filter(|v| v.is_finite()).fold(None, |range, v| match range {
            None => Some(Self { min: v, max: v }),
            Some(r) => Some(Self { min: r.min.min(v), max: r.max.max(v) }),
        })
    }

    /// Rescales `value` into [-0.5, 0.5]; a degenerate range maps to 0.
    pub fn normalize(&self, value: f64) -> f64 {
        let width = self.max - self.min;
        if width.abs() < f64::EPSILON {
            return 0.0;
        }
        ((value - self.min) / width - 0.5).clamp(-0.5, 0.5)
    }
}

// ─── Relations ───────────────────────────────────────────────────────────────

/// A miRNA, one of its targets and an mRNA measured for that target gene.
#[derive(Debug, Clone, PartialEq)]
pub struct PairedRelation {
    pub mirna: Record,
    pub target: MirnaTarget,
    pub mrna: Record,
}

/// Exported row of the relation table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairedRow {
    #[serde(rename = "miRNA_probe")]
    pub mirna_probe: String,
    #[serde(rename = "miRNA")]
    pub mirna: String,
    #[serde(rename = "miRNA_p-value")]
    pub mirna_p_value: Option<f64>,
    #[serde(rename = "miRNA_FC")]
    pub mirna_fc: Option<f64>,
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Relationship")]
    pub relationship: String,
    #[serde(rename = "Combined_FC")]
    pub score: Option<f64>,
    #[serde(rename = "mRNA_probe")]
    pub mrna_probe: String,
    #[serde(rename = "mRNA")]
    pub mrna: String,
    #[serde(rename = "mRNA_p-value")]
    pub mrna_p_value: Option<f64>,
    #[serde(rename = "mRNA_FC")]
    pub mrna_fc: Option<f64>,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "GeneID")]
    pub gene_id: u32,
    #[serde(rename = "Pathways")]
    pub pathways: String,
}

/// "Up_Down" style label from the signs of the two fold changes.
pub fn relationship(mirna_fc: f64, mrna_fc: f64) -> String {
    let direction = |fc: f64| if fc > 0.0 { "Up" } else { "Down" };
    format!("{}_{}", direction(mirna_fc), direction(mrna_fc))
}

// ─── MirnaMrnaPairing ────────────────────────────────────────────────────────

/// Target gene index over an mRNA collection with the fold-change ranges of
/// both collections for one experiment.
#[derive(Debug, Clone)]
pub struct MirnaMrnaPairing {
    experiment: String,
    link: HashMap<u32, Vec<Record>>,
    mrna_range: Option<FoldChangeRange>,
    mirna_range: Option<FoldChangeRange>,
}

impl MirnaMrnaPairing {
    /// Indexes the mRNAs of every gene targeted by one of `mirnas`.
    pub fn new(mirnas: &[Record], mrnas: &[Record], experiment: &str) -> Self {
        let mut pairing = Self {
            experiment: experiment.to_string(),
            link: HashMap::new(),
            mrna_range: None,
            mirna_range: None,
        };
        pairing.relink(mirnas, mrnas);
        pairing
    }

    /// Attaches targets from `targets` to `mirnas` before indexing.
    pub fn with_targets(mirnas: &mut [Record], targets: &MirnaTargets, mrnas: &[Record], experiment: &str) -> Self {
        link_mirna_and_targets(targets, mirnas);
        Self::new(mirnas, mrnas, experiment)
    }

    /// Rebuilds the index and both fold-change ranges.
    pub fn relink(&mut self, mirnas: &[Record], mrnas: &[Record]) {
        let (by_gene, mrna_range) = Self::gene_index(mrnas, &self.experiment);
        let targeted: std::collections::HashSet<u32> =
            mirnas.iter().flat_map(|m| m.targets.iter().map(|t| t.target)).collect();

        self.link = by_gene.into_iter().filter(|(gene, _)| targeted.contains(gene)).collect();
        self.mrna_range = mrna_range;
        self.mirna_range = FoldChangeRange::of(mirnas.iter().filter_map(|m| m.fold_change(&self.experiment)));

        info!(
            "Linked {} target genes of {} miRNAs to {} mRNAs",
            self.link.len(),
            mirnas.len(),
            mrnas.len()
        );
        debug!("Fold-change ranges: mRNA {:?}, miRNA {:?}", self.mrna_range, self.mirna_range);
    }

    /// Gene id to all mRNA records of that gene, with the mRNA fold-change range.
    pub fn gene_index(mrnas: &[Record], experiment: &str) -> (HashMap<u32, Vec<Record>>, Option<FoldChangeRange>) {
        let mut by_gene: HashMap<u32, Vec<Record>> = HashMap::new();
        for mrna in mrnas {
            if let Some(gene) = mrna.gene_id() {
                by_gene.entry(gene).or_default().push(mrna.clone());
            }
        }
        let range = FoldChangeRange::of(mrnas.iter().filter_map(|m| m.fold_change(experiment)));
        (by_gene, range)
    }

    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    pub fn mrna_range(&self) -> Option<FoldChangeRange> {
        self.mrna_range
    }

    pub fn mirna_range(&self) -> Option<FoldChangeRange> {
        self.mirna_range
    }

    pub fn mrnas_for_gene(&self, gene: u32) -> &[Record] {
        self.link.get(&gene).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn mrnas_for_target(&self, target: &MirnaTarget) -> &[Record] {
        self.mrnas_for_gene(target.target)
    }

    pub fn mrnas_for_mirna(&self, mirna: &Record) -> Vec<&Record> {
        unique_targets(&mirna.targets)
            .iter()
            .flat_map(|t| self.mrnas_for_gene(t.target))
            .collect()
    }

    /// `norm(mRNA fc) - norm(miRNA fc)`, both rescaled with their own range.
    /// High values mean the miRNA went down while its target went up.
    pub fn pairing_score(&self, mirna_fc: f64, mrna_fc: f64) -> Option<f64> {
        let mirna = self.mirna_range?.normalize(mirna_fc);
        let mrna = self.mrna_range?.normalize(mrna_fc);
        Some(mrna - mirna)
    }

    pub fn relation_score(&self, relation: &PairedRelation) -> Option<f64> {
        let mirna_fc = relation.mirna.fold_change(&self.experiment)?;
        let mrna_fc = relation.mrna.fold_change(&self.experiment)?;
        self.pairing_score(mirna_fc, mrna_fc)
    }

    /// One relation per (miRNA, unique target, mRNA). With `gene_centered`
    /// the miRNAs and each per-target mRNA list are gene-centered first.
    pub fn expression_paired_table(
        &self,
        mirnas: &[Record],
        gene_centered_output: bool,
        policies: &MergePolicyTable,
    ) -> Vec<PairedRelation> {
        let centered;
        let mirnas = if gene_centered_output {
            centered = gene_centered(mirnas, policies);
            centered.as_slice()
        } else {
            mirnas
        };

        let mut relations = Vec::new();
        for mirna in mirnas.iter().filter(|m| m.has_targets()) {
            for target in unique_targets(&mirna.targets) {
                let mrnas = self.mrnas_for_target(&target);
                if mrnas.is_empty() {
                    continue;
                }
                let mrnas = if gene_centered_output { gene_centered(mrnas, policies) } else { mrnas.to_vec() };
                for mrna in mrnas {
                    relations.push(PairedRelation { mirna: mirna.clone(), target: target.clone(), mrna });
                }
            }
        }
        info!("Built {} miRNA-mRNA relations", relations.len());
        relations
    }

    /// Table rows; `pathways` is an optional gene id to pathway mapper.
    pub fn relation_rows(&self, relations: &[PairedRelation], pathways: Option<&dyn IdentifierMapper>) -> Vec<PairedRow> {
        relations
            .iter()
            .map(|r| {
                let mirna_fc = r.mirna.fold_change(&self.experiment);
                let mrna_fc = r.mrna.fold_change(&self.experiment);
                let gene_id = r.mrna.gene_id().unwrap_or(r.target.target);
                let pathways = pathways
                    .and_then(|m| m.map_multiple(&gene_id.to_string()))
                    .map(|p| p.join(", "))
                    .unwrap_or_default();
                PairedRow {
                    mirna_probe: r.mirna.probe.clone().unwrap_or_default(),
                    mirna: r.mirna.name.clone(),
                    mirna_p_value: r.mirna.p_value(&self.experiment),
                    mirna_fc,
                    source: r.target.source.clone(),
                    relationship: match (mirna_fc, mrna_fc) {
                        (Some(a), Some(b)) => relationship(a, b),
                        _ => String::new(),
                    },
                    score: self.relation_score(r),
                    mrna_probe: r.mrna.probe.clone().unwrap_or_default(),
                    mrna: r.mrna.name.clone(),
                    mrna_p_value: r.mrna.p_value(&self.experiment),
                    mrna_fc,
                    description: r.mrna.description().unwrap_or_default().to_string(),
                    gene_id,
                    pathways,
                }
            })
            .collect()
    }
}

pub fn write_paired_table(rows: &[PairedRow], path: &Path) -> Result<()> {
    write_tsv(rows, path)?;
    info!("Wrote {} relations to {}", rows.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::FlatFileMapper;
    use crate::mapping::MappingKind;
    use crate::models::{EntityId, RecordKind, SignalType};

    const EXP: &str = "tumor_vs_normal";

    fn mirna(name: &str, fc: f64, targets: &[u32]) -> Record {
        let mut r = Record::new(RecordKind::Mirna, name)
            .with_signal(EXP, SignalType::FoldChange, fc)
            .with_signal(EXP, SignalType::PValue, 0.001);
        r.set_targets(targets.iter().map(|t| MirnaTarget::new(*t, true, "miRTarBase", None)).collect());
        r
    }

    fn mrna(name: &str, probe: &str, gene: u32, fc: f64) -> Record {
        Record::new(RecordKind::Mrna, name)
            .with_probe(probe)
            .with_id(EntityId::Gene(gene))
            .with_signal(EXP, SignalType::FoldChange, fc)
            .with_data("description", format!("{name} description"))
    }

    #[test]
    fn discordant_pair_scores_one() {
        let mirnas = vec![mirna("hsa-miR-21", -2.0, &[7157]), mirna("hsa-miR-155", 2.0, &[])];
        let mrnas = vec![mrna("TP53", "a_at", 7157, 1.0), mrna("EGFR", "b_at", 1956, -1.0)];
        let pairing = MirnaMrnaPairing::new(&mirnas, &mrnas, EXP);
        let score = pairing.pairing_score(-2.0, 1.0).unwrap();
        assert!((score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_range_normalizes_to_zero() {
        let range = FoldChangeRange { min: 1.5, max: 1.5 };
        assert_eq!(range.normalize(1.5), 0.0);
        let range = FoldChangeRange::of([-2.0, 2.0, f64::NAN]).unwrap();
        assert_eq!(range.normalize(-2.0), -0.5);
        assert_eq!(range.normalize(0.0), 0.0);
    }

    #[test]
    fn no_fold_changes_no_score() {
        let mirnas = vec![Record::new(RecordKind::Mirna, "hsa-miR-21")];
        let pairing = MirnaMrnaPairing::new(&mirnas, &[], EXP);
        assert_eq!(pairing.pairing_score(1.0, 1.0), None);
    }

    #[test]
    fn relink_refreshes_ranges() {
        let mirnas = vec![mirna("hsa-miR-21", -2.0, &[7157]), mirna("hsa-miR-155", 2.0, &[1956])];
        let mut pairing = MirnaMrnaPairing::new(&mirnas, &[mrna("TP53", "a_at", 7157, 1.0)], EXP);
        assert_eq!(pairing.mrna_range(), Some(FoldChangeRange { min: 1.0, max: 1.0 }));
        assert!(pairing.mrnas_for_gene(1956).is_empty());

        pairing.relink(&mirnas, &[mrna("TP53", "a_at", 7157, 4.0), mrna("EGFR", "b_at", 1956, -4.0)]);
        assert_eq!(pairing.mrna_range(), Some(FoldChangeRange { min: -4.0, max: 4.0 }));
        assert_eq!(pairing.mrnas_for_gene(1956).len(), 1);
        assert_eq!(pairing.mrnas_for_mirna(&mirnas[0]).len(), 1);
    }

    #[test]
    fn untargeted_genes_are_not_linked() {
        let mirnas = vec![mirna("hsa-miR-21", -2.0, &[7157])];
        let mrnas = vec![mrna("TP53", "a_at", 7157, 1.0), mrna("EGFR", "b_at", 1956, -1.0)];
        let pairing = MirnaMrnaPairing::new(&mirnas, &mrnas, EXP);
        assert_eq!(pairing.mrnas_for_gene(7157).len(), 1);
        assert!(pairing.mrnas_for_gene(1956).is_empty());
    }

    #[test]
    fn with_targets_links_from_index() {
        let mut index = MirnaTargets::new();
        index.add_target("hsa-miR-21", MirnaTarget::new(7157, true, "miRTarBase", None));
        let mut mirnas = vec![mirna("hsa-miR-21", -2.0, &[])];
        let mrnas = vec![mrna("TP53", "a_at", 7157, 1.0)];
        let pairing = MirnaMrnaPairing::with_targets(&mut mirnas, &index, &mrnas, EXP);
        assert!(mirnas[0].has_targets());
        assert_eq!(pairing.mrnas_for_gene(7157).len(), 1);
    }

    #[test]
    fn paired_table_gene_centered() {
        let mirnas = vec![mirna("hsa-miR-21", -2.0, &[7157, 1956]), mirna("hsa-miR-155", 2.0, &[])];
        let mrnas = vec![
            mrna("TP53", "a_at", 7157, 1.0),
            mrna("TP53", "c_at", 7157, 0.0),
            mrna("EGFR", "b_at", 1956, -1.0),
        ];
        let pairing = MirnaMrnaPairing::new(&mirnas, &mrnas, EXP);

        let per_probe = pairing.expression_paired_table(&mirnas, false, &MergePolicyTable::default());
        assert_eq!(per_probe.len(), 3);

        let centered = pairing.expression_paired_table(&mirnas, true, &MergePolicyTable::default());
        assert_eq!(centered.len(), 2);
        let tp53 = centered.iter().find(|r| r.target.target == 7157).unwrap();
        assert_eq!(tp53.mrna.fold_change(EXP), Some(0.5));
        assert_eq!(tp53.mrna.probe.as_deref(), Some("a_at, c_at"));
    }

    #[test]
    fn rows_carry_relationship_and_pathways() {
        let mirnas = vec![mirna("hsa-miR-21", -2.0, &[7157]), mirna("hsa-miR-155", 2.0, &[])];
        let mrnas = vec![mrna("TP53", "a_at", 7157, 1.0), mrna("EGFR", "b_at", 1956, -1.0)];
        let pairing = MirnaMrnaPairing::new(&mirnas, &mrnas, EXP);
        let relations = pairing.expression_paired_table(&mirnas, false, &MergePolicyTable::default());

        let pathways = FlatFileMapper::from_pairs(
            "hsa",
            MappingKind::GeneToPathway,
            vec![("7157".to_string(), "hsa04115".to_string()), ("7157".to_string(), "hsa04110".to_string())],
        );
        let rows = pairing.relation_rows(&relations, Some(&pathways as &dyn IdentifierMapper));
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.relationship, "Down_Up");
        assert_eq!(row.gene_id, 7157);
        assert_eq!(row.pathways, "hsa04115, hsa04110");
        assert_eq!(row.description, "TP53 description");
        assert!((row.score.unwrap() - 1.0).abs() < 1e-12);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.tsv");
        write_paired_table(&rows, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let header = written.lines().next().unwrap();
        assert!(header.starts_with("miRNA_probe\tmiRNA\tmiRNA_p-value\tmiRNA_FC\tSource\tRelationship"));
        assert!(header.ends_with("GeneID\tPathways"));
    }
}
