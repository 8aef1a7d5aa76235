#![allow(unused)]

use std::fs;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::IntegratorConfig;
use crate::enrichment::{EnrichmentEngine, EnrichmentInput, EnrichmentRow};
use crate::helper_functions::write_tsv;
use crate::mapping::{IdentifierMapper, MapperCache, MappingKind};
use crate::mirna::pairing::{write_paired_table, MirnaMrnaPairing};
use crate::mirna::store::read_targets;

mod config;
mod data_handling;
mod enrichment;
mod error;
mod gene_centering;
mod helper_functions;
mod mapping;
mod mirna;
mod models;
mod stats;

fn main() -> Result<()> {
    // Setup logging and project configuration
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting the integrator pipeline");

    let config = IntegratorConfig::from_project_root().context("reading configuration")?;
    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating output directory {}", config.output_dir.display()))?;

    let cache = MapperCache::new(config.mappers.clone());

    run_enrichments(&config, &cache)?;
    run_pairing(&config, &cache)?;

    info!("Pipeline finished, results in {}", config.output_dir.display());
    Ok(())
}

// ─── Enrichment ──────────────────────────────────────────────────────────────

fn run_enrichments(config: &IntegratorConfig, cache: &MapperCache) -> Result<()> {
    for list in &config.gene_lists {
        let ids = match list.load() {
            Ok(ids) => ids,
            Err(e) => {
                error!("Skipping gene list '{}': {}", list.name, e);
                continue;
            }
        };

        for kind in &config.enrichment.kinds {
            let mut engine = match EnrichmentEngine::for_kind(*kind, &config.species, cache, config.enrichment.clone()) {
                Ok(engine) => engine.with_merge_policies(config.merge_policies.clone()),
                Err(e) => {
                    error!("{} unavailable: {}", kind.display_name(), e);
                    continue;
                }
            };

            let results = engine.get_enrichments(EnrichmentInput::Identifiers(&ids), list.identifier_type);
            if results.is_empty() {
                info!("{}: no enrichment for list '{}'", engine.name(), list.name);
                continue;
            }
            let rows: Vec<EnrichmentRow> = results.iter().map(|r| r.to_row()).collect();
            let out = config.output_dir.join(format!("{}_{}.tsv", list.name, kind.slug()));
            write_tsv(&rows, &out).with_context(|| format!("writing {}", out.display()))?;
            info!("{}: {} classes for '{}' written to {}", engine.name(), rows.len(), list.name, out.display());
        }
    }
    Ok(())
}

// ─── miRNA-mRNA pairing ──────────────────────────────────────────────────────

fn run_pairing(config: &IntegratorConfig, cache: &MapperCache) -> Result<()> {
    let (Some(mirna_table), Some(mrna_table)) = (&config.mirna, &config.mrna) else {
        info!("No miRNA and mRNA tables configured, skipping pairing");
        return Ok(());
    };

    let mut mirnas = mirna_table.records().context("reading miRNA table")?;
    let mrnas = mrna_table.records().context("reading mRNA table")?;
    let options = &config.pairing;

    let pairing = match &config.mirna_targets {
        Some(path) => {
            let mut targets = read_targets(path).with_context(|| format!("reading targets {}", path.display()))?;
            if options.only_experimental_targets {
                let removed = targets.filter_targets_only_experimental();
                info!("Removed {} predicted targets", removed);
            }
            MirnaMrnaPairing::with_targets(&mut mirnas, &targets, &mrnas, &options.experiment)
        }
        None => {
            warn!("No miRNA target store configured, using targets attached to the records");
            MirnaMrnaPairing::new(&mirnas, &mrnas, &options.experiment)
        }
    };

    let relations = pairing.expression_paired_table(&mirnas, options.gene_centered, &config.merge_policies);
    let pathways = if options.annotate_pathways {
        cache.get(&config.species, &MappingKind::GeneToPathway).filter(|m| m.is_ready())
    } else {
        None
    };
    let rows = pairing.relation_rows(&relations, pathways.as_deref().map(|m| m as &dyn IdentifierMapper));

    let out = config.output_dir.join("mirna_mrna_pairs.tsv");
    write_paired_table(&rows, &out).with_context(|| format!("writing {}", out.display()))?;
    Ok(())
}
