//! config.rs - pipeline configuration read from `<PROJECT_ROOT>/integrator.json`.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data_handling::expression::ExpressionTable;
use crate::data_handling::gene_list::GeneList;
use crate::enrichment::EnrichmentOptions;
use crate::error::{IntegratorError, Result};
use crate::gene_centering::MergePolicyTable;
use crate::helper_functions::project_root;
use crate::mapping::MapperSpec;

pub const CONFIG_FILE: &str = "integrator.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingOptions {
    pub experiment: String,
    pub gene_centered: bool,
    pub only_experimental_targets: bool,
    /// Annotate relation rows with the pathways of the target gene.
    pub annotate_pathways: bool,
}

impl Default for PairingOptions {
    fn default() -> Self {
        Self {
            experiment: "experiment".to_string(),
            gene_centered: true,
            only_experimental_targets: false,
            annotate_pathways: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    /// KEGG organism code, e.g. "hsa".
    pub species: String,
    pub mappers: Vec<MapperSpec>,
    pub enrichment: EnrichmentOptions,
    pub merge_policies: MergePolicyTable,
    pub gene_lists: Vec<GeneList>,
    pub mrna: Option<ExpressionTable>,
    pub mirna: Option<ExpressionTable>,
    pub mirna_targets: Option<PathBuf>,
    pub pairing: PairingOptions,
    pub output_dir: PathBuf,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            species: "hsa".to_string(),
            mappers: Vec::new(),
            enrichment: EnrichmentOptions::default(),
            merge_policies: MergePolicyTable::default(),
            gene_lists: Vec::new(),
            mrna: None,
            mirna: None,
            mirna_targets: None,
            pairing: PairingOptions::default(),
            output_dir: PathBuf::from("results"),
        }
    }
}

impl IntegratorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// `<PROJECT_ROOT>/integrator.json`, or the defaults when it does not exist.
    /// Relative paths in the file are resolved against the project root.
    pub fn from_project_root() -> Result<Self> {
        let root = project_root();
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            info!("No {} in {}, using defaults", CONFIG_FILE, root.display());
            let mut config = Self::default();
            config.resolve_paths(&root);
            return Ok(config);
        }
        let mut config = Self::load(&path)?;
        config.resolve_paths(&root);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.species.trim().is_empty() {
            return Err(IntegratorError::Config("species must not be empty".into()));
        }
        if self.enrichment.remove_uninformative_terms && self.enrichment.min_size_of_terms_to_remove == 0 {
            return Err(IntegratorError::Config(
                "min_size_of_terms_to_remove must be positive when removing uninformative terms".into(),
            ));
        }
        for spec in &self.mappers {
            if spec.source_column == spec.target_column {
                return Err(IntegratorError::Config(format!(
                    "mapper {} uses column {} as source and target",
                    spec.path.display(),
                    spec.source_column
                )));
            }
        }
        Ok(())
    }

    fn resolve_paths(&mut self, root: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = root.join(&*p);
            }
        };
        for spec in &mut self.mappers {
            resolve(&mut spec.path);
        }
        for list in &mut self.gene_lists {
            resolve(&mut list.path);
        }
        for table in self.mrna.iter_mut().chain(self.mirna.iter_mut()) {
            resolve(&mut table.path);
        }
        if let Some(p) = self.mirna_targets.as_mut() {
            resolve(p);
        }
        resolve(&mut self.output_dir);
    }
}
