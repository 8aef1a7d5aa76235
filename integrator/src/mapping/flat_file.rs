//! flat_file.rs - lazily loaded mapping tables backed by tab-delimited files.

use std::cell::OnceCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{IdentifierMapper, MappingKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    /// One `source<TAB>target` pair per line, repeated sources allowed.
    #[default]
    Pairs,
    /// MSigDB `set<TAB>description<TAB>gene...`, inverted to gene -> sets.
    Gmt,
}

fn default_target_column() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// Where a mapping lives and how to read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperSpec {
    pub species: String,
    pub kind: MappingKind,
    pub path: PathBuf,
    #[serde(default)]
    pub format: FileFormat,
    #[serde(default)]
    pub source_column: usize,
    #[serde(default = "default_target_column")]
    pub target_column: usize,
    #[serde(default)]
    pub has_header: bool,
    /// Strips `hsa:` / `path:` / `cpd:` style prefixes from identifiers.
    #[serde(default = "default_true")]
    pub trim_namespace: bool,
    #[serde(default)]
    pub case_insensitive: bool,
}

impl MapperSpec {
    pub fn new(species: impl Into<String>, kind: MappingKind, path: impl Into<PathBuf>) -> Self {
        Self {
            species: species.into(),
            kind,
            path: path.into(),
            format: FileFormat::Pairs,
            source_column: 0,
            target_column: default_target_column(),
            has_header: false,
            trim_namespace: true,
            case_insensitive: false,
        }
    }

    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = format;
        self
    }

    fn normalize_key(&self, raw: &str) -> String {
        let key = raw.trim();
        let key = if self.trim_namespace { strip_namespace(key) } else { key };
        if self.case_insensitive {
            key.to_uppercase()
        } else {
            key.to_string()
        }
    }

    fn normalize_target(&self, raw: &str) -> String {
        let target = raw.trim();
        // pathway names may legitimately contain ':'
        if self.trim_namespace && self.kind != MappingKind::PathwayName {
            strip_namespace(target).to_string()
        } else {
            target.to_string()
        }
    }
}

/// `hsa:7157` -> `7157`, `path:hsa04110` -> `hsa04110`.
pub fn strip_namespace(id: &str) -> &str {
    match id.split_once(':') {
        Some((ns, rest)) if !ns.is_empty() && ns.chars().all(|c| c.is_ascii_alphabetic()) => rest,
        _ => id,
    }
}

// ─── FlatFileMapper ──────────────────────────────────────────────────────────

pub struct FlatFileMapper {
    spec: MapperSpec,
    table: OnceCell<Option<HashMap<String, Vec<String>>>>,
}

impl FlatFileMapper {
    pub fn new(spec: MapperSpec) -> Self {
        Self { spec, table: OnceCell::new() }
    }

    /// A mapper that is ready from the start, for in-memory tables.
    pub fn from_pairs(species: &str, kind: MappingKind, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let spec = MapperSpec::new(species, kind, PathBuf::new());
        let mut table: HashMap<String, Vec<String>> = HashMap::new();
        for (source, target) in pairs {
            insert_unique(&mut table, spec.normalize_key(&source), spec.normalize_target(&target));
        }
        let cell = OnceCell::new();
        let _ = cell.set(Some(table));
        Self { spec, table: cell }
    }

    pub fn spec(&self) -> &MapperSpec {
        &self.spec
    }

    pub fn kind(&self) -> &MappingKind {
        &self.spec.kind
    }

    /// All entries, loading them on first use.
    pub fn entries(&self) -> Option<&HashMap<String, Vec<String>>> {
        self.table.get_or_init(|| self.load()).as_ref()
    }

    fn load(&self) -> Option<HashMap<String, Vec<String>>> {
        info!("Loading {} mapping for {} from {}", self.spec.kind, self.spec.species, self.spec.path.display());
        let file = match File::open(&self.spec.path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Could not open mapping file {}: {}", self.spec.path.display(), e);
                return None;
            }
        };

        let mut table: HashMap<String, Vec<String>> = HashMap::new();
        let mut skipped = 0usize;
        let mut lines = BufReader::new(file).lines();
        if self.spec.has_header {
            if let Some(Ok(header)) = lines.next() {
                debug!("Mapping file header: {}", header);
            }
        }

        for line in lines {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!("Could not read mapping file {}: {}", self.spec.path.display(), e);
                    return None;
                }
            };
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            match self.spec.format {
                FileFormat::Pairs => {
                    match (fields.get(self.spec.source_column), fields.get(self.spec.target_column)) {
                        (Some(source), Some(target)) if !source.trim().is_empty() && !target.trim().is_empty() => {
                            insert_unique(
                                &mut table,
                                self.spec.normalize_key(source),
                                self.spec.normalize_target(target),
                            );
                        }
                        _ => skipped += 1,
                    }
                }
                FileFormat::Gmt => {
                    if fields.len() < 3 {
                        skipped += 1;
                        continue;
                    }
                    let set = fields[0].trim();
                    for gene in fields[2..].iter().filter(|g| !g.trim().is_empty()) {
                        insert_unique(&mut table, self.spec.normalize_key(gene), set.to_string());
                    }
                }
            }
        }

        if skipped > 0 {
            debug!("Skipped {} malformed lines in {}", skipped, self.spec.path.display());
        }
        info!("Loaded {} source identifiers from {}", table.len(), self.spec.path.display());
        Some(table)
    }
}

impl IdentifierMapper for FlatFileMapper {
    fn is_ready(&self) -> bool {
        self.entries().is_some()
    }

    fn species(&self) -> Option<&str> {
        Some(self.spec.species.as_str()).filter(|s| !s.is_empty())
    }

    fn map_multiple(&self, source: &str) -> Option<&[String]> {
        self.entries()?
            .get(&self.spec.normalize_key(source))
            .map(Vec::as_slice)
    }
}

impl std::fmt::Debug for FlatFileMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.table.get() {
            None => "unloaded",
            Some(Some(_)) => "ready",
            Some(None) => "failed",
        };
        f.debug_struct("FlatFileMapper")
            .field("spec", &self.spec)
            .field("state", &state)
            .finish()
    }
}

//───── helpers ─────//

fn insert_unique(table: &mut HashMap<String, Vec<String>>, key: String, value: String) {
    let targets = table.entry(key).or_default();
    if !targets.contains(&value) {
        targets.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IdentifierType;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_lazily_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "gene2kegg.txt", "hsa:7157\tpath:hsa04115\nhsa:7157\tpath:hsa04110\n\n# c\nbroken\n");
        let mapper = FlatFileMapper::new(MapperSpec::new("hsa", MappingKind::GeneToPathway, &path));
        assert!(mapper.table.get().is_none());

        assert_eq!(mapper.map("7157"), Some("hsa04115"));
        assert_eq!(mapper.map_multiple("hsa:7157").map(<[_]>::len), Some(2));

        // the file is not read again
        std::fs::remove_file(&path).unwrap();
        assert!(mapper.is_ready());
        assert_eq!(mapper.map("1956"), None);
    }

    #[test]
    fn missing_file_is_not_ready() {
        let mapper = FlatFileMapper::new(MapperSpec::new("hsa", MappingKind::GeneToPathway, "/nonexistent/gene2kegg.txt"));
        assert!(!mapper.is_ready());
        assert_eq!(mapper.map("7157"), None);
        assert!(format!("{mapper:?}").contains("failed"));
    }

    #[test]
    fn gmt_is_inverted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "c2.gmt",
            "SET_A\thttp://a\tTP53\tEGFR\nSET_B\thttp://b\tTP53\n",
        );
        let mut spec = MapperSpec::new("hsa", MappingKind::GeneSets, &path).with_format(FileFormat::Gmt);
        spec.case_insensitive = true;
        let mapper = FlatFileMapper::new(spec);
        assert_eq!(mapper.map_multiple("tp53").map(|s| s.to_vec()), Some(vec!["SET_A".to_string(), "SET_B".to_string()]));
        assert_eq!(mapper.map("EGFR"), Some("SET_A"));
    }

    #[test]
    fn columns_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "probes.txt", "symbol\tprobe\tgene\nTP53\t201746_at\t7157\n");
        let mut spec = MapperSpec::new("hsa", MappingKind::ToCanonical(IdentifierType::Affymetrix), &path);
        spec.source_column = 1;
        spec.target_column = 2;
        spec.has_header = true;
        let mapper = FlatFileMapper::new(spec);
        assert_eq!(mapper.map("201746_at"), Some("7157"));
        assert_eq!(mapper.map("probe"), None);
    }

    #[test]
    fn pathway_names_keep_colons() {
        let mapper = FlatFileMapper::from_pairs(
            "hsa",
            MappingKind::PathwayName,
            vec![("path:hsa04110".to_string(), "Cell cycle: G1/S".to_string())],
        );
        assert_eq!(mapper.map("hsa04110"), Some("Cell cycle: G1/S"));
        assert_eq!(strip_namespace("10:20"), "10:20");
    }
}
