// src/data_handling/expression.rs
// -----------------------------------------------------------------------------
// Differential expression tables (mRNA, miRNA, compounds). The file is read
// with every column as String; `records()` turns the rows into `Record`s with
// the configured columns as name, probe, id, description and signals.
// -----------------------------------------------------------------------------

use std::path::PathBuf;

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::helper_functions::read_tsv;
use crate::models::{polars_err, Dataset, EntityId, Record, RecordKind, SignalType};

fn default_experiment() -> String {
    "experiment".to_string()
}

/// Column layout of one tab-delimited expression table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionTable {
    pub path: PathBuf,
    pub kind: RecordKind,
    pub name_column: String,
    #[serde(default)]
    pub probe_column: Option<String>,
    #[serde(default)]
    pub id_column: Option<String>,
    #[serde(default)]
    pub description_column: Option<String>,
    #[serde(default = "default_experiment")]
    pub experiment: String,
    #[serde(default)]
    pub fold_change_column: Option<String>,
    #[serde(default)]
    pub p_value_column: Option<String>,
    #[serde(default)]
    pub q_value_column: Option<String>,
}

impl Dataset for ExpressionTable {
    fn load(&self) -> PolarsResult<DataFrame> {
        info!("Reading expression data from {}", self.path.display());
        match read_tsv(&self.path) {
            Ok(df) => Ok(df),
            Err(e) => {
                error!("Failed to read expression table {}: {}", self.path.display(), e);
                Err(e)
            }
        }
    }
}

impl ExpressionTable {
    pub fn records(&self) -> PolarsResult<Vec<Record>> {
        let df = self.load()?;
        let names = string_column(&df, Some(&self.name_column))?
            .ok_or_else(|| polars_err(format!("missing name column {}", self.name_column).into()))?;
        let probes = string_column(&df, self.probe_column.as_deref())?;
        let ids = string_column(&df, self.id_column.as_deref())?;
        let descriptions = string_column(&df, self.description_column.as_deref())?;
        let signals: Vec<(SignalType, StringChunked)> = [
            (SignalType::FoldChange, &self.fold_change_column),
            (SignalType::PValue, &self.p_value_column),
            (SignalType::QValue, &self.q_value_column),
        ]
        .into_iter()
        .filter_map(|(kind, col)| match string_column(&df, col.as_deref()) {
            Ok(Some(values)) => Some(Ok((kind, values))),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        })
        .collect::<PolarsResult<_>>()?;

        let mut records = Vec::with_capacity(df.height());
        let mut unparsable = 0usize;
        for i in 0..df.height() {
            let Some(name) = names.get(i).map(str::trim).filter(|s| !s.is_empty()) else {
                continue;
            };
            let mut record = Record::new(self.kind, name);
            if let Some(probe) = probes.as_ref().and_then(|c| c.get(i)).map(str::trim).filter(|s| !s.is_empty()) {
                record.probe = Some(probe.to_string());
            }
            record.id = ids.as_ref().and_then(|c| c.get(i)).and_then(EntityId::parse_canonical);
            if let Some(desc) = descriptions.as_ref().and_then(|c| c.get(i)).map(str::trim).filter(|s| !s.is_empty()) {
                record.data.insert("description".to_string(), desc.to_string());
            }
            for (kind, values) in &signals {
                match values.get(i).map(|v| v.trim().parse::<f64>()) {
                    Some(Ok(v)) => {
                        record = record.with_signal(&self.experiment, *kind, v);
                    }
                    Some(Err(_)) => unparsable += 1,
                    None => {}
                }
            }
            records.push(record);
        }

        if unparsable > 0 {
            warn!("{} signal values in {} could not be parsed", unparsable, self.path.display());
        }
        info!("Read {} {:?} records from {}", records.len(), self.kind, self.path.display());
        Ok(records)
    }
}

//───── helpers ─────//

fn string_column(df: &DataFrame, name: Option<&str>) -> PolarsResult<Option<StringChunked>> {
    match name {
        None => Ok(None),
        Some(name) => Ok(Some(df.column(name)?.str()?.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rows_become_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mrna.tsv");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(
                b"Probe\tSymbol\tGeneID\tDescription\tlogFC\tP.Value\n\
                  201746_at\tTP53\t7157\ttumor protein p53\t1.5\t0.001\n\
                  211607_x_at\tEGFR\t1956\t\tNA\t0.2\n\
                  \t\t\t\t\t\n",
            )
            .unwrap();

        let table = ExpressionTable {
            path,
            kind: RecordKind::Mrna,
            name_column: "Symbol".into(),
            probe_column: Some("Probe".into()),
            id_column: Some("GeneID".into()),
            description_column: Some("Description".into()),
            experiment: "exp".into(),
            fold_change_column: Some("logFC".into()),
            p_value_column: Some("P.Value".into()),
            q_value_column: None,
        };
        let records = table.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].gene_id(), Some(7157));
        assert_eq!(records[0].probe.as_deref(), Some("201746_at"));
        assert_eq!(records[0].fold_change("exp"), Some(1.5));
        assert_eq!(records[0].description(), Some("tumor protein p53"));
        assert_eq!(records[1].fold_change("exp"), None);
        assert_eq!(records[1].p_value("exp"), Some(0.2));
    }

    #[test]
    fn missing_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirna.tsv");
        std::fs::File::create(&path).unwrap().write_all(b"Name\tFC\nhsa-miR-21\t2.0\n").unwrap();
        let table = ExpressionTable {
            path,
            kind: RecordKind::Mirna,
            name_column: "miRNA".into(),
            probe_column: None,
            id_column: None,
            description_column: None,
            experiment: "exp".into(),
            fold_change_column: Some("FC".into()),
            p_value_column: None,
            q_value_column: None,
        };
        assert!(table.records().is_err());
    }
}
