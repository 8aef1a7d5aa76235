use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use polars::prelude::*;
use serde::Serialize;

use crate::error::Result;
use crate::models::polars_err;

pub fn project_root() -> PathBuf {
    match env::var_os("PROJECT_ROOT") {
        Some(val) => PathBuf::from(val),
        None => {
            // Fall back to current directory if PROJECT_ROOT not set
            env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        }
    }
}

/// Reads a tab-delimited table with every column as String.
pub fn read_tsv(path: &Path) -> PolarsResult<DataFrame> {
    if !path.exists() {
        return Err(polars_err(format!("table not found: {}", path.display()).into()));
    }

    let header_fields = {
        let file = File::open(path).map_err(|e| polars_err(Box::new(e)))?;
        let mut rdr = BufReader::new(file);
        let mut hdr = String::new();
        rdr.read_line(&mut hdr).map_err(|e| polars_err(Box::new(e)))?;
        hdr.trim_end().split('\t').count()
    };
    let dtype_override: Arc<Vec<DataType>> = Arc::new(vec![DataType::String; header_fields]);

    CsvReadOptions::default()
        .with_has_header(true)
        .with_dtype_overwrite(Some(dtype_override))
        .map_parse_options(|mut o| {
            o.separator = b'\t';
            o.quote_char = None;
            o.encoding = CsvEncoding::LossyUtf8;
            o.truncate_ragged_lines = true;
            o
        })
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
}

/// Writes serde rows as a tab-delimited table with a header line.
pub fn write_tsv<T: Serialize>(rows: &[T], path: &Path) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// One identifier per line; blank lines and `#` comments are skipped.
pub fn read_id_list(path: &Path) -> Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut ids = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let id = line.split('\t').next().unwrap_or("").trim();
        if id.is_empty() || id.starts_with('#') {
            continue;
        }
        ids.push(id.to_string());
    }
    Ok(ids)
}
