//! store.rs - tab-delimited persistence of a `MirnaTargets` index.
//!
//! Every line starts with the schema version it was written with:
//!
//! ```text
//! v0: 0  mirna  target  experimental  source  score
//! v1: 1  mirna  target  experimental  source  score  symbol
//! ```
//!
//! Decoding dispatches through `DECODERS`; an unknown version is an error.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::error::{IntegratorError, Result};
use crate::mirna::target::MirnaTarget;
use crate::mirna::targets::MirnaTargets;

pub const CURRENT_VERSION: u32 = 1;

type Decoder = fn(&[&str]) -> std::result::Result<(String, MirnaTarget), String>;

const DECODERS: &[(u32, Decoder)] = &[(0, decode_v0), (1, decode_v1)];

pub fn write_targets(targets: &MirnaTargets, path: &Path) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write_targets_to(targets, &mut out)?;
    out.flush()?;
    info!("Wrote {} to {}", targets.summary(), path.display());
    Ok(())
}

pub fn write_targets_to(targets: &MirnaTargets, out: &mut impl Write) -> Result<()> {
    writeln!(out, "# version\tmirna\ttarget\texperimental\tsource\tscore\tsymbol")?;
    for (mirna, list) in targets.iter() {
        for t in list {
            let score = t.score.map(|s| s.to_string()).unwrap_or_default();
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                CURRENT_VERSION,
                mirna,
                t.target,
                t.experimental,
                t.source.replace('\t', " "),
                score,
                t.target_symbol.as_deref().unwrap_or("")
            )?;
        }
    }
    Ok(())
}

pub fn read_targets(path: &Path) -> Result<MirnaTargets> {
    let reader = BufReader::new(File::open(path)?);
    let targets = read_targets_from(reader, &path.display().to_string())?;
    info!("Read {} from {}", targets.summary(), path.display());
    Ok(targets)
}

pub fn read_targets_from(reader: impl BufRead, context: &str) -> Result<MirnaTargets> {
    let mut targets = MirnaTargets::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let version: u32 = fields[0].trim().parse().map_err(|_| {
            IntegratorError::parse(format!("{context}:{}", line_no + 1), "missing version tag")
        })?;
        let decoder = DECODERS
            .iter()
            .find(|(v, _)| *v == version)
            .map(|(_, d)| *d)
            .ok_or(IntegratorError::UnsupportedVersion(version))?;
        let (mirna, target) = decoder(&fields[1..])
            .map_err(|message| IntegratorError::parse(format!("{context}:{}", line_no + 1), message))?;
        if !targets.add_target(&mirna, target) {
            warn!("Duplicate target for {} at {}:{}", mirna, context, line_no + 1);
        }
    }
    Ok(targets)
}

//───── decoders ─────//

fn decode_v0(fields: &[&str]) -> std::result::Result<(String, MirnaTarget), String> {
    if fields.len() < 5 {
        return Err(format!("expected 5 fields, found {}", fields.len()));
    }
    let mirna = fields[0].trim();
    if mirna.is_empty() {
        return Err("empty miRNA name".to_string());
    }
    let target: u32 = fields[1]
        .trim()
        .parse()
        .map_err(|_| format!("invalid target gene id '{}'", fields[1]))?;
    let experimental = match fields[2].trim().to_ascii_lowercase().as_str() {
        "true" | "1" => true,
        "false" | "0" => false,
        other => return Err(format!("invalid experimental flag '{other}'")),
    };
    let score = match fields[4].trim() {
        "" => None,
        s => Some(s.parse::<f64>().map_err(|_| format!("invalid score '{s}'"))?),
    };
    Ok((mirna.to_string(), MirnaTarget::new(target, experimental, fields[3].trim(), score)))
}

fn decode_v1(fields: &[&str]) -> std::result::Result<(String, MirnaTarget), String> {
    let (mirna, mut target) = decode_v0(fields)?;
    if let Some(symbol) = fields.get(5).map(|s| s.trim()).filter(|s| !s.is_empty()) {
        target.target_symbol = Some(symbol.to_string());
    }
    Ok((mirna, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn write_then_read_file() {
        let mut targets = MirnaTargets::new();
        targets.add_target("hsa-miR-21", MirnaTarget::new(7157, true, "miRTarBase", None).with_symbol("TP53"));
        targets.add_target("hsa-miR-21", MirnaTarget::new(1956, false, "TargetScan", Some(0.25)));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.tsv");
        write_targets(&targets, &path).unwrap();
        let back = read_targets(&path).unwrap();
        assert_eq!(back, targets);

        let tp53 = back.targets_of("hsa-miR-21").unwrap().iter().find(|t| t.target == 7157).unwrap();
        assert_eq!(tp53.target_symbol.as_deref(), Some("TP53"));
    }

    #[test]
    fn reads_version_zero_lines() {
        let input = "0\tHSA-MIR-1\t2064\tfalse\tPicTar\t3.5\n";
        let targets = read_targets_from(Cursor::new(input), "test").unwrap();
        let t = &targets.targets_of("hsa-miR-1").unwrap()[0];
        assert_eq!(t.score, Some(3.5));
        assert_eq!(t.target_symbol, None);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let input = "7\tHSA-MIR-1\t2064\tfalse\tPicTar\t3.5\n";
        match read_targets_from(Cursor::new(input), "test") {
            Err(IntegratorError::UnsupportedVersion(7)) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_line_names_position() {
        let input = "# header\n1\tHSA-MIR-1\tnot-a-gene\tfalse\tPicTar\t\t\n";
        match read_targets_from(Cursor::new(input), "store") {
            Err(IntegratorError::Parse { context, .. }) => assert_eq!(context, "store:2"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
