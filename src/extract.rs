//! Reading per-sample result tables into sparse feature → count maps.
//!
//! All three supported tables are tab-separated with a header row; the
//! feature and count columns are located by header name, never by position.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};

use camino::Utf8Path;

use crate::domain::{Count, QuantSource, SampleId, SourceSpec};
use crate::error::GeneByCellError;

/// Counts read from one sample's table for one source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleCounts {
    /// Non-zero counts only.
    pub counts: HashMap<String, Count>,
    /// Every feature id seen in the table, including zero-count ones.
    pub features: BTreeSet<String>,
}

/// Reads `source`'s result table from an extracted sample directory.
pub fn extract_counts(
    sample: &SampleId,
    sample_dir: &Utf8Path,
    source: QuantSource,
) -> Result<SampleCounts, GeneByCellError> {
    let spec = source.spec();
    let path = sample_dir.join(spec.relative_path);
    if !path.is_file() {
        return Err(GeneByCellError::ResultFileMissing {
            source_name: source.label().to_string(),
            sample: sample.to_string(),
            path: path.to_string(),
        });
    }
    let file = File::open(path.as_std_path())
        .map_err(|err| GeneByCellError::Filesystem(format!("open {path}: {err}")))?;
    parse_counts(BufReader::new(file), &spec, path.as_str())
}

/// Parses a tab-separated table. `origin` names the input in errors.
pub fn parse_counts<R: BufRead>(
    reader: R,
    spec: &SourceSpec,
    origin: &str,
) -> Result<SampleCounts, GeneByCellError> {
    let mut lines = reader.lines().enumerate();

    let header = loop {
        match lines.next() {
            Some((_, line)) => {
                let line = line.map_err(|err| read_error(origin, err))?;
                if !line.trim().is_empty() {
                    break line;
                }
            }
            None => {
                return Err(GeneByCellError::EmptyResultFile {
                    path: origin.to_string(),
                });
            }
        }
    };
    let (feature_idx, count_idx) = resolve_columns(&header, spec, origin)?;
    let needed = feature_idx.max(count_idx) + 1;

    let mut sample = SampleCounts::default();
    for (idx, line) in lines {
        let line = line.map_err(|err| read_error(origin, err))?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < needed {
            return Err(GeneByCellError::MalformedRow {
                path: origin.to_string(),
                line: idx + 1,
                found: fields.len(),
                expected: needed,
            });
        }

        let feature = fields[feature_idx];
        let raw = fields[count_idx];
        let count: Count = raw.parse().map_err(|_| GeneByCellError::InvalidCount {
            path: origin.to_string(),
            line: idx + 1,
            value: raw.to_string(),
        })?;

        sample.features.insert(feature.to_string());
        if count.is_zero() {
            // Repeated ids keep the last value, so a later zero clears an
            // earlier entry.
            sample.counts.remove(feature);
        } else {
            sample.counts.insert(feature.to_string(), count);
        }
    }
    Ok(sample)
}

/// Finds the zero-based feature and count column indices in a header line.
pub fn resolve_columns(
    header: &str,
    spec: &SourceSpec,
    origin: &str,
) -> Result<(usize, usize), GeneByCellError> {
    let names: Vec<&str> = header
        .trim_end_matches(['\r', '\n'])
        .split('\t')
        .collect();
    let find = |wanted: &str| names.iter().position(|name| *name == wanted);

    match (find(spec.feature_column), find(spec.count_column)) {
        (Some(feature), Some(count)) => Ok((feature, count)),
        (feature, count) => {
            let mut missing = Vec::new();
            if feature.is_none() {
                missing.push(spec.feature_column.to_string());
            }
            if count.is_none() {
                missing.push(spec.count_column.to_string());
            }
            Err(GeneByCellError::RequiredColumnNotFound {
                missing,
                path: origin.to_string(),
            })
        }
    }
}

fn read_error(origin: &str, err: std::io::Error) -> GeneByCellError {
    GeneByCellError::Filesystem(format!("read {origin}: {err}"))
}
