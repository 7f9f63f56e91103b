use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::{self, BufWriter, Write};

use camino::Utf8Path;
use tempfile::Builder;

use crate::domain::{Count, QuantSource, SampleId};
use crate::error::GeneByCellError;
use crate::extract::SampleCounts;

pub const MISSING_VALUE: &str = "0.0";

/// Everything collected for one source: each sample's sparse counts plus the
/// union of feature ids across samples.
#[derive(Debug, Clone)]
pub struct SourceMatrix {
    source: QuantSource,
    samples: BTreeMap<SampleId, HashMap<String, Count>>,
    features: BTreeSet<String>,
}

impl SourceMatrix {
    pub fn new(source: QuantSource) -> Self {
        Self {
            source,
            samples: BTreeMap::new(),
            features: BTreeSet::new(),
        }
    }

    pub fn source(&self) -> QuantSource {
        self.source
    }

    /// Folds one sample's extraction into the matrix.
    pub fn insert(
        &mut self,
        sample: SampleId,
        counts: SampleCounts,
    ) -> Result<(), GeneByCellError> {
        if self.samples.contains_key(&sample) {
            return Err(GeneByCellError::DuplicateSample(sample.to_string()));
        }
        self.features.extend(counts.features);
        self.samples.insert(sample, counts.counts);
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.samples.len()
    }

    pub fn columns(&self) -> usize {
        self.features.len()
    }

    pub fn sample_ids(&self) -> impl Iterator<Item = &SampleId> {
        self.samples.keys()
    }

    pub fn feature_ids(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(String::as_str)
    }

    /// The cell value as written: the stored count text, or `0.0`.
    pub fn cell(&self, sample: &SampleId, feature: &str) -> Option<&str> {
        let counts = self.samples.get(sample)?;
        Some(
            counts
                .get(feature)
                .map(Count::as_str)
                .unwrap_or(MISSING_VALUE),
        )
    }

    /// Writes the dense matrix: a `sample` header followed by one row per
    /// sample, both axes in ascending byte order.
    pub fn write_tsv<W: Write>(&self, writer: W) -> io::Result<()> {
        let mut out = BufWriter::new(writer);
        out.write_all(b"sample")?;
        for feature in &self.features {
            write!(out, "\t{feature}")?;
        }
        out.write_all(b"\n")?;

        for (sample, counts) in &self.samples {
            out.write_all(sample.as_str().as_bytes())?;
            for feature in &self.features {
                let value = counts
                    .get(feature.as_str())
                    .map(Count::as_str)
                    .unwrap_or(MISSING_VALUE);
                write!(out, "\t{value}")?;
            }
            out.write_all(b"\n")?;
        }
        out.flush()
    }

    /// Writes the matrix to `path` through a temporary sibling file so an
    /// interrupted write never leaves a truncated matrix behind.
    pub fn write_file(&self, path: &Utf8Path) -> Result<(), GeneByCellError> {
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| GeneByCellError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".gene-by-cell")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| GeneByCellError::Filesystem(err.to_string()))?;
        self.write_tsv(temp.as_file_mut())
            .map_err(|err| GeneByCellError::Filesystem(format!("write {path}: {err}")))?;
        temp.persist(path.as_std_path())
            .map_err(|err| GeneByCellError::Filesystem(format!("persist {path}: {err}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_counts(entries: &[(&str, &str)]) -> SampleCounts {
        let mut counts = SampleCounts::default();
        for (feature, value) in entries {
            counts.features.insert(feature.to_string());
            let count: Count = value.parse().unwrap();
            if !count.is_zero() {
                counts.counts.insert(feature.to_string(), count);
            }
        }
        counts
    }

    #[test]
    fn cells_default_to_zero() {
        let mut matrix = SourceMatrix::new(QuantSource::RsemGene);
        let a: SampleId = "a".parse().unwrap();
        let b: SampleId = "b".parse().unwrap();
        matrix.insert(a.clone(), sample_counts(&[("G1", "4")])).unwrap();
        matrix.insert(b.clone(), sample_counts(&[("G2", "1.5")])).unwrap();

        assert_eq!(matrix.cell(&a, "G1"), Some("4"));
        assert_eq!(matrix.cell(&a, "G2"), Some("0.0"));
        assert_eq!(matrix.cell(&b, "G2"), Some("1.5"));
        let missing: SampleId = "c".parse().unwrap();
        assert_eq!(matrix.cell(&missing, "G1"), None);
    }

    #[test]
    fn duplicate_sample_is_rejected() {
        let mut matrix = SourceMatrix::new(QuantSource::KallistoIsoform);
        let id: SampleId = "dup".parse().unwrap();
        matrix.insert(id.clone(), SampleCounts::default()).unwrap();
        let err = matrix.insert(id, SampleCounts::default()).unwrap_err();
        assert!(matches!(err, GeneByCellError::DuplicateSample(name) if name == "dup"));
    }

    #[test]
    fn sample_with_no_features_is_still_a_row() {
        let mut matrix = SourceMatrix::new(QuantSource::RsemGene);
        matrix
            .insert("a".parse().unwrap(), sample_counts(&[("G1", "2")]))
            .unwrap();
        matrix
            .insert("b".parse().unwrap(), SampleCounts::default())
            .unwrap();

        let mut out = Vec::new();
        matrix.write_tsv(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "sample\tG1\na\t2\nb\t0.0\n"
        );
    }
}
