use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::GeneByCellError;

/// One of the fixed quantification outputs a sample archive carries.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum QuantSource {
    RsemGene,
    RsemIsoform,
    KallistoIsoform,
}

impl QuantSource {
    pub const ALL: [QuantSource; 3] = [
        QuantSource::RsemGene,
        QuantSource::RsemIsoform,
        QuantSource::KallistoIsoform,
    ];

    pub fn spec(self) -> SourceSpec {
        match self {
            QuantSource::RsemGene => SourceSpec {
                relative_path: "RSEM/rsem_genes.results",
                feature_column: "gene_id",
                count_column: "expected_count",
            },
            QuantSource::RsemIsoform => SourceSpec {
                relative_path: "RSEM/rsem_isoforms.results",
                feature_column: "transcript_id",
                count_column: "expected_count",
            },
            QuantSource::KallistoIsoform => SourceSpec {
                relative_path: "Kallisto/abundance.tsv",
                feature_column: "target_id",
                count_column: "est_counts",
            },
        }
    }

    pub fn default_filename(self) -> &'static str {
        match self {
            QuantSource::RsemGene => "rsem_cell_by_gene.tsv",
            QuantSource::RsemIsoform => "rsem_cell_by_isoform.tsv",
            QuantSource::KallistoIsoform => "kallisto_cell_by_isoform.tsv",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            QuantSource::RsemGene => "RSEM genes",
            QuantSource::RsemIsoform => "RSEM isoforms",
            QuantSource::KallistoIsoform => "Kallisto isoforms",
        }
    }
}

impl fmt::Display for QuantSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuantSource::RsemGene => write!(f, "rsem-gene"),
            QuantSource::RsemIsoform => write!(f, "rsem-isoform"),
            QuantSource::KallistoIsoform => write!(f, "kallisto-isoform"),
        }
    }
}

impl FromStr for QuantSource {
    type Err = GeneByCellError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rsem-gene" | "rsem_gene" => Ok(QuantSource::RsemGene),
            "rsem-isoform" | "rsem_isoform" => Ok(QuantSource::RsemIsoform),
            "kallisto-isoform" | "kallisto_isoform" => Ok(QuantSource::KallistoIsoform),
            _ => Err(GeneByCellError::InvalidSource(value.to_string())),
        }
    }
}

/// Where a source's result table lives inside a sample directory and which
/// header names carry the feature id and the count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpec {
    pub relative_path: &'static str,
    pub feature_column: &'static str,
    pub count_column: &'static str,
}

/// Where sample archives sit relative to the input root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// `<root>/*<suffix>`
    #[default]
    Flat,
    /// `<root>/*/*<suffix>`
    Nested,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SampleId(String);

impl SampleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SampleId {
    type Err = GeneByCellError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let is_valid = !value.is_empty()
            && value.trim() == value
            && !value.contains(['\t', '\n', '\r', '/']);
        if !is_valid {
            return Err(GeneByCellError::InvalidSampleId(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }
}

/// A count as it appeared in the result table. The text is written back
/// verbatim so RSEM integers stay integers and Kallisto floats keep their
/// precision.
#[derive(Debug, Clone, PartialEq)]
pub struct Count {
    text: String,
    value: f64,
}

impl Count {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0.0
    }
}

impl fmt::Display for Count {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Why a count cell was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CountError {
    #[error("not a number")]
    NotANumber(#[from] std::num::ParseFloatError),
    #[error("counts must be finite and non-negative")]
    OutOfRange,
}

impl FromStr for Count {
    type Err = CountError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let text = value.trim();
        let value = text.parse::<f64>()?;
        if !value.is_finite() || value < 0.0 {
            return Err(CountError::OutOfRange);
        }
        Ok(Self {
            text: text.to_string(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_source_names() {
        assert_eq!(
            "rsem-gene".parse::<QuantSource>().unwrap(),
            QuantSource::RsemGene
        );
        assert_eq!(
            "Kallisto_Isoform".parse::<QuantSource>().unwrap(),
            QuantSource::KallistoIsoform
        );
        let err = "salmon".parse::<QuantSource>().unwrap_err();
        assert_matches!(err, GeneByCellError::InvalidSource(_));
    }

    #[test]
    fn source_specs_are_fixed() {
        let kallisto = QuantSource::KallistoIsoform.spec();
        assert_eq!(kallisto.relative_path, "Kallisto/abundance.tsv");
        assert_eq!(kallisto.feature_column, "target_id");
        assert_eq!(kallisto.count_column, "est_counts");
        assert_eq!(
            QuantSource::RsemIsoform.spec().feature_column,
            "transcript_id"
        );
    }

    #[test]
    fn sample_id_rejects_separators() {
        assert!("2d4f-uuid".parse::<SampleId>().is_ok());
        assert_matches!(
            "".parse::<SampleId>(),
            Err(GeneByCellError::InvalidSampleId(_))
        );
        assert_matches!(
            "a\tb".parse::<SampleId>(),
            Err(GeneByCellError::InvalidSampleId(_))
        );
    }

    #[test]
    fn count_keeps_text_and_detects_zero() {
        let count: Count = "5".parse().unwrap();
        assert_eq!(count.as_str(), "5");
        assert!(!count.is_zero());

        let zero: Count = "0.00".parse().unwrap();
        assert!(zero.is_zero());
        assert_eq!(zero.as_str(), "0.00");

        assert_matches!("abc".parse::<Count>(), Err(CountError::NotANumber(_)));
    }

    #[test]
    fn count_rejects_negative_and_non_finite_values() {
        for text in ["-3", "NaN", "inf", "-inf", "infinity"] {
            assert_matches!(
                text.parse::<Count>(),
                Err(CountError::OutOfRange),
                "{text} should be rejected"
            );
        }
        assert!("-0".parse::<Count>().unwrap().is_zero());
    }
}
