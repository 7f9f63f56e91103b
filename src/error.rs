use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GeneByCellError {
    #[error("found no files matching: {pattern}")]
    NoInputFound { pattern: String },

    #[error("extracting {archive} failed: {message}")]
    ExtractionFailed { archive: String, message: String },

    #[error("after extracting {archive}, expected output location was not found: {expected}")]
    ExtractionMissing { archive: String, expected: String },

    #[error("sample {0} found twice")]
    DuplicateSample(String),

    #[error("{source_name} result file not found for sample {sample}: {path}")]
    ResultFileMissing {
        source_name: String,
        sample: String,
        path: String,
    },

    #[error("didn't find expected columns {missing:?} in {path}")]
    RequiredColumnNotFound { missing: Vec<String>, path: String },

    #[error("{path} has no header line")]
    EmptyResultFile { path: String },

    #[error("{path}:{line}: row has {found} columns, expected at least {expected}")]
    MalformedRow {
        path: String,
        line: usize,
        found: usize,
        expected: usize,
    },

    #[error("{path}:{line}: invalid count value: {value}")]
    InvalidCount {
        path: String,
        line: usize,
        value: String,
    },

    #[error("no quantification source selected")]
    NoSourceSelected,

    #[error("invalid sample id: {0}")]
    InvalidSampleId(String),

    #[error("invalid quantification source: {0}")]
    InvalidSource(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("creating bundle {archive} failed: {message}")]
    BundleFailed { archive: String, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
