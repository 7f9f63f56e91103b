use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{Layout, QuantSource};
use crate::error::GeneByCellError;
use crate::locator::{DEFAULT_ARCHIVE_SUFFIX, LocatorOptions};

pub const DEFAULT_CONFIG_FILE: &str = "gene-by-cell.json";
pub const DEFAULT_BUNDLE_FILENAME: &str = "gene_by_cell.tar.gz";
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub input_dir: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub layout: Option<Layout>,
    #[serde(default)]
    pub archive_suffix: Option<String>,
    #[serde(default)]
    pub sources: Option<Vec<QuantSource>>,
    #[serde(default)]
    pub filenames: BTreeMap<QuantSource, String>,
    #[serde(default)]
    pub bundle: Option<bool>,
    #[serde(default)]
    pub bundle_filename: Option<String>,
    #[serde(default)]
    pub reuse_extracted: Option<bool>,
    #[serde(default)]
    pub quarantine: Option<bool>,
}

/// Values given on the command line. Anything set here wins over the config
/// file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub input_dir: Option<String>,
    pub output_dir: Option<String>,
    pub layout: Option<Layout>,
    pub archive_suffix: Option<String>,
    pub sources: Vec<QuantSource>,
    pub filenames: BTreeMap<QuantSource, String>,
    pub no_bundle: bool,
    pub bundle_filename: Option<String>,
    pub reuse_extracted: bool,
    pub quarantine: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOutput {
    pub source: QuantSource,
    pub filename: String,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub locator: LocatorOptions,
    pub outputs: Vec<SourceOutput>,
    pub bundle_filename: Option<String>,
    pub quarantine: bool,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the config file at `path`, or `gene-by-cell.json` in the working
    /// directory when no path is given and that file exists.
    pub fn load(path: Option<&str>) -> Result<Option<Config>, GeneByCellError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| GeneByCellError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| GeneByCellError::ConfigParse(err.to_string()))?;
        Ok(Some(config))
    }

    pub fn resolve(
        config: Option<Config>,
        overrides: Overrides,
    ) -> Result<RunConfig, GeneByCellError> {
        let config = config.unwrap_or_default();
        if let Some(version) = config.schema_version
            && version != SCHEMA_VERSION
        {
            return Err(GeneByCellError::ConfigParse(format!(
                "unsupported schema_version {version}, expected {SCHEMA_VERSION}"
            )));
        }

        let input_dir = overrides
            .input_dir
            .or(config.input_dir)
            .unwrap_or_else(|| ".".to_string());
        let output_dir = overrides
            .output_dir
            .or(config.output_dir)
            .unwrap_or_else(|| ".".to_string());

        let archive_suffix = overrides
            .archive_suffix
            .or(config.archive_suffix)
            .unwrap_or_else(|| DEFAULT_ARCHIVE_SUFFIX.to_string());
        if archive_suffix.is_empty() {
            return Err(GeneByCellError::ConfigParse(
                "archive suffix must not be empty".to_string(),
            ));
        }

        let sources = if !overrides.sources.is_empty() {
            overrides.sources
        } else {
            config
                .sources
                .unwrap_or_else(|| QuantSource::ALL.to_vec())
        };

        let mut filenames = config.filenames;
        filenames.extend(overrides.filenames);
        let outputs = selected_in_order(&sources)
            .into_iter()
            .map(|source| SourceOutput {
                source,
                filename: filenames
                    .get(&source)
                    .cloned()
                    .unwrap_or_else(|| source.default_filename().to_string()),
            })
            .collect();

        let bundle = !overrides.no_bundle && config.bundle.unwrap_or(true);
        let bundle_filename = bundle.then(|| {
            overrides
                .bundle_filename
                .or(config.bundle_filename)
                .unwrap_or_else(|| DEFAULT_BUNDLE_FILENAME.to_string())
        });

        let input_dir = Utf8PathBuf::from(input_dir);
        let output_dir = Utf8PathBuf::from(output_dir);
        let locator = LocatorOptions {
            layout: overrides.layout.or(config.layout).unwrap_or_default(),
            suffix: archive_suffix,
            reuse_extracted: overrides.reuse_extracted
                || config.reuse_extracted.unwrap_or(false),
            exclude: bundle_filename
                .iter()
                .map(|name| output_dir.join(name))
                .collect(),
        };

        Ok(RunConfig {
            input_dir,
            output_dir,
            locator,
            outputs,
            bundle_filename,
            quarantine: overrides.quarantine || config.quarantine.unwrap_or(false),
        })
    }
}

/// Deduplicates a selection and puts it in the fixed source order.
fn selected_in_order(sources: &[QuantSource]) -> Vec<QuantSource> {
    QuantSource::ALL
        .into_iter()
        .filter(|source| sources.contains(source))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_select_every_source() {
        let resolved = ConfigLoader::resolve(None, Overrides::default()).unwrap();
        assert_eq!(resolved.outputs.len(), 3);
        assert_eq!(resolved.outputs[0].filename, "rsem_cell_by_gene.tsv");
        assert_eq!(resolved.outputs[2].filename, "kallisto_cell_by_isoform.tsv");
        assert_eq!(
            resolved.bundle_filename.as_deref(),
            Some(DEFAULT_BUNDLE_FILENAME)
        );
        assert_eq!(resolved.locator.suffix, ".tar.gz");
        assert_eq!(resolved.input_dir, Utf8PathBuf::from("."));
        assert_eq!(
            resolved.locator.exclude,
            vec![Utf8PathBuf::from("./gene_by_cell.tar.gz")]
        );
    }

    #[test]
    fn selection_is_deduplicated_and_ordered() {
        let overrides = Overrides {
            sources: vec![
                QuantSource::KallistoIsoform,
                QuantSource::RsemGene,
                QuantSource::KallistoIsoform,
            ],
            ..Overrides::default()
        };
        let resolved = ConfigLoader::resolve(None, overrides).unwrap();
        let sources: Vec<_> = resolved.outputs.iter().map(|out| out.source).collect();
        assert_eq!(
            sources,
            vec![QuantSource::RsemGene, QuantSource::KallistoIsoform]
        );
    }
}
