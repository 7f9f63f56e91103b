use std::collections::BTreeMap;
use std::fs;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};

use crate::app::{ProgressEvent, ProgressSink, ProgressTicker};
use crate::archive::ArchiveTool;
use crate::domain::{Layout, SampleId};
use crate::error::GeneByCellError;

pub const DEFAULT_ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Marker some extraction runs prepend to the output directory of a sample
/// whose upstream workflow failed.
const FAIL_PREFIX: &str = "FAIL.";

#[derive(Debug, Clone)]
pub struct LocatorOptions {
    pub layout: Layout,
    pub suffix: String,
    pub reuse_extracted: bool,
    /// Paths never treated as sample archives, such as this run's own
    /// bundle when it is written into the input directory.
    pub exclude: Vec<Utf8PathBuf>,
}

impl Default for LocatorOptions {
    fn default() -> Self {
        Self {
            layout: Layout::Flat,
            suffix: DEFAULT_ARCHIVE_SUFFIX.to_string(),
            reuse_extracted: false,
            exclude: Vec::new(),
        }
    }
}

pub struct SampleLocator<'a, A: ArchiveTool> {
    tool: &'a A,
    options: LocatorOptions,
}

impl<'a, A: ArchiveTool> SampleLocator<'a, A> {
    pub fn new(tool: &'a A, options: LocatorOptions) -> Self {
        Self { tool, options }
    }

    /// Extracts every archive under `root` next to itself and maps the
    /// resulting sample ids to their directories.
    ///
    /// Archives are unpacked in place, so rerunning against a partially
    /// processed input overwrites earlier extractions unless
    /// `reuse_extracted` is set.
    pub fn locate(
        &self,
        root: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<BTreeMap<SampleId, Utf8PathBuf>, GeneByCellError> {
        let archives = find_archives(
            root,
            self.options.layout,
            &self.options.suffix,
            &self.options.exclude,
        )?;
        let total = archives.len();
        let start = Instant::now();
        let mut ticker = ProgressTicker::new(total);
        let mut samples = BTreeMap::new();

        for archive in &archives {
            let output_dir = self.extract_one(archive)?;
            let name = output_dir.file_name().ok_or_else(|| {
                GeneByCellError::InvalidSampleId(output_dir.to_string())
            })?;
            let sample: SampleId = name.parse()?;
            if samples.contains_key(&sample) {
                return Err(GeneByCellError::DuplicateSample(sample.to_string()));
            }
            debug!(%sample, dir = %output_dir, "sample located");
            samples.insert(sample, output_dir);

            if let Some(handled) = ticker.tick() {
                sink.event(ProgressEvent {
                    message: format!("extracted {handled} / {total} archives"),
                    elapsed: Some(start.elapsed()),
                });
            }
        }

        info!(archives = total, "extracted sample archives");
        Ok(samples)
    }

    fn extract_one(&self, archive: &Utf8Path) -> Result<Utf8PathBuf, GeneByCellError> {
        let expected = expected_output_dir(archive, &self.options.suffix)?;

        if self.options.reuse_extracted {
            if let Some(existing) = resolve_output_dir(&expected) {
                debug!(%archive, dir = %existing, "reusing extracted directory");
                return Ok(existing);
            }
        }

        let destination = archive.parent().unwrap_or(Utf8Path::new("."));
        self.tool
            .extract(archive.as_std_path(), destination.as_std_path())?;

        resolve_output_dir(&expected).ok_or_else(|| GeneByCellError::ExtractionMissing {
            archive: archive.to_string(),
            expected: expected.to_string(),
        })
    }
}

/// Lists archives ending in `suffix` under `root`, sorted by path. Hidden
/// entries are skipped, as a shell glob would, and so is anything in
/// `exclude`.
pub fn find_archives(
    root: &Utf8Path,
    layout: Layout,
    suffix: &str,
    exclude: &[Utf8PathBuf],
) -> Result<Vec<Utf8PathBuf>, GeneByCellError> {
    let pattern = match layout {
        Layout::Flat => root.join(format!("*{suffix}")),
        Layout::Nested => root.join("*").join(format!("*{suffix}")),
    };

    let search_dirs = match layout {
        Layout::Flat => vec![root.to_path_buf()],
        Layout::Nested => list_entries(root)?
            .into_iter()
            .filter(|path| path.is_dir())
            .collect(),
    };

    let mut archives = Vec::new();
    for dir in search_dirs {
        for path in list_entries(&dir)? {
            let matches = path
                .file_name()
                .map(|name| name.len() > suffix.len() && name.ends_with(suffix))
                .unwrap_or(false);
            if matches && path.is_file() && !is_excluded(&path, exclude) {
                archives.push(path);
            }
        }
    }

    if archives.is_empty() {
        return Err(GeneByCellError::NoInputFound {
            pattern: pattern.to_string(),
        });
    }
    archives.sort();
    Ok(archives)
}

/// The directory an archive is expected to unpack into: its own path with
/// the suffix removed.
pub fn expected_output_dir(
    archive: &Utf8Path,
    suffix: &str,
) -> Result<Utf8PathBuf, GeneByCellError> {
    archive
        .as_str()
        .strip_suffix(suffix)
        .filter(|stem| !stem.is_empty())
        .map(Utf8PathBuf::from)
        .ok_or_else(|| {
            GeneByCellError::Filesystem(format!("{archive} does not end with {suffix}"))
        })
}

fn is_excluded(path: &Utf8Path, exclude: &[Utf8PathBuf]) -> bool {
    let canonical = path.canonicalize_utf8().ok();
    exclude.iter().any(|excluded| {
        excluded == path
            || (canonical.is_some() && excluded.canonicalize_utf8().ok() == canonical)
    })
}

fn resolve_output_dir(expected: &Utf8Path) -> Option<Utf8PathBuf> {
    if expected.is_dir() {
        return Some(expected.to_path_buf());
    }
    let name = expected.file_name()?;
    let fallback = expected.with_file_name(format!("{FAIL_PREFIX}{name}"));
    fallback.is_dir().then_some(fallback)
}

fn list_entries(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, GeneByCellError> {
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| GeneByCellError::Filesystem(format!("read {dir}: {err}")))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| GeneByCellError::Filesystem(err.to_string()))?;
        let path = Utf8PathBuf::from_path_buf(entry.path()).map_err(|path| {
            GeneByCellError::Filesystem(format!("non UTF-8 path: {}", path.display()))
        })?;
        let hidden = path
            .file_name()
            .map(|name| name.starts_with('.'))
            .unwrap_or(true);
        if !hidden {
            paths.push(path);
        }
    }
    Ok(paths)
}
