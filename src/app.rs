use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::archive::ArchiveTool;
use crate::config::RunConfig;
use crate::domain::{QuantSource, SampleId};
use crate::error::GeneByCellError;
use crate::extract::{SampleCounts, extract_counts};
use crate::locator::SampleLocator;
use crate::matrix::SourceMatrix;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub samples: usize,
    pub quarantined: Vec<QuarantinedSample>,
    pub matrices: Vec<MatrixReport>,
    pub bundle: Option<String>,
    pub elapsed_secs: f64,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatrixReport {
    pub source: QuantSource,
    pub path: String,
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuarantinedSample {
    pub sample: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Fires after `total / 32 + 1` items and then every time the handled count
/// doubles, so long runs log a handful of lines instead of one per item.
#[derive(Debug, Clone)]
pub struct ProgressTicker {
    handled: usize,
    next_report: usize,
}

impl ProgressTicker {
    pub fn new(total: usize) -> Self {
        Self {
            handled: 0,
            next_report: total / 32 + 1,
        }
    }

    /// Counts one item; returns the running total when a report is due.
    pub fn tick(&mut self) -> Option<usize> {
        self.handled += 1;
        if self.handled == self.next_report {
            self.next_report *= 2;
            return Some(self.handled);
        }
        None
    }
}

pub struct App<A: ArchiveTool> {
    archive: A,
}

impl<A: ArchiveTool> App<A> {
    pub fn new(archive: A) -> Self {
        Self { archive }
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    pub fn run(
        &self,
        config: &RunConfig,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, GeneByCellError> {
        let start = Instant::now();
        if config.outputs.is_empty() {
            return Err(GeneByCellError::NoSourceSelected);
        }
        let sources: Vec<QuantSource> = config.outputs.iter().map(|out| out.source).collect();
        let labels = sources
            .iter()
            .map(|source| source.label())
            .collect::<Vec<_>>()
            .join(", ");

        let locator = SampleLocator::new(&self.archive, config.locator.clone());
        let samples = locator.locate(&config.input_dir, sink)?;
        sink.event(ProgressEvent {
            message: format!("building cell x count matrices for {labels}"),
            elapsed: Some(start.elapsed()),
        });

        let (matrices, quarantined) =
            build_matrices(&samples, &sources, config.quarantine, sink)?;

        fs::create_dir_all(config.output_dir.as_std_path())
            .map_err(|err| GeneByCellError::Filesystem(err.to_string()))?;

        let mut reports = Vec::new();
        let mut written = Vec::new();
        for (matrix, output) in matrices.iter().zip(&config.outputs) {
            let path = config.output_dir.join(&output.filename);
            sink.event(ProgressEvent {
                message: format!("writing {} matrix to {path}", matrix.source().label()),
                elapsed: Some(start.elapsed()),
            });
            matrix.write_file(&path)?;
            info!(
                source = %matrix.source(),
                rows = matrix.rows(),
                columns = matrix.columns(),
                %path,
                "matrix written"
            );
            reports.push(MatrixReport {
                source: matrix.source(),
                path: path.to_string(),
                rows: matrix.rows(),
                columns: matrix.columns(),
            });
            written.push(path);
        }

        let bundle = match &config.bundle_filename {
            Some(name) => Some(self.bundle(&config.output_dir, &written, name)?),
            None => None,
        };
        if let Some(path) = &bundle {
            sink.event(ProgressEvent {
                message: format!("output tarball: {path}"),
                elapsed: Some(start.elapsed()),
            });
        }

        let elapsed = start.elapsed();
        sink.event(ProgressEvent {
            message: "done".to_string(),
            elapsed: Some(elapsed),
        });

        Ok(RunReport {
            samples: samples.len() - quarantined.len(),
            quarantined,
            matrices: reports,
            bundle: bundle.map(|path| path.to_string()),
            elapsed_secs: elapsed.as_secs_f64(),
            finished_at: iso_timestamp(),
        })
    }

    fn bundle(
        &self,
        output_dir: &Utf8Path,
        files: &[Utf8PathBuf],
        name: &str,
    ) -> Result<Utf8PathBuf, GeneByCellError> {
        let archive = output_dir.join(name);
        let members: Vec<PathBuf> = files
            .iter()
            .map(|path| path.as_std_path().to_path_buf())
            .collect();
        self.archive
            .bundle(output_dir.as_std_path(), &members, archive.as_std_path())?;
        Ok(archive)
    }
}

/// Reads every selected source for every sample and folds the results into
/// one matrix per source, in the order of `sources`.
///
/// With `quarantine` set, a sample that fails any source is dropped from all
/// matrices and reported instead of aborting the run.
pub fn build_matrices(
    samples: &BTreeMap<SampleId, Utf8PathBuf>,
    sources: &[QuantSource],
    quarantine: bool,
    sink: &dyn ProgressSink,
) -> Result<(Vec<SourceMatrix>, Vec<QuarantinedSample>), GeneByCellError> {
    let start = Instant::now();
    let total = samples.len();
    let mut ticker = ProgressTicker::new(total);
    let mut matrices: Vec<SourceMatrix> =
        sources.iter().copied().map(SourceMatrix::new).collect();
    let mut quarantined = Vec::new();

    for (sample, dir) in samples {
        match collect_sample(sample, dir, sources) {
            Ok(per_source) => {
                for (matrix, counts) in matrices.iter_mut().zip(per_source) {
                    matrix.insert(sample.clone(), counts)?;
                }
            }
            Err(err) if quarantine => {
                warn!(%sample, error = %err, "quarantining sample");
                quarantined.push(QuarantinedSample {
                    sample: sample.to_string(),
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }

        if let Some(handled) = ticker.tick() {
            sink.event(ProgressEvent {
                message: format!("handled {handled} / {total} samples"),
                elapsed: Some(start.elapsed()),
            });
        }
    }

    Ok((matrices, quarantined))
}

fn collect_sample(
    sample: &SampleId,
    dir: &Utf8Path,
    sources: &[QuantSource],
) -> Result<Vec<SampleCounts>, GeneByCellError> {
    sources
        .iter()
        .map(|source| extract_counts(sample, dir, *source))
        .collect()
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
