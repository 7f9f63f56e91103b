#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use gene_by_cell::app::{ProgressEvent, ProgressSink};
use gene_by_cell::archive::ArchiveTool;
use gene_by_cell::error::GeneByCellError;

/// Stands in for `tar`: "extracting" an archive writes the files registered
/// for its file name under the destination directory.
#[derive(Default)]
pub struct FixtureArchive {
    members: HashMap<String, Vec<(String, String)>>,
    failing: HashSet<String>,
    pub extracted: Mutex<Vec<PathBuf>>,
    pub bundles: Mutex<Vec<(PathBuf, Vec<PathBuf>)>>,
}

impl FixtureArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member(mut self, archive: &str, path: &str, content: &str) -> Self {
        self.members
            .entry(archive.to_string())
            .or_default()
            .push((path.to_string(), content.to_string()));
        self
    }

    pub fn failing(mut self, archive: &str) -> Self {
        self.failing.insert(archive.to_string());
        self
    }

    pub fn extract_count(&self) -> usize {
        self.extracted.lock().unwrap().len()
    }
}

impl ArchiveTool for FixtureArchive {
    fn extract(&self, archive: &Path, destination: &Path) -> Result<(), GeneByCellError> {
        self.extracted.lock().unwrap().push(archive.to_path_buf());
        let name = archive.file_name().unwrap().to_string_lossy().to_string();
        if self.failing.contains(&name) {
            return Err(GeneByCellError::ExtractionFailed {
                archive: archive.display().to_string(),
                message: "corrupt archive".to_string(),
            });
        }
        for (path, content) in self.members.get(&name).into_iter().flatten() {
            let target = destination.join(path);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::write(&target, content).unwrap();
        }
        Ok(())
    }

    fn bundle(
        &self,
        _base_dir: &Path,
        files: &[PathBuf],
        archive: &Path,
    ) -> Result<(), GeneByCellError> {
        self.bundles
            .lock()
            .unwrap()
            .push((archive.to_path_buf(), files.to_vec()));
        fs::write(archive, b"").unwrap();
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

pub fn utf8_root(temp: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap()
}

pub fn write_file(path: &Utf8Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path()).unwrap();
    }
    fs::write(path.as_std_path(), content).unwrap();
}

pub fn touch(path: &Utf8Path) {
    write_file(path, "");
}

/// An RSEM gene table with just the two columns the extractor needs.
pub fn rsem_genes(rows: &[(&str, &str)]) -> String {
    table("gene_id\texpected_count", rows)
}

pub fn rsem_isoforms(rows: &[(&str, &str)]) -> String {
    table("transcript_id\texpected_count", rows)
}

pub fn kallisto(rows: &[(&str, &str)]) -> String {
    let mut out = String::from("target_id\tlength\teff_length\test_counts\ttpm\n");
    for (feature, count) in rows {
        out.push_str(&format!("{feature}\t1000\t850.2\t{count}\t1.0\n"));
    }
    out
}

fn table(header: &str, rows: &[(&str, &str)]) -> String {
    let mut out = format!("{header}\n");
    for (feature, count) in rows {
        out.push_str(&format!("{feature}\t{count}\n"));
    }
    out
}
