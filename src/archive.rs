use std::path::{Component, Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::GeneByCellError;

/// Archive capability used by the pipeline: unpack a sample archive and
/// bundle finished matrices.
pub trait ArchiveTool {
    /// Extracts `archive` into `destination`.
    fn extract(&self, archive: &Path, destination: &Path) -> Result<(), GeneByCellError>;

    /// Writes `files` into `archive`, stored by their path relative to
    /// `base_dir`, or by file name when they live elsewhere.
    fn bundle(
        &self,
        base_dir: &Path,
        files: &[PathBuf],
        archive: &Path,
    ) -> Result<(), GeneByCellError>;
}

#[derive(Debug, Clone)]
pub struct SystemTar {
    tar: Option<PathBuf>,
}

impl SystemTar {
    pub fn new() -> Self {
        Self {
            tar: find_in_path("tar"),
        }
    }

    pub fn with_binary(path: PathBuf) -> Self {
        Self { tar: Some(path) }
    }

    fn require_tar(&self) -> Result<&PathBuf, GeneByCellError> {
        self.tar
            .as_ref()
            .ok_or_else(|| GeneByCellError::MissingTool("tar".to_string()))
    }

    fn run_cmd(&self, args: &[String]) -> Result<(), String> {
        let program = self.require_tar().map_err(|err| err.to_string())?;
        debug!(program = %program.display(), ?args, "running archive tool");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| err.to_string())?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.is_empty() {
            Err(format!("{} exited with {}", program.display(), output.status))
        } else {
            Err(stderr)
        }
    }
}

impl Default for SystemTar {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveTool for SystemTar {
    fn extract(&self, archive: &Path, destination: &Path) -> Result<(), GeneByCellError> {
        self.require_tar()?;
        self.run_cmd(&extract_args(archive, destination))
            .map_err(|message| GeneByCellError::ExtractionFailed {
                archive: archive.display().to_string(),
                message,
            })
    }

    fn bundle(
        &self,
        base_dir: &Path,
        files: &[PathBuf],
        archive: &Path,
    ) -> Result<(), GeneByCellError> {
        self.require_tar()?;
        let failed = |message| GeneByCellError::BundleFailed {
            archive: archive.display().to_string(),
            message,
        };
        let args = bundle_args(base_dir, files, archive).map_err(failed)?;
        self.run_cmd(&args).map_err(failed)
    }
}

fn extract_args(archive: &Path, destination: &Path) -> Vec<String> {
    vec![
        "-xf".to_string(),
        archive.to_string_lossy().to_string(),
        "-C".to_string(),
        destination.to_string_lossy().to_string(),
    ]
}

/// Members under `base_dir` are stored by their relative path. Anything else
/// gets its own `-C <absolute parent>` so it is still stored by file name.
fn bundle_args(
    base_dir: &Path,
    files: &[PathBuf],
    archive: &Path,
) -> Result<Vec<String>, String> {
    let mode = if is_gzip_name(archive) { "-czf" } else { "-cf" };
    let mut args = vec![
        mode.to_string(),
        archive.to_string_lossy().to_string(),
        "-C".to_string(),
        base_dir.to_string_lossy().to_string(),
    ];

    let mut outside = Vec::new();
    for file in files {
        match file.strip_prefix(base_dir) {
            Ok(member) if is_plain_relative(member) => {
                args.push(member.to_string_lossy().to_string());
            }
            _ => outside.push(file),
        }
    }

    // Relative `-C` operands chain onto the previous one, so these must be
    // absolute and come after every member of `base_dir`.
    for file in outside {
        let name = file
            .file_name()
            .ok_or_else(|| format!("{} has no file name", file.display()))?;
        let parent = match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let parent = std::path::absolute(parent).map_err(|err| err.to_string())?;
        args.push("-C".to_string());
        args.push(parent.to_string_lossy().to_string());
        args.push(name.to_string_lossy().to_string());
    }
    Ok(args)
}

fn is_plain_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

fn is_gzip_name(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    name.ends_with(".gz") || name.ends_with(".tgz")
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
