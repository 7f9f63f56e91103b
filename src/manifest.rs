//! Converts a storage download manifest into the job-input document the
//! matrix workflow is launched with.

use std::io::BufRead;

use serde::Serialize;
use serde_json::{Value, json};

use crate::error::GeneByCellError;

pub const DEFAULT_STORAGE_HOST: &str = "walt-hca.ucsc-cgl.org";

const FILE_NAME_COLUMN: usize = 16;
const FILE_UUID_COLUMN: usize = 17;
const BUNDLE_UUID_COLUMN: usize = 18;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub file_name: String,
    pub file_uuid: String,
    pub bundle_uuid: String,
}

impl ManifestEntry {
    pub fn storage_path(&self, host: &str) -> String {
        format!(
            "redwood://{host}/{}/{}/{}",
            self.bundle_uuid, self.file_uuid, self.file_name
        )
    }
}

/// Reads manifest rows, skipping the header line and blank lines.
pub fn parse_manifest<R: BufRead>(reader: R) -> Result<Vec<ManifestEntry>, GeneByCellError> {
    let mut entries = Vec::new();
    for (idx, line) in reader.lines().enumerate().skip(1) {
        let line = line.map_err(|err| GeneByCellError::InvalidManifest(err.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() <= BUNDLE_UUID_COLUMN {
            return Err(GeneByCellError::InvalidManifest(format!(
                "line {}: expected at least {} columns, found {}",
                idx + 1,
                BUNDLE_UUID_COLUMN + 1,
                fields.len()
            )));
        }
        entries.push(ManifestEntry {
            file_name: fields[FILE_NAME_COLUMN].trim().to_string(),
            file_uuid: fields[FILE_UUID_COLUMN].trim().to_string(),
            bundle_uuid: fields[BUNDLE_UUID_COLUMN].trim().to_string(),
        });
    }
    Ok(entries)
}

/// Builds the job-input document: every manifest file as a `File` input plus
/// the fixed matrix options.
pub fn job_input(entries: &[ManifestEntry], host: &str) -> Value {
    let files: Vec<Value> = entries
        .iter()
        .map(|entry| json!({ "class": "File", "path": entry.storage_path(host) }))
        .collect();

    json!({
        "my_test": files,
        "input_directory": "/datastore",
        "rsem_gene": "true",
        "rsem_isoform": "true",
        "kallisto_isoform": "true",
        "output_file": {
            "class": "File",
            "path": "/tmp/gene_by_cell.tar.gz"
        }
    })
}

/// Renders with sorted keys and four-space indentation.
pub fn render(value: &Value) -> Result<String, GeneByCellError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|err| GeneByCellError::InvalidManifest(err.to_string()))?;
    String::from_utf8(buf).map_err(|err| GeneByCellError::InvalidManifest(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, file: &str, bundle: &str) -> String {
        let mut fields = vec!["x".to_string(); 16];
        fields.push(name.to_string());
        fields.push(file.to_string());
        fields.push(bundle.to_string());
        fields.join("\t")
    }

    #[test]
    fn storage_path_layout() {
        let entry = ManifestEntry {
            file_name: "s1.tar.gz".to_string(),
            file_uuid: "f1".to_string(),
            bundle_uuid: "b1".to_string(),
        };
        assert_eq!(
            entry.storage_path(DEFAULT_STORAGE_HOST),
            "redwood://walt-hca.ucsc-cgl.org/b1/f1/s1.tar.gz"
        );
    }

    #[test]
    fn header_is_skipped() {
        let input = format!(
            "{}\n{}\n",
            row("name", "uuid", "bundle"),
            row("a.tar.gz", "f", "b")
        );
        let entries = parse_manifest(input.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file_name, "a.tar.gz");
    }

    #[test]
    fn rendered_keys_are_sorted() {
        let value = job_input(&[], DEFAULT_STORAGE_HOST);
        let text = render(&value).unwrap();
        let input_pos = text.find("\"input_directory\"").unwrap();
        let kallisto_pos = text.find("\"kallisto_isoform\"").unwrap();
        let test_pos = text.find("\"my_test\"").unwrap();
        assert!(input_pos < kallisto_pos && kallisto_pos < test_pos);
        assert!(text.contains("\n    \"input_directory\": \"/datastore\""));
    }
}
