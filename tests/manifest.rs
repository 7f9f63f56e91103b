use assert_matches::assert_matches;
use serde_json::Value;

use gene_by_cell::error::GeneByCellError;
use gene_by_cell::manifest::{DEFAULT_STORAGE_HOST, job_input, parse_manifest, render};

fn manifest_row(name: &str, file_uuid: &str, bundle_uuid: &str) -> String {
    let mut fields: Vec<String> = (0..16).map(|idx| format!("col{idx}")).collect();
    fields.extend([name, file_uuid, bundle_uuid, "trailing"].map(str::to_string));
    fields.join("\t")
}

#[test]
fn manifest_becomes_job_input() {
    let input = [
        manifest_row("File Name", "File ID", "Bundle UUID"),
        manifest_row("s1.tar.gz", "f-1", "b-1"),
        String::new(),
        manifest_row("s2.tar.gz", "f-2", "b-2"),
    ]
    .join("\n");

    let entries = parse_manifest(input.as_bytes()).unwrap();
    assert_eq!(entries.len(), 2);

    let document = job_input(&entries, DEFAULT_STORAGE_HOST);
    let rendered = render(&document).unwrap();
    let parsed: Value = serde_json::from_str(&rendered).unwrap();

    assert_eq!(
        parsed["my_test"][1]["path"],
        "redwood://walt-hca.ucsc-cgl.org/b-2/f-2/s2.tar.gz"
    );
    assert_eq!(parsed["my_test"][0]["class"], "File");
    assert_eq!(parsed["input_directory"], "/datastore");
    assert_eq!(parsed["rsem_gene"], "true");
    assert_eq!(parsed["output_file"]["path"], "/tmp/gene_by_cell.tar.gz");
}

#[test]
fn short_row_is_rejected() {
    let input = format!("{}\nonly\tthree\tcolumns\n", manifest_row("a", "b", "c"));
    let err = parse_manifest(input.as_bytes()).unwrap_err();
    assert_matches!(
        err,
        GeneByCellError::InvalidManifest(message) if message.starts_with("line 2")
    );
}
