//! Integration tests for the export directory layout

use health_data_export::model::{AggregateResult, EndpointData, ExportBundle};
use health_data_export::output::{markdown, ExportWriter};
use serde_json::{json, Value};
use tempfile::TempDir;

fn bundle() -> ExportBundle {
    let mut data = AggregateResult::new();
    data.insert("biological_age", EndpointData::Empty);
    data.insert(
        "lab_results",
        EndpointData::List(vec![json!({"id": "r1", "value": 4.2})]),
    );
    ExportBundle::new("a@b.com", data)
}

fn file_names(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_null_section_gets_no_file() {
    let dir = TempDir::new().unwrap();
    let written = ExportWriter::new(dir.path()).write(&bundle()).unwrap();

    assert_eq!(written.len(), 2);
    assert_eq!(file_names(dir.path()), vec!["all-data.json", "lab-results.json"]);

    let aggregate: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("all-data.json")).unwrap())
            .unwrap();
    assert!(aggregate["timestamp"].is_string());
    assert_eq!(aggregate["data"]["biological_age"], Value::Null);
    assert_eq!(aggregate["data"]["lab_results"][0]["id"], "r1");

    let section: Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("lab-results.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(section["timestamp"], aggregate["timestamp"]);
    assert_eq!(section["section"], "lab_results");
    assert_eq!(section["data"], aggregate["data"]["lab_results"]);
}

#[test]
fn test_rewrite_overwrites_same_files() {
    let dir = TempDir::new().unwrap();
    let writer = ExportWriter::new(dir.path());
    let bundle = bundle();

    writer.write(&bundle).unwrap();
    let first = std::fs::read(dir.path().join("all-data.json")).unwrap();

    std::fs::write(dir.path().join("lab-results.json"), "stale").unwrap();
    writer.write(&bundle).unwrap();
    let second = std::fs::read(dir.path().join("all-data.json")).unwrap();

    assert_eq!(first, second);
    assert_eq!(file_names(dir.path()), vec!["all-data.json", "lab-results.json"]);
    let section = std::fs::read_to_string(dir.path().join("lab-results.json")).unwrap();
    assert!(section.contains("\"section\": \"lab_results\""));
}

#[test]
fn test_markdown_report_from_written_bundle() {
    let dir = TempDir::new().unwrap();
    let writer = ExportWriter::new(dir.path());
    writer.write(&bundle()).unwrap();

    let value = markdown::read_bundle(&dir.path().join("all-data.json")).unwrap();
    let written = markdown::write_report(&value, dir.path()).unwrap();
    assert_eq!(written.len(), 2);

    let index = std::fs::read_to_string(dir.path().join("index.md")).unwrap();
    assert!(index.contains("- Account: a@b.com"));
    assert!(index.contains("## Lab results"));
    assert!(index.contains("- **r1**"));
    assert!(index.contains("  - Value: 4.2"));

    let biomarkers = std::fs::read_to_string(dir.path().join("biomarkers.md")).unwrap();
    assert!(biomarkers.contains("_No biomarkers in this export._"));
}
