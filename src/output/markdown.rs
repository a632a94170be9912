//! Markdown report rendered from an export bundle
//!
//! Works on the bundle's JSON form so it can render both a fresh export and an
//! `all-data.json` written by an earlier run.

use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use super::path::{ExportPaths, AGGREGATE_FILE_NAME};
use super::{write_atomic, OutputError, OutputResult};
use crate::model::ExportBundle;

const BIOMARKERS: &str = "biomarkers";
const BIOMARKER_DETAILS: &str = "biomarker_details";

/// Read an `all-data.json` bundle back from disk
pub fn read_bundle(path: &Path) -> OutputResult<Value> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| OutputError::IoError(format!("Failed to read {}: {e}", path.display())))?;
    let value: Value = serde_json::from_str(&text)
        .map_err(|e| OutputError::ParseError(format!("{}: {e}", path.display())))?;
    if !value.get("data").is_some_and(Value::is_object) {
        return Err(OutputError::ParseError(format!(
            "{} has no data object; expected an {AGGREGATE_FILE_NAME} bundle",
            path.display()
        )));
    }
    Ok(value)
}

/// JSON form of a bundle, as the report renderer reads it
pub fn bundle_value(bundle: &ExportBundle) -> OutputResult<Value> {
    serde_json::to_value(bundle).map_err(|e| OutputError::SerializationError(e.to_string()))
}

/// Write `index.md` and `biomarkers.md` into `output_dir`
pub fn write_report(bundle: &Value, output_dir: &Path) -> OutputResult<Vec<PathBuf>> {
    let paths = ExportPaths::new(output_dir);
    paths.ensure_directories()?;

    let index = paths.index_report();
    write_atomic(&index, render_index(bundle).as_bytes())?;
    let biomarkers = paths.biomarkers_report();
    write_atomic(&biomarkers, render_biomarkers(bundle).as_bytes())?;

    info!(dir = %output_dir.display(), "Markdown report written");
    Ok(vec![index, biomarkers])
}

/// Summary page: export metadata, section overview and every generic section
pub fn render_index(bundle: &Value) -> String {
    let empty = Map::new();
    let data = bundle.get("data").and_then(Value::as_object).unwrap_or(&empty);
    let mut out = String::new();

    out.push_str("# Health data export\n\n");
    if let Some(timestamp) = bundle.get("timestamp").and_then(Value::as_str) {
        let _ = writeln!(out, "- Exported: {timestamp}");
    }
    if let Some(email) = bundle.get("accountEmail").and_then(Value::as_str) {
        let _ = writeln!(out, "- Account: {email}");
    }

    out.push_str("\n## Sections\n\n| Section | Items |\n|---|---|\n");
    for (key, value) in data {
        let _ = writeln!(out, "| {} | {} |", title(key), item_count(value));
    }

    for (key, value) in data {
        if key == BIOMARKERS || key == BIOMARKER_DETAILS {
            continue;
        }
        let _ = write!(out, "\n## {}\n\n", title(key));
        if item_count(value) == 0 {
            out.push_str("_No data._\n");
        } else {
            render_value(value, 0, &mut out);
        }
    }

    if data.contains_key(BIOMARKERS) {
        out.push_str("\nBiomarkers are listed in [biomarkers.md](biomarkers.md).\n");
    }
    out
}

/// Biomarker page: overview table plus one section per biomarker
pub fn render_biomarkers(bundle: &Value) -> String {
    let biomarkers = list(bundle, BIOMARKERS);
    let details = list(bundle, BIOMARKER_DETAILS);
    let mut out = String::from("# Biomarkers\n\n");

    if biomarkers.is_empty() {
        out.push_str("_No biomarkers in this export._\n");
        return out;
    }

    let detail_for = |biomarker: &Value| {
        let id = id_text(biomarker.get("id"));
        details
            .iter()
            .find(|d| d.get("biomarkerId").and_then(Value::as_str) == Some(id.as_str()))
    };

    out.push_str("| Biomarker | Variant | Summary |\n|---|---|---|\n");
    for biomarker in biomarkers {
        let detail = detail_for(biomarker);
        let _ = writeln!(
            out,
            "| {} | {} | {} |",
            cell(text(Some(biomarker), "name")),
            cell(text(detail, "sex")),
            cell(text(detail, "oneLineDescription")),
        );
    }

    for biomarker in biomarkers {
        let detail = detail_for(biomarker);
        let _ = write!(out, "\n## {}\n", text(Some(biomarker), "name"));
        for (heading, key) in [
            ("Summary", "oneLineDescription"),
            ("Why it matters", "whyItMatters"),
            ("Description", "description"),
        ] {
            let body = text(detail, key);
            if !body.is_empty() {
                let _ = write!(out, "\n### {heading}\n\n{}\n", body.trim());
            }
        }
    }
    out
}

/// Nested bullet list of any JSON value
fn render_value(value: &Value, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    match value {
        Value::Object(map) => {
            for (key, field) in map {
                if is_scalar(field) {
                    let _ = writeln!(out, "{indent}- {}: {}", title(key), scalar(field));
                } else {
                    let _ = writeln!(out, "{indent}- {}:", title(key));
                    render_value(field, depth + 1, out);
                }
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                if is_scalar(item) {
                    let _ = writeln!(out, "{indent}- {}", scalar(item));
                } else {
                    let _ = writeln!(out, "{indent}- **{}**", item_label(item, index));
                    render_value(item, depth + 1, out);
                }
            }
        }
        scalar_value => {
            let _ = writeln!(out, "{indent}- {}", scalar(scalar_value));
        }
    }
}

fn list<'a>(bundle: &'a Value, key: &str) -> &'a [Value] {
    bundle
        .get("data")
        .and_then(|d| d.get(key))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn item_count(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::Array(items) => items.len(),
        _ => 1,
    }
}

fn item_label(item: &Value, index: usize) -> String {
    ["name", "title", "id"]
        .iter()
        .find_map(|key| item.get(*key).filter(|v| is_scalar(v)).map(scalar))
        .unwrap_or_else(|| format!("#{}", index + 1))
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

fn scalar(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn text(record: Option<&Value>, key: &str) -> String {
    record
        .and_then(|r| r.get(key))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn id_text(id: Option<&Value>) -> String {
    match id {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// `payment_cards` → `Payment cards`
fn title(key: &str) -> String {
    let words = super::path::kebab_case(key).replace('-', " ");
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => key.to_string(),
    }
}

fn cell(text: String) -> String {
    text.replace('|', "\\|").replace(['\n', '\r'], " ")
}
