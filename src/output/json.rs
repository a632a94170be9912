//! JSON export writer

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

use super::path::ExportPaths;
use super::{write_atomic, OutputError, OutputResult};
use crate::model::{EndpointData, ExportBundle};

/// Envelope of a per-section file
#[derive(Debug, Serialize)]
pub struct SectionEnvelope<'a> {
    /// Bundle timestamp
    pub timestamp: &'a DateTime<Utc>,
    /// Endpoint key the data came from
    pub section: &'a str,
    /// The section's data
    pub data: &'a EndpointData,
}

/// Writes a bundle into an export directory, replacing files of the same name
#[derive(Debug, Clone)]
pub struct ExportWriter {
    paths: ExportPaths,
}

impl ExportWriter {
    /// Writer targeting `output_dir`
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            paths: ExportPaths::new(output_dir),
        }
    }

    /// Target layout
    pub fn paths(&self) -> &ExportPaths {
        &self.paths
    }

    /// Write the aggregate file, then one file per populated section.
    ///
    /// Returns every file written, aggregate first.
    pub fn write(&self, bundle: &ExportBundle) -> OutputResult<Vec<PathBuf>> {
        self.paths.ensure_directories()?;
        let mut written = Vec::new();

        let aggregate = self.paths.aggregate();
        write_json(&aggregate, bundle)?;
        written.push(aggregate);

        for (section, data) in bundle.data.iter() {
            if !data.is_populated() {
                debug!(section, "Section empty, no file written");
                continue;
            }
            let path = self.paths.section(section);
            let envelope = SectionEnvelope {
                timestamp: &bundle.timestamp,
                section,
                data,
            };
            write_json(&path, &envelope)?;
            written.push(path);
        }

        info!(
            dir = %self.paths.root().display(),
            files = written.len(),
            "Export written"
        );
        Ok(written)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &std::path::Path, value: &T) -> OutputResult<()> {
    let mut json = serde_json::to_vec_pretty(value)
        .map_err(|e| OutputError::SerializationError(e.to_string()))?;
    json.push(b'\n');
    write_atomic(path, &json)
}
