//! File layout of an export directory
//!
//! ```text
//! <output_dir>/
//!   all-data.json          full bundle
//!   <section-name>.json    one per populated section, kebab-case
//!   index.md               optional Markdown summary
//!   biomarkers.md          optional Markdown biomarker report
//! ```

use std::path::{Path, PathBuf};

use super::{OutputError, OutputResult};

/// File holding the full bundle
pub const AGGREGATE_FILE_NAME: &str = "all-data.json";
/// Markdown summary
pub const INDEX_FILE_NAME: &str = "index.md";
/// Markdown biomarker report
pub const BIOMARKERS_REPORT_FILE_NAME: &str = "biomarkers.md";

/// Paths inside one export directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    root: PathBuf,
}

impl ExportPaths {
    /// Layout rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Export directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full bundle file
    pub fn aggregate(&self) -> PathBuf {
        self.root.join(AGGREGATE_FILE_NAME)
    }

    /// Per-section file for `section`
    pub fn section(&self, section: &str) -> PathBuf {
        self.root.join(section_file_name(section))
    }

    /// Markdown summary
    pub fn index_report(&self) -> PathBuf {
        self.root.join(INDEX_FILE_NAME)
    }

    /// Markdown biomarker report
    pub fn biomarkers_report(&self) -> PathBuf {
        self.root.join(BIOMARKERS_REPORT_FILE_NAME)
    }

    /// Create the export directory and its parents
    pub fn ensure_directories(&self) -> OutputResult<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| {
            OutputError::IoError(format!("Failed to create {}: {e}", self.root.display()))
        })
    }
}

/// `payment_cards` → `payment-cards.json`
pub fn section_file_name(section: &str) -> String {
    format!("{}.json", kebab_case(section))
}

/// Lowercase words joined by single dashes.
///
/// Word boundaries are non-alphanumeric characters and lower-to-upper case
/// changes, so `biomarker_details`, `biomarkerDetails` and `Biomarker Details`
/// all become `biomarker-details`.
pub fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_lower = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() && prev_lower && !out.ends_with('-') {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        } else {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
            prev_lower = false;
        }
    }

    while out.ends_with('-') {
        out.pop();
    }
    out
}
