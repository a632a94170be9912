//! Export writers
//!
//! - [`json`] - aggregate bundle plus one enveloped file per populated section
//! - [`markdown`] - human-readable report rendered from a written bundle
//! - [`path`] - fixed, kebab-case file layout of an export directory

use std::io::Write;
use std::path::Path;

pub mod json;
pub mod markdown;
pub mod path;

pub use json::ExportWriter;
pub use path::ExportPaths;

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// A previously written export could not be read back
    #[error("parse error: {0}")]
    ParseError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Replace `path` with `contents` through a temp file in the same directory.
///
/// Readers see either the previous file or the complete new one.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> OutputResult<()> {
    let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
        .map_err(|e| OutputError::IoError(format!("Failed to create temp file: {e}")))?;

    temp_file
        .write_all(contents)
        .map_err(|e| OutputError::IoError(format!("Failed to write to temp file: {e}")))?;
    temp_file
        .flush()
        .map_err(|e| OutputError::IoError(format!("Failed to flush temp file: {e}")))?;

    temp_file.persist(path).map_err(|e| {
        OutputError::IoError(format!("Failed to persist {}: {e}", path.display()))
    })?;
    Ok(())
}
