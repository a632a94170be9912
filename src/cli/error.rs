//! CLI error types and conversions

use crate::client::ClientError;
use crate::config::ConfigError;
use crate::export::ExportError;
use crate::output::OutputError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Login or request error
    #[error("client error: {0}")]
    ClientError(#[from] ClientError),

    /// Export run error
    #[error("export error: {0}")]
    ExportError(#[from] ExportError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(#[from] ConfigError),

    /// Terminal or stdin error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Interactive prompt task did not complete
    #[error("prompt failed: {0}")]
    PromptError(String),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
