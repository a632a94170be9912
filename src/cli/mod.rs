//! CLI command implementations

pub mod config_cmd;
pub mod error;
pub mod export;
mod prompt;
pub mod report;

pub use config_cmd::ConfigCommand;
pub use error::CliError;
pub use export::{Cli, Commands, ExportArgs};
pub use report::ReportArgs;
