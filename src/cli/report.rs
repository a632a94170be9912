//! Report command: Markdown from an existing `all-data.json`

use clap::Parser;
use std::path::{Path, PathBuf};

use super::export::print_summary;
use super::CliError;
use crate::output::markdown;

/// Report command arguments
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Bundle written by `export` (all-data.json)
    #[arg(long)]
    pub input: PathBuf,

    /// Directory for the Markdown files (default: next to the input)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl ReportArgs {
    /// Directory the report goes to
    pub fn output_dir(&self) -> PathBuf {
        match &self.output {
            Some(dir) => dir.clone(),
            None => self
                .input
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf(),
        }
    }

    /// Render the report
    pub async fn execute(&self) -> Result<(), CliError> {
        let bundle = markdown::read_bundle(&self.input)?;
        let dir = self.output_dir();
        let written = markdown::write_report(&bundle, &dir)?;
        print_summary(&dir, &written);
        Ok(())
    }
}
