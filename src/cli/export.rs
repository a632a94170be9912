//! Export command: login, fetch everything, write the bundle

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::prompt::{prompt_line, prompt_password};
use super::{CliError, ConfigCommand, ReportArgs};
use crate::client::{ApiGateway, DEFAULT_ENDPOINTS};
use crate::config::{self, ExportConfig};
use crate::export::{Aggregator, AggregatorOptions, ExportError};
use crate::model::ExportBundle;
use crate::output::{markdown, ExportWriter};
use crate::shutdown::SharedShutdown;

/// Environment variable read when `--password` is not given
pub const PASSWORD_ENV: &str = "HEALTH_EXPORT_PASSWORD";

/// Export personal lab and biomarker data
#[derive(Parser, Debug)]
#[command(name = "health-export", version, about)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Config file (default: <config dir>/health-export/config.toml)
    #[arg(long, global = true, env = "HEALTH_EXPORT_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Config file this invocation reads and writes
    pub fn config_path(&self) -> Result<PathBuf, CliError> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Ok(config::config_path()?),
        }
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in and export every endpoint
    Export(ExportArgs),

    /// Render the Markdown report from an existing export
    Report(ReportArgs),

    /// Inspect or edit the config file
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Export command arguments; flags override the config file for this run
#[derive(Parser, Debug, Default)]
pub struct ExportArgs {
    /// Account email (default: remembered email, else prompt)
    #[arg(long)]
    pub email: Option<String>,

    /// Account password (default: prompt)
    #[arg(long, env = PASSWORD_ENV, hide_env_values = true)]
    pub password: Option<String>,

    /// Directory receiving the export files
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// API base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// API key for the identity provider's token refresh endpoint
    #[arg(long, env = "HEALTH_EXPORT_IDENTITY_API_KEY", hide_env_values = true)]
    pub identity_api_key: Option<String>,

    /// Attempts per network operation (1-20)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_retries: Option<u32>,

    /// Base backoff delay in milliseconds
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,

    /// Pause before every API request in milliseconds
    #[arg(long)]
    pub rate_limit_ms: Option<u64>,

    /// Fetch details for at most this many biomarkers (0 = all)
    #[arg(long)]
    pub max_biomarkers: Option<usize>,

    /// Also render index.md and biomarkers.md
    #[arg(long, default_value_t = false)]
    pub markdown: bool,

    /// Do not remember the email in the config file
    #[arg(long, default_value_t = false)]
    pub no_save_email: bool,
}

impl ExportArgs {
    /// Apply command-line overrides on top of the file configuration
    pub fn apply_overrides(&self, config: &mut ExportConfig) {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if let Some(key) = &self.identity_api_key {
            config.identity_api_key = Some(key.clone());
        }
        if let Some(attempts) = self.max_retries {
            config.retry_attempts = attempts;
        }
        if let Some(delay) = self.retry_delay_ms {
            config.retry_base_delay_ms = delay;
        }
        if let Some(interval) = self.rate_limit_ms {
            config.rate_limit_ms = interval;
        }
        if let Some(limit) = self.max_biomarkers {
            config.max_biomarker_details = limit;
        }
    }

    /// Run the export
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config_path = cli.config_path()?;
        let mut config = config::load_from(&config_path)?;
        self.apply_overrides(&mut config);
        config.validate()?;

        let email = match self.email.clone().or_else(|| config.email.clone()) {
            Some(email) => email,
            None => prompt_line("Email: ").await?,
        };
        let email = email.trim().to_string();
        if email.is_empty() {
            return Err(CliError::InvalidArgument("an email is required".to_string()));
        }
        let password = match &self.password {
            Some(password) => password.clone(),
            None => prompt_password("Password: ").await?,
        };
        if password.is_empty() {
            return Err(CliError::InvalidArgument("a password is required".to_string()));
        }

        let mut gateway = ApiGateway::new(&config, &DEFAULT_ENDPOINTS)?;
        let session = gateway.login(&email, &password).await?;
        drop(password);

        if !self.no_save_email && config.email.as_deref() != Some(email.as_str()) {
            if let Err(e) = remember_email(&config_path, &email) {
                warn!(error = %e, "Could not remember email");
            }
        }

        let progress = create_progress_bar();
        let mut aggregator =
            Aggregator::new(gateway, &DEFAULT_ENDPOINTS, AggregatorOptions::from_config(&config))
                .with_shutdown(shutdown.clone())
                .with_progress(progress.clone());

        let data = tokio::select! {
            result = aggregator.fetch_all() => result,
            _ = shutdown.wait_for_shutdown() => Err(ExportError::Interrupted),
        };
        let data = match data {
            Ok(data) => data,
            Err(e) => {
                progress.abandon();
                return Err(e.into());
            }
        };

        let bundle = ExportBundle::new(session.email.clone(), data);
        let writer = ExportWriter::new(&config.output_dir);
        let mut written = writer.write(&bundle)?;
        if self.markdown {
            let value = markdown::bundle_value(&bundle)?;
            written.extend(markdown::write_report(&value, writer.paths().root())?);
        }

        info!(files = written.len(), "Export finished");
        print_summary(writer.paths().root(), &written);
        Ok(())
    }
}

/// Store `email` in the config file without persisting any flag overrides
fn remember_email(path: &Path, email: &str) -> Result<(), CliError> {
    let mut stored = config::load_from(path)?;
    stored.email = Some(email.to_string());
    config::save_to(&stored, path)?;
    info!(path = %path.display(), "Remembered email");
    Ok(())
}

pub(super) fn print_summary(dir: &Path, written: &[PathBuf]) {
    println!("Wrote {} files to {}", written.len(), dir.display());
    for path in written {
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        println!("  {name}");
    }
}

fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    match ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        Ok(style) => pb.set_style(style.progress_chars("#>-")),
        Err(e) => warn!(error = %e, "Invalid progress template, using default style"),
    }
    pb
}
