//! Config command: show, locate and edit the config file

use clap::Subcommand;

use super::{Cli, CliError};
use crate::config;

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Print the config file location
    Path,

    /// Remember an account email
    SetEmail {
        /// Email to store
        email: String,
    },
}

impl ConfigCommand {
    /// Execute the subcommand
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let path = cli.config_path()?;
        match self {
            Self::Path => println!("{}", path.display()),
            Self::Show => {
                let config = config::load_from(&path)?;
                let text = toml::to_string_pretty(&config)
                    .map_err(|e| config::ConfigError::Serialize(e.to_string()))?;
                println!("# {}", path.display());
                print!("{text}");
            }
            Self::SetEmail { email } => {
                let email = email.trim();
                if !email.contains('@') {
                    return Err(CliError::InvalidArgument(format!(
                        "'{email}' is not an email address"
                    )));
                }
                let mut stored = config::load_from(&path)?;
                stored.email = Some(email.to_string());
                config::save_to(&stored, &path)?;
                println!("Saved {email} to {}", path.display());
            }
        }
        Ok(())
    }
}
