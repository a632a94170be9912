//! Exporter configuration
//!
//! Settings live in `<config dir>/health-export/config.toml`. A missing file
//! means defaults; command-line flags override individual values for one run.
//! The account password is never part of the configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::client::retry::RetryPolicy;

/// Default identity-provider token endpoint used for refresh
pub const DEFAULT_REFRESH_URL: &str = "https://securetoken.googleapis.com/v1/token";
/// Default attempts per network operation
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
/// Default base backoff delay
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;
/// Default pause before every API request
pub const DEFAULT_RATE_LIMIT_MS: u64 = 500;
/// Refresh the access token this many seconds before it expires
pub const DEFAULT_TOKEN_REFRESH_BUFFER_SECS: i64 = 300;
/// Extra pause between biomarker detail requests
pub const DEFAULT_BIOMARKER_PAUSE_MS: u64 = 250;
/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const CONFIG_DIR_NAME: &str = "health-export";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No platform config directory
    #[error("could not determine the configuration directory")]
    NoConfigDir,

    /// Reading or writing the config file failed
    #[error("IO error on {path}: {message}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        message: String,
    },

    /// The file is not valid TOML for this schema
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// File involved
        path: PathBuf,
        /// Underlying error
        message: String,
    },

    /// Serialization failed
    #[error("failed to serialize configuration: {0}")]
    Serialize(String),

    /// A value is out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// All recognized options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// API base URL; required, set in the file or with `--base-url`
    pub base_url: String,
    /// Identity-provider token endpoint used for refresh
    pub refresh_url: String,
    /// API key appended to `refresh_url` as `key`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_api_key: Option<String>,
    /// Directory receiving export files
    pub output_dir: PathBuf,
    /// Attempts per network operation
    pub retry_attempts: u32,
    /// Base backoff delay in milliseconds
    pub retry_base_delay_ms: u64,
    /// Pause before every API request in milliseconds
    pub rate_limit_ms: u64,
    /// Refresh the token when it is this close to expiry
    pub token_refresh_buffer_secs: i64,
    /// Cap on biomarker detail fetches (0 = unlimited)
    pub max_biomarker_details: usize,
    /// Extra pause between biomarker detail fetches in milliseconds
    pub biomarker_pause_ms: u64,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// `User-Agent` header value
    pub user_agent: String,
    /// App version header value
    pub app_version: String,
    /// Remembered account email
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            refresh_url: DEFAULT_REFRESH_URL.to_string(),
            identity_api_key: None,
            output_dir: PathBuf::from("health-export"),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            token_refresh_buffer_secs: DEFAULT_TOKEN_REFRESH_BUFFER_SECS,
            max_biomarker_details: 0,
            biomarker_pause_ms: DEFAULT_BIOMARKER_PAUSE_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            user_agent: format!("health-export/{}", env!("CARGO_PKG_VERSION")),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            email: None,
        }
    }
}

impl ExportConfig {
    /// Check value ranges
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, url) in [("base_url", &self.base_url), ("refresh_url", &self.refresh_url)] {
            if url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} must be set")));
            }
            let parsed = reqwest::Url::parse(url)
                .map_err(|e| ConfigError::Invalid(format!("{name} is not a valid URL ({url}): {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid(format!(
                    "{name} must use http or https, got {url}"
                )));
            }
        }
        // The stock identity provider rejects refresh calls without a key
        let key_missing = self
            .identity_api_key
            .as_deref()
            .map_or(true, |key| key.trim().is_empty());
        if self.refresh_url == DEFAULT_REFRESH_URL && key_missing {
            return Err(ConfigError::Invalid(
                "identity_api_key must be set when using the default refresh_url".to_string(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.token_refresh_buffer_secs < 0 {
            return Err(ConfigError::Invalid(
                "token_refresh_buffer_secs must not be negative".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Retry policy for every network operation
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.retry_base_delay_ms)
    }

    /// Pause before every API request
    pub fn rate_limit_interval(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    /// Pause between biomarker detail requests
    pub fn biomarker_pause(&self) -> Duration {
        Duration::from_millis(self.biomarker_pause_ms)
    }

    /// Per-request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Base URL without a trailing slash
    pub fn api_base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Default config file location
pub fn config_path() -> ConfigResult<PathBuf> {
    let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load the config at `path`, or defaults when it does not exist.
///
/// Values are not validated here; flags may still fill them in.
pub fn load_from(path: &Path) -> ConfigResult<ExportConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "No config file, using defaults");
        return Ok(ExportConfig::default());
    }

    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let config: ExportConfig = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    debug!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Write `config` to `path`, creating parent directories
pub fn save_to(config: &ExportConfig, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
            path: parent.to_path_buf(),
            message: e.to_string(),
        })?;
    }

    let contents =
        toml::to_string_pretty(config).map_err(|e| ConfigError::Serialize(e.to_string()))?;
    fs::write(path, contents).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    debug!(path = %path.display(), "Saved config");
    Ok(())
}
