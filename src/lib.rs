//! # Health Data Export Library
//!
//! Exports everything a personal health-data account holds (profile, lab
//! requisitions and results, biomarkers with sex-specific detail records,
//! insights) to a directory of JSON files, with an optional Markdown report.
//!
//! ## Features
//!
//! - **Single session**: login once, refresh the access token on demand before
//!   any request that would use an expiring token
//! - **Bounded retries**: exponential backoff around every network operation
//! - **Rate limiting**: one request at a time with a fixed pause before each
//! - **Complete output shape**: every endpoint key is present in the export,
//!   failed fetches hold `null` or `[]`
//!
//! ## Quick Start
//!
//! ```no_run
//! use health_data_export::client::{ApiGateway, DEFAULT_ENDPOINTS};
//! use health_data_export::config::ExportConfig;
//! use health_data_export::export::{Aggregator, AggregatorOptions};
//! use health_data_export::model::ExportBundle;
//! use health_data_export::output::ExportWriter;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExportConfig {
//!     base_url: "https://api.example.com/v1".to_string(),
//!     ..ExportConfig::default()
//! };
//!
//! let mut gateway = ApiGateway::new(&config, &DEFAULT_ENDPOINTS)?;
//! let session = gateway.login("me@example.com", "secret").await?;
//!
//! let options = AggregatorOptions::from_config(&config);
//! let data = Aggregator::new(gateway, &DEFAULT_ENDPOINTS, options)
//!     .fetch_all()
//!     .await?;
//!
//! ExportWriter::new(&config.output_dir).write(&ExportBundle::new(session.email, data))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`client`] - retry executor, session manager and rate-limited gateway
//! - [`export`] - endpoint catalog and the sequential aggregator
//! - [`output`] - JSON export writer and Markdown report
//! - [`model`] - typed payloads and the aggregate result
//! - [`config`] - TOML configuration file

#![warn(missing_docs)]
#![warn(clippy::all)]

/// CLI command implementations
pub mod cli;

/// Network layer
pub mod client;

/// Configuration file
pub mod config;

/// Export orchestration
pub mod export;

/// Metrics counters
pub mod metrics;

/// Typed payloads
pub mod model;

/// Export writers
pub mod output;

/// Ctrl+C coordination
pub mod shutdown;

pub use client::{ApiGateway, ClientError};
pub use export::{Aggregator, ExportError};
pub use model::{AggregateResult, EndpointData, ExportBundle, Session};
pub use output::ExportWriter;
