//! Export orchestration
//!
//! The aggregator walks a fixed catalog of endpoint sections, one request at a
//! time, and folds every outcome into an [`AggregateResult`](crate::model::AggregateResult)
//! whose shape does not depend on which fetches succeeded.
//!
//! # Components
//!
//! - [`catalog`] - declarative sections of `(name, fetch, payload)` tasks
//! - [`aggregator`] - sequential fetch-all plus the biomarker detail phase
//! - [`biomarkers`] - sex-scoped detail variant resolution
//!
//! # Error Handling
//!
//! Individual endpoint failures are contained per task and replaced by the
//! task's empty placeholder. Only a missing session, a failed token refresh and
//! an interrupt abort the run.

pub mod aggregator;
pub mod biomarkers;
pub mod catalog;

pub use aggregator::{Aggregator, AggregatorOptions};
pub use catalog::{default_catalog, EndpointTask, Fetch, Payload, Section};

use crate::client::ClientError;

/// Export errors
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Fatal client error (no session, token refresh failed)
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Shutdown was requested before the export finished
    #[error("export interrupted before completion, nothing was written")]
    Interrupted,
}

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;
