//! Sequential fetch-all over the endpoint catalog
//!
//! The aggregator issues one request at a time through an [`ApiSource`], folds
//! each outcome into the task's decoded value or its empty placeholder, and then
//! runs the biomarker detail phase. Only fatal client errors and shutdown stop a
//! run early.

use indicatif::ProgressBar;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::biomarkers::resolve_detail_variant;
use super::catalog::{
    default_catalog, EndpointTask, Fetch, Section, BIOMARKERS_KEY, BIOMARKER_DETAILS_KEY,
    PROFILE_KEY,
};
use super::{ExportError, ExportResult};
use crate::client::{ApiEndpoints, ApiRequest, ApiSource};
use crate::config::{ExportConfig, DEFAULT_BIOMARKER_PAUSE_MS};
use crate::metrics;
use crate::model::{AggregateResult, Biomarker, BiomarkerDetail, EndpointData, Sex};
use crate::shutdown::SharedShutdown;

/// Tunables of the biomarker detail phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorOptions {
    /// Fetch details for at most this many biomarkers (0 = all)
    pub max_biomarker_details: usize,
    /// Pause between two biomarker detail items
    pub biomarker_pause: Duration,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            max_biomarker_details: 0,
            biomarker_pause: Duration::from_millis(DEFAULT_BIOMARKER_PAUSE_MS),
        }
    }
}

impl AggregatorOptions {
    /// Options taken from configuration
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            max_biomarker_details: config.max_biomarker_details,
            biomarker_pause: config.biomarker_pause(),
        }
    }
}

/// Walks the catalog against one API source
pub struct Aggregator<S> {
    source: S,
    endpoints: ApiEndpoints,
    catalog: Vec<Section>,
    options: AggregatorOptions,
    shutdown: Option<SharedShutdown>,
    progress: ProgressBar,
    completed_requisition: Option<String>,
}

impl<S: ApiSource> Aggregator<S> {
    /// Aggregator over the default catalog
    pub fn new(source: S, endpoints: &ApiEndpoints, options: AggregatorOptions) -> Self {
        Self {
            source,
            endpoints: endpoints.clone(),
            catalog: default_catalog(endpoints),
            options,
            shutdown: None,
            progress: ProgressBar::hidden(),
            completed_requisition: None,
        }
    }

    /// Replace the catalog
    pub fn with_catalog(mut self, catalog: Vec<Section>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Attach a shared shutdown handle checked between requests.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Report progress on `progress`; its length is set by [`fetch_all`](Self::fetch_all)
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Number of catalog tasks
    pub fn total_steps(&self) -> u64 {
        self.catalog.iter().map(|s| s.tasks.len() as u64).sum()
    }

    /// The wrapped source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Consume the aggregator, returning its source
    pub fn into_source(self) -> S {
        self.source
    }

    /// Fetch every catalog task, then the biomarker details.
    ///
    /// The result holds every declared key whatever happened to its fetch.
    pub async fn fetch_all(&mut self) -> ExportResult<AggregateResult> {
        let mut result = AggregateResult::new();
        self.completed_requisition = None;
        self.progress.set_length(self.total_steps());
        self.progress.set_position(0);

        let catalog = self.catalog.clone();
        for section in &catalog {
            info!(section = section.name, tasks = section.tasks.len(), "Fetching section");
            self.progress.set_message(section.name);

            for task in &section.tasks {
                self.check_shutdown()?;
                let data = self.run_task(task).await?;
                debug!(task = task.name, items = data.len(), "Task finished");
                result.insert(task.name, data);
                self.progress.inc(1);
            }
        }

        let biomarkers = match result.get(BIOMARKERS_KEY) {
            Some(EndpointData::Biomarkers(list)) => list.clone(),
            Some(EndpointData::List(items)) => {
                items.iter().map(Biomarker::from_value_lenient).collect()
            }
            _ => Vec::new(),
        };
        let sex = match result.get(PROFILE_KEY) {
            Some(EndpointData::Profile(profile)) => profile.sex(),
            _ => None,
        };

        let details = if biomarkers.is_empty() {
            debug!("No biomarkers retrieved, skipping detail phase");
            Vec::new()
        } else {
            self.fetch_biomarker_details(&biomarkers, sex).await?
        };
        result.insert(BIOMARKER_DETAILS_KEY, EndpointData::BiomarkerDetails(details));

        self.progress.finish_with_message("Fetch complete");
        info!(keys = result.len(), "Aggregation complete");
        Ok(result)
    }

    async fn run_task(&mut self, task: &EndpointTask) -> ExportResult<EndpointData> {
        let value = match &task.fetch {
            Fetch::Get(path) => self.fetch_value(task.name, &ApiRequest::get(*path)).await?,
            Fetch::Requisitions(path) => self.fetch_requisitions(task.name, path).await?,
            Fetch::Bmi(path) => {
                let mut request = ApiRequest::get(*path);
                if let Some(id) = &self.completed_requisition {
                    request = request.with_query("requisitionId", id.clone());
                }
                self.fetch_value(task.name, &request).await?
            }
        };

        Ok(match value {
            Some(value) => task.payload.decode(value),
            None => task.payload.empty(),
        })
    }

    /// Run one request, containing every non-fatal error
    async fn fetch_value(
        &mut self,
        task: &str,
        request: &ApiRequest,
    ) -> ExportResult<Option<Value>> {
        match self.source.fetch(request).await {
            Ok(value) => Ok(value),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                warn!(task, endpoint = %request.label(), "Fetch failed, storing empty value: {}", e);
                metrics::record_task_failure(task);
                Ok(None)
            }
        }
    }

    /// Pending and completed requisitions, concatenated in that order
    async fn fetch_requisitions(&mut self, task: &str, path: &str) -> ExportResult<Option<Value>> {
        let mut items = Vec::new();

        for pending in ["true", "false"] {
            let request = ApiRequest::get(path).with_query("pending", pending);
            let half = match self.fetch_value(task, &request).await? {
                Some(Value::Array(half)) => half,
                Some(Value::Null) | None => Vec::new(),
                Some(other) => vec![other],
            };

            if pending == "false" {
                self.completed_requisition = half.first().and_then(value_id);
            }
            items.extend(half);
        }

        if let Some(id) = &self.completed_requisition {
            debug!(requisition_id = %id, "Using first completed requisition");
        }
        Ok(Some(Value::Array(items)))
    }

    async fn fetch_biomarker_details(
        &mut self,
        biomarkers: &[Biomarker],
        sex: Option<Sex>,
    ) -> ExportResult<Vec<BiomarkerDetail>> {
        let limit = match self.options.max_biomarker_details {
            0 => biomarkers.len(),
            n => n.min(biomarkers.len()),
        };
        info!(
            biomarkers = biomarkers.len(),
            limit,
            sex = sex.map(|s| s.as_str()).unwrap_or("unknown"),
            "Fetching biomarker details"
        );
        self.progress.inc_length(limit as u64);
        self.progress.set_message("Biomarker details");

        let mut details = Vec::with_capacity(limit);
        for (index, biomarker) in biomarkers.iter().take(limit).enumerate() {
            self.check_shutdown()?;
            if index > 0 {
                self.pause(self.options.biomarker_pause).await?;
            }

            let detail = match resolve_detail_variant(biomarker, sex) {
                None => {
                    debug!(biomarker = %biomarker.id, "No detail variant for sex");
                    BiomarkerDetail::placeholder(biomarker)
                }
                Some(variant) => {
                    let detail_id = variant.id.to_string();
                    let request = ApiRequest::get(self.endpoints.biomarker_detail_path(&detail_id));
                    match self.fetch_value(BIOMARKER_DETAILS_KEY, &request).await? {
                        Some(record) if !record.is_null() => {
                            BiomarkerDetail::from_record(biomarker, variant, record)
                        }
                        _ => BiomarkerDetail {
                            detail_id,
                            sex: variant.sex.clone(),
                            ..BiomarkerDetail::placeholder(biomarker)
                        },
                    }
                }
            };
            details.push(detail);
            self.progress.inc(1);
        }

        Ok(details)
    }

    async fn pause(&self, duration: Duration) -> ExportResult<()> {
        if duration.is_zero() {
            return Ok(());
        }
        match &self.shutdown {
            Some(shutdown) => {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => Ok(()),
                    _ = shutdown.wait_for_shutdown() => Err(ExportError::Interrupted),
                }
            }
            None => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
        }
    }

    fn check_shutdown(&self) -> ExportResult<()> {
        let requested = self
            .shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false);
        if requested {
            info!("Shutdown requested - abandoning export");
            return Err(ExportError::Interrupted);
        }
        Ok(())
    }
}

/// `id` of a JSON record, string or number
fn value_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
