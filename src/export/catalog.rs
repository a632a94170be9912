//! Declarative endpoint catalog
//!
//! Sections only group tasks for progress reporting. Sections run in
//! declaration order and tasks within a section run in declaration order.

use serde_json::Value;

use crate::client::ApiEndpoints;
use crate::model::{Biomarker, EndpointData, UserProfile};

/// Key of the account profile
pub const PROFILE_KEY: &str = "profile";
/// Key of the biomarker catalog
pub const BIOMARKERS_KEY: &str = "biomarkers";
/// Key of the concatenated requisitions
pub const REQUISITIONS_KEY: &str = "requisitions";
/// Key filled by the biomarker detail phase
pub const BIOMARKER_DETAILS_KEY: &str = "biomarker_details";

/// How a task obtains its raw value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch {
    /// Plain GET
    Get(&'static str),
    /// GET with `pending=true` and `pending=false`, concatenated
    Requisitions(&'static str),
    /// GET, with `requisitionId` of the first completed requisition when known
    Bmi(&'static str),
}

impl Fetch {
    /// Endpoint path the task calls
    pub fn path(&self) -> &'static str {
        match self {
            Self::Get(path) | Self::Requisitions(path) | Self::Bmi(path) => path,
        }
    }
}

/// Expected payload, which decides the decoded type and the empty placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// Account profile; empty is `null`
    Profile,
    /// Biomarker catalog; empty is `[]`
    Biomarkers,
    /// Any single JSON value; empty is `null`
    Record,
    /// Any JSON array; empty is `[]`
    Collection,
}

impl Payload {
    /// Placeholder stored when the fetch produced nothing
    pub fn empty(&self) -> EndpointData {
        match self {
            Self::Profile | Self::Record => EndpointData::Empty,
            Self::Biomarkers => EndpointData::Biomarkers(Vec::new()),
            Self::Collection => EndpointData::List(Vec::new()),
        }
    }

    /// Decode a fetched value, keeping it raw when it does not fit the model
    pub fn decode(&self, value: Value) -> EndpointData {
        match (self, value) {
            (_, Value::Null) => self.empty(),
            (Self::Profile, value @ Value::Object(_)) => {
                match serde_json::from_value::<UserProfile>(value.clone()) {
                    Ok(profile) => EndpointData::Profile(profile),
                    Err(_) => EndpointData::Raw(value),
                }
            }
            // Records are decoded one by one so a malformed entry cannot drop the rest
            (Self::Biomarkers, Value::Array(items)) if items.iter().all(Value::is_object) => {
                EndpointData::Biomarkers(items.iter().map(Biomarker::from_value_lenient).collect())
            }
            (Self::Biomarkers, Value::Array(items)) => EndpointData::List(items),
            (Self::Collection, Value::Array(items)) => EndpointData::List(items),
            (_, value) => EndpointData::Raw(value),
        }
    }
}

/// One named endpoint fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTask {
    /// Unique key in the aggregate result
    pub name: &'static str,
    /// How to fetch
    pub fetch: Fetch,
    /// What comes back
    pub payload: Payload,
}

impl EndpointTask {
    /// Create a task
    pub const fn new(name: &'static str, fetch: Fetch, payload: Payload) -> Self {
        Self {
            name,
            fetch,
            payload,
        }
    }
}

/// Named group of tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Display name
    pub name: &'static str,
    /// Tasks in run order
    pub tasks: Vec<EndpointTask>,
}

/// Every endpoint the exporter collects, grouped into sections
pub fn default_catalog(api: &ApiEndpoints) -> Vec<Section> {
    use Payload::{Biomarkers, Collection, Profile, Record};

    vec![
        Section {
            name: "Account",
            tasks: vec![
                EndpointTask::new(PROFILE_KEY, Fetch::Get(api.profile), Profile),
                EndpointTask::new("settings", Fetch::Get(api.settings), Record),
                EndpointTask::new("notifications", Fetch::Get(api.notifications), Collection),
                EndpointTask::new("payment_cards", Fetch::Get(api.payment_cards), Collection),
                EndpointTask::new("referral_codes", Fetch::Get(api.referral_codes), Collection),
            ],
        },
        Section {
            name: "Lab results",
            tasks: vec![
                EndpointTask::new(
                    REQUISITIONS_KEY,
                    Fetch::Requisitions(api.requisitions),
                    Collection,
                ),
                EndpointTask::new("lab_results", Fetch::Get(api.lab_results), Collection),
                EndpointTask::new("results_report", Fetch::Get(api.results_report), Record),
                EndpointTask::new(
                    "pending_schedules",
                    Fetch::Get(api.pending_schedules),
                    Collection,
                ),
            ],
        },
        Section {
            name: "Biomarkers",
            tasks: vec![
                EndpointTask::new(BIOMARKERS_KEY, Fetch::Get(api.biomarkers), Biomarkers),
                EndpointTask::new("categories", Fetch::Get(api.categories), Collection),
                EndpointTask::new("biomarker_data", Fetch::Get(api.biomarker_data), Record),
            ],
        },
        Section {
            name: "Health insights",
            tasks: vec![
                EndpointTask::new("recommendations", Fetch::Get(api.recommendations), Collection),
                EndpointTask::new("biological_age", Fetch::Get(api.biological_age), Record),
                EndpointTask::new("bmi", Fetch::Bmi(api.bmi), Record),
                EndpointTask::new("story", Fetch::Get(api.story), Record),
                EndpointTask::new("smart_add_ons", Fetch::Get(api.smart_add_ons), Collection),
                EndpointTask::new("notes", Fetch::Get(api.notes), Collection),
            ],
        },
    ]
}

/// Every key a run over `catalog` produces, in output order
pub fn declared_keys(catalog: &[Section]) -> Vec<&'static str> {
    catalog
        .iter()
        .flat_map(|section| section.tasks.iter().map(|task| task.name))
        .chain(std::iter::once(BIOMARKER_DETAILS_KEY))
        .collect()
}
