//! Typed payloads exchanged with the health-data API
//!
//! Endpoints whose schema is only partially known keep everything they return:
//! typed structs carry the fields the exporter reads and a flattened map for the
//! rest, and [`EndpointData::Raw`] stores bodies that are not modeled at all.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Live authentication state for the single account of a run.
///
/// Created by login, mutated in place by token refresh, never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Bearer token attached to API requests
    pub access_token: String,
    /// Token exchanged for a new access token at the identity provider
    pub refresh_token: String,
    /// Lifetime of `access_token` in seconds
    pub expires_in_secs: i64,
    /// Account identifier reported at login
    pub subject_id: String,
    /// Account email reported at login
    pub email: String,
    /// When `access_token` was issued (Unix milliseconds)
    pub issued_at_ms: i64,
}

impl Session {
    /// Seconds elapsed since the access token was issued
    pub fn age_secs(&self, now_ms: i64) -> i64 {
        (now_ms - self.issued_at_ms) / 1000
    }

    /// Whether the token is inside the refresh window at `now_ms`
    pub fn needs_refresh(&self, now_ms: i64, buffer_secs: i64) -> bool {
        self.age_secs(now_ms) > self.expires_in_secs - buffer_secs
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_in_secs", &self.expires_in_secs)
            .field("subject_id", &self.subject_id)
            .field("email", &self.email)
            .field("issued_at_ms", &self.issued_at_ms)
            .finish()
    }
}

/// Token lifetime as sent by the identity provider: a number or a numeric string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ExpiresIn {
    /// `"expiresIn": 3600`
    Number(i64),
    /// `"expiresIn": "3600"`
    Text(String),
}

impl ExpiresIn {
    /// Lifetime in seconds, if it parses
    pub fn seconds(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Body returned by the login endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Access token
    #[serde(alias = "accessToken", alias = "id_token")]
    pub id_token: Option<String>,
    /// Refresh token
    #[serde(alias = "refresh_token")]
    pub refresh_token: Option<String>,
    /// Access token lifetime
    #[serde(alias = "expires_in")]
    pub expires_in: Option<ExpiresIn>,
    /// Account identifier
    #[serde(alias = "userId", alias = "user_id")]
    pub local_id: Option<String>,
    /// Account email
    pub email: Option<String>,
}

/// Body returned by the identity provider's token endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshResponse {
    /// New ID token (preferred as the bearer token)
    #[serde(alias = "idToken")]
    pub id_token: Option<String>,
    /// New access token, used when no ID token is present
    #[serde(alias = "accessToken")]
    pub access_token: Option<String>,
    /// Rotated refresh token, if the provider issued one
    #[serde(alias = "refreshToken")]
    pub refresh_token: Option<String>,
    /// New lifetime
    #[serde(alias = "expiresIn")]
    pub expires_in: Option<ExpiresIn>,
}

impl RefreshResponse {
    /// Bearer token to use from now on
    pub fn bearer(&self) -> Option<&str> {
        self.id_token
            .as_deref()
            .or(self.access_token.as_deref())
            .filter(|t| !t.is_empty())
    }
}

/// Biological sex used to pick sex-scoped biomarker content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sex {
    /// Male
    Male,
    /// Female
    Female,
    /// Content valid regardless of sex
    All,
}

impl Sex {
    /// Parse the API's spelling, ignoring case
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Some(Self::Male),
            "female" | "f" => Some(Self::Female),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    /// Canonical spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
            Self::All => "All",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier that the API sends either as a string or as a number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Identifier {
    /// Numeric id
    Number(i64),
    /// String id
    Text(String),
}

impl Default for Identifier {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl<'de> Deserialize<'de> for Identifier {
    // Accepts null, floats and stray types instead of failing the whole record.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Self::Number(i),
                (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                    Self::Number(f as i64)
                }
                _ => Self::Text(n.to_string()),
            },
            Value::String(s) => Self::Text(s),
            Value::Bool(b) => Self::Text(b.to_string()),
            _ => Self::default(),
        })
    }
}

impl Identifier {
    /// Whether the id carries no value
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(s) if s.is_empty())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Account profile
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserProfile {
    /// Recorded biological sex
    #[serde(
        rename = "biologicalSex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub biological_sex: Option<String>,
    /// Every other field, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    /// Parsed biological sex, falling back to a plain `sex` field
    pub fn sex(&self) -> Option<Sex> {
        self.biological_sex
            .as_deref()
            .and_then(Sex::parse)
            .or_else(|| self.extra.get("sex").and_then(Value::as_str).and_then(Sex::parse))
    }
}

/// One sex-scoped detail variant of a biomarker
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SexDetail {
    /// Detail record identifier
    #[serde(default)]
    pub id: Identifier,
    /// Sex this variant applies to ("Male", "Female" or "All")
    #[serde(default, deserialize_with = "lenient_string")]
    pub sex: String,
    /// Every other field, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Biomarker definition from the biomarker catalog
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Biomarker {
    /// Biomarker identifier
    #[serde(default)]
    pub id: Identifier,
    /// Display name
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    /// Sex-scoped detail variants
    #[serde(rename = "sexDetails", default, deserialize_with = "lenient_details")]
    pub sex_details: Vec<SexDetail>,
    /// Every other field, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Biomarker {
    /// Decode one catalog record without ever failing.
    ///
    /// Records that are not objects come back as an empty definition, which
    /// still produces a placeholder detail entry.
    pub fn from_value_lenient(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

/// Null becomes an empty string, other scalars their JSON text
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Anything but an array becomes an empty list; entries that are not objects are dropped
fn lenient_details<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<SexDetail>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// Detail content for one biomarker, resolved for the account's sex
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiomarkerDetail {
    /// Id of the biomarker this detail belongs to
    pub biomarker_id: String,
    /// Name of the biomarker this detail belongs to
    pub biomarker_name: String,
    /// Resolved detail variant id, empty when none matched
    pub detail_id: String,
    /// Sex of the resolved variant, empty when none matched
    pub sex: String,
    /// One-line summary
    pub one_line_description: String,
    /// Why the biomarker matters
    pub why_it_matters: String,
    /// Long description
    pub description: String,
    /// Full record as returned by the API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,
}

impl BiomarkerDetail {
    /// Placeholder used when no detail could be resolved or fetched
    pub fn placeholder(biomarker: &Biomarker) -> Self {
        Self {
            biomarker_id: biomarker.id.to_string(),
            biomarker_name: biomarker.name.clone(),
            ..Self::default()
        }
    }

    /// Build from a fetched detail record
    pub fn from_record(biomarker: &Biomarker, variant: &SexDetail, record: Value) -> Self {
        let text = |key: &str| {
            record
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            biomarker_id: biomarker.id.to_string(),
            biomarker_name: biomarker.name.clone(),
            detail_id: variant.id.to_string(),
            sex: variant.sex.clone(),
            one_line_description: text("oneLineDescription"),
            why_it_matters: text("whyItMatters"),
            description: text("description"),
            record: Some(record),
        }
    }
}

/// Value stored for one endpoint in the aggregate result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EndpointData {
    /// Account profile
    Profile(UserProfile),
    /// Biomarker catalog
    Biomarkers(Vec<Biomarker>),
    /// Per-biomarker detail records
    BiomarkerDetails(Vec<BiomarkerDetail>),
    /// Collection endpoint with unmodeled items
    List(Vec<Value>),
    /// Unmodeled body, stored as returned
    Raw(Value),
    /// Scalar endpoint that returned nothing (serialized as `null`)
    Empty,
}

impl EndpointData {
    /// Whether the value carries data worth its own export file
    pub fn is_populated(&self) -> bool {
        match self {
            Self::Profile(_) => true,
            Self::Biomarkers(items) => !items.is_empty(),
            Self::BiomarkerDetails(items) => !items.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Raw(Value::Null) => false,
            Self::Raw(Value::Array(items)) => !items.is_empty(),
            Self::Raw(_) => true,
            Self::Empty => false,
        }
    }

    /// Number of items for collections, 1 for populated scalars, 0 otherwise
    pub fn len(&self) -> usize {
        match self {
            Self::Biomarkers(items) => items.len(),
            Self::BiomarkerDetails(items) => items.len(),
            Self::List(items) => items.len(),
            Self::Raw(Value::Array(items)) => items.len(),
            other if other.is_populated() => 1,
            _ => 0,
        }
    }

    /// Whether [`len`](Self::len) is zero
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Endpoint name → fetched value, in catalog declaration order.
///
/// Every declared task owns a key even when its fetch failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateResult {
    entries: Vec<(String, EndpointData)>,
}

impl AggregateResult {
    /// Empty result
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value for `name`, keeping its original position
    pub fn insert(&mut self, name: impl Into<String>, data: EndpointData) {
        let name = name.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = data,
            None => self.entries.push((name, data)),
        }
    }

    /// Value for `name`
    pub fn get(&self, name: &str) -> Option<&EndpointData> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, data)| data)
    }

    /// Whether `name` has an entry
    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EndpointData)> {
        self.entries.iter().map(|(key, data)| (key.as_str(), data))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for AggregateResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, data) in &self.entries {
            map.serialize_entry(key, data)?;
        }
        map.end()
    }
}

/// Everything one export run writes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    /// When the export was taken
    pub timestamp: DateTime<Utc>,
    /// Email of the exported account
    pub account_email: String,
    /// Per-endpoint data
    pub data: AggregateResult,
}

impl ExportBundle {
    /// Bundle stamped with the current time
    pub fn new(account_email: impl Into<String>, data: AggregateResult) -> Self {
        Self {
            timestamp: Utc::now(),
            account_email: account_email.into(),
            data,
        }
    }
}
