//! Integration tests for the aggregator against scripted sources

use std::time::Duration;

use async_trait::async_trait;
use health_data_export::client::{ApiRequest, ApiSource, ClientError, ClientResult, DEFAULT_ENDPOINTS};
use health_data_export::export::catalog::{declared_keys, BIOMARKER_DETAILS_KEY};
use health_data_export::export::{default_catalog, Aggregator, AggregatorOptions};
use health_data_export::model::EndpointData;
use serde_json::{json, Value};

type Script = Box<dyn FnMut(&ApiRequest) -> ClientResult<Option<Value>> + Send>;

/// Source answering through a closure and recording every request
struct ScriptedSource {
    script: Script,
    requests: Vec<ApiRequest>,
}

impl ScriptedSource {
    fn new(script: impl FnMut(&ApiRequest) -> ClientResult<Option<Value>> + Send + 'static) -> Self {
        Self {
            script: Box::new(script),
            requests: Vec::new(),
        }
    }

    fn paths(&self) -> Vec<&str> {
        self.requests.iter().map(|r| r.path.as_str()).collect()
    }
}

#[async_trait]
impl ApiSource for ScriptedSource {
    async fn fetch(&mut self, request: &ApiRequest) -> ClientResult<Option<Value>> {
        self.requests.push(request.clone());
        (self.script)(request)
    }
}

fn options(max_biomarker_details: usize, pause_ms: u64) -> AggregatorOptions {
    AggregatorOptions {
        max_biomarker_details,
        biomarker_pause: Duration::from_millis(pause_ms),
    }
}

#[tokio::test]
async fn test_every_key_present_when_every_fetch_fails() {
    let source = ScriptedSource::new(|request| {
        Err(ClientError::Server {
            endpoint: request.path.clone(),
            status: 500,
        })
    });
    let mut aggregator = Aggregator::new(source, &DEFAULT_ENDPOINTS, options(0, 0));
    let result = aggregator.fetch_all().await.unwrap();

    let expected = declared_keys(&default_catalog(&DEFAULT_ENDPOINTS));
    let keys: Vec<&str> = result.keys().collect();
    assert_eq!(keys, expected);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["profile"], Value::Null);
    assert_eq!(json["settings"], Value::Null);
    assert_eq!(json["notifications"], json!([]));
    assert_eq!(json["requisitions"], json!([]));
    assert_eq!(json["biomarkers"], json!([]));
    assert_eq!(json[BIOMARKER_DETAILS_KEY], json!([]));
}

#[tokio::test]
async fn test_unauthorized_endpoint_does_not_stop_later_tasks() {
    let source = ScriptedSource::new(|request| match request.path.as_str() {
        "/user/settings" => Err(ClientError::AuthExpired {
            endpoint: request.path.clone(),
        }),
        "/notifications" => Ok(Some(json!([{"id": "n1"}]))),
        "/notes" => Ok(Some(json!([{"id": "note"}]))),
        _ => Ok(None),
    });
    let mut aggregator = Aggregator::new(source, &DEFAULT_ENDPOINTS, options(0, 0));
    let result = aggregator.fetch_all().await.unwrap();

    assert_eq!(result.get("settings"), Some(&EndpointData::Empty));
    assert_eq!(
        result.get("notifications"),
        Some(&EndpointData::List(vec![json!({"id": "n1"})]))
    );
    assert_eq!(result.get("notes").map(EndpointData::len), Some(1));

    let source = aggregator.into_source();
    let paths = source.paths();
    let settings = paths.iter().position(|p| *p == "/user/settings").unwrap();
    let notes = paths.iter().position(|p| *p == "/notes").unwrap();
    assert!(settings < notes);
}

#[tokio::test]
async fn test_refresh_failure_aborts_run() {
    let mut calls = 0;
    let source = ScriptedSource::new(move |_| {
        calls += 1;
        if calls == 3 {
            Err(ClientError::TokenRefresh("identity provider answered 400".into()))
        } else {
            Ok(None)
        }
    });
    let mut aggregator = Aggregator::new(source, &DEFAULT_ENDPOINTS, options(0, 0));
    let err = aggregator.fetch_all().await.unwrap_err();
    assert!(err.to_string().contains("token refresh failed"));
    assert_eq!(aggregator.source().requests.len(), 3);
}

fn biomarker_script(request: &ApiRequest) -> ClientResult<Option<Value>> {
    match request.path.as_str() {
        "/user" => Ok(Some(json!({"biologicalSex": "female", "firstName": "Ada"}))),
        "/biomarkers" => Ok(Some(json!([
            {
                "id": "b-exact",
                "name": "Ferritin",
                "sexDetails": [
                    {"id": "d-all", "sex": "All"},
                    {"id": "d-female", "sex": "Female"}
                ]
            },
            {
                "id": "b-all",
                "name": "Vitamin D",
                "sexDetails": [{"id": "d-all-2", "sex": "All"}]
            },
            {
                "id": 42,
                "name": "PSA",
                "sexDetails": [{"id": "d-male", "sex": "Male"}]
            }
        ]))),
        "/biomarker-details/d-female" => Ok(Some(json!({
            "oneLineDescription": "Iron stores",
            "whyItMatters": "Energy",
            "description": "Ferritin stores iron."
        }))),
        "/biomarker-details/d-all-2" => Ok(Some(json!({"oneLineDescription": "Bone health"}))),
        _ => Ok(None),
    }
}

#[tokio::test]
async fn test_biomarker_details_follow_sex_and_keep_cardinality() {
    let source = ScriptedSource::new(biomarker_script);
    let mut aggregator = Aggregator::new(source, &DEFAULT_ENDPOINTS, options(0, 0));
    let result = aggregator.fetch_all().await.unwrap();

    let details = match result.get(BIOMARKER_DETAILS_KEY) {
        Some(EndpointData::BiomarkerDetails(details)) => details.clone(),
        other => panic!("unexpected details: {other:?}"),
    };
    assert_eq!(details.len(), 3);

    assert_eq!(details[0].detail_id, "d-female");
    assert_eq!(details[0].one_line_description, "Iron stores");
    assert_eq!(details[1].detail_id, "d-all-2");
    assert_eq!(details[1].why_it_matters, "");

    assert_eq!(details[2].biomarker_id, "42");
    assert_eq!(details[2].biomarker_name, "PSA");
    let placeholder = serde_json::to_value(&details[2]).unwrap();
    assert_eq!(placeholder["detailId"], "");
    assert_eq!(placeholder["oneLineDescription"], "");
    assert_eq!(placeholder["whyItMatters"], "");
    assert_eq!(placeholder["description"], "");

    let source = aggregator.into_source();
    let detail_paths: Vec<_> = source
        .paths()
        .into_iter()
        .filter(|p| p.starts_with("/biomarker-details"))
        .collect();
    assert_eq!(
        detail_paths,
        vec!["/biomarker-details/d-female", "/biomarker-details/d-all-2"]
    );
}

#[tokio::test]
async fn test_no_biomarkers_skips_detail_phase() {
    let source = ScriptedSource::new(|request| match request.path.as_str() {
        "/biomarkers" => Ok(Some(json!([]))),
        _ => Ok(None),
    });
    let mut aggregator = Aggregator::new(source, &DEFAULT_ENDPOINTS, options(0, 0));
    let result = aggregator.fetch_all().await.unwrap();

    assert_eq!(
        result.get(BIOMARKER_DETAILS_KEY),
        Some(&EndpointData::BiomarkerDetails(vec![]))
    );
    let source = aggregator.into_source();
    assert!(!source.paths().iter().any(|p| p.starts_with("/biomarker-details")));
}

#[tokio::test]
async fn test_malformed_biomarker_records_still_get_details() {
    let source = ScriptedSource::new(|request| match request.path.as_str() {
        "/user" => Ok(Some(json!({"biologicalSex": "Female"}))),
        "/biomarkers" => Ok(Some(json!([
            {"id": "b1", "name": "Ferritin", "sexDetails": [{"id": "d1", "sex": "Female"}]},
            {"id": "b2", "name": null, "sexDetails": [{"id": "d2", "sex": "All"}]},
            {"id": "b3", "name": "Zinc", "sexDetails": null}
        ]))),
        "/biomarker-details/d1" => Ok(Some(json!({"oneLineDescription": "Iron stores"}))),
        "/biomarker-details/d2" => Ok(Some(json!({"oneLineDescription": "Unnamed"}))),
        _ => Ok(None),
    });
    let mut aggregator = Aggregator::new(source, &DEFAULT_ENDPOINTS, options(0, 0));
    let result = aggregator.fetch_all().await.unwrap();

    assert_eq!(result.get("biomarkers").map(EndpointData::len), Some(3));
    let Some(EndpointData::BiomarkerDetails(details)) = result.get(BIOMARKER_DETAILS_KEY) else {
        panic!("missing biomarker details");
    };
    assert_eq!(details.len(), 3);
    assert_eq!(details[0].one_line_description, "Iron stores");
    assert_eq!(details[1].biomarker_id, "b2");
    assert_eq!(details[1].biomarker_name, "");
    assert_eq!(details[1].detail_id, "d2");
    assert_eq!(details[2].biomarker_name, "Zinc");
    assert_eq!(details[2].detail_id, "");

    let source = aggregator.into_source();
    let detail_requests = source
        .paths()
        .into_iter()
        .filter(|p| p.starts_with("/biomarker-details"))
        .count();
    assert_eq!(detail_requests, 2);
}

#[tokio::test]
async fn test_non_object_biomarker_entry_becomes_placeholder() {
    let source = ScriptedSource::new(|request| match request.path.as_str() {
        "/biomarkers" => Ok(Some(json!([
            "unexpected",
            {"id": "b1", "name": "Iron", "sexDetails": [{"id": "d1", "sex": "All"}]}
        ]))),
        _ => Ok(None),
    });
    let mut aggregator = Aggregator::new(source, &DEFAULT_ENDPOINTS, options(0, 0));
    let result = aggregator.fetch_all().await.unwrap();

    // The catalog is kept as returned
    assert!(matches!(result.get("biomarkers"), Some(EndpointData::List(items)) if items.len() == 2));
    let Some(EndpointData::BiomarkerDetails(details)) = result.get(BIOMARKER_DETAILS_KEY) else {
        panic!("missing biomarker details");
    };
    assert_eq!(details.len(), 2);
    assert_eq!(details[0].biomarker_id, "");
    assert_eq!(details[1].biomarker_id, "b1");
    assert_eq!(details[1].detail_id, "d1");
}

#[tokio::test(start_paused = true)]
async fn test_detail_limit_and_pause() {
    let source = ScriptedSource::new(biomarker_script);
    let mut aggregator = Aggregator::new(source, &DEFAULT_ENDPOINTS, options(2, 250));

    let started = tokio::time::Instant::now();
    let result = aggregator.fetch_all().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result.get(BIOMARKER_DETAILS_KEY).map(EndpointData::len), Some(2));
    // One pause between the two capped items
    assert_eq!(elapsed, Duration::from_millis(250));
}

#[tokio::test]
async fn test_requisition_halves_are_concatenated() {
    let source = ScriptedSource::new(|request| {
        if request.path != "/requisitions" {
            return Ok(None);
        }
        let pending = request
            .query
            .iter()
            .find(|(k, _)| k == "pending")
            .map(|(_, v)| v.as_str());
        match pending {
            Some("true") => Ok(Some(json!([{"id": "p1"}]))),
            Some("false") => Ok(Some(json!([{"id": "c1"}, {"id": "c2"}]))),
            _ => Ok(None),
        }
    });
    let mut aggregator = Aggregator::new(source, &DEFAULT_ENDPOINTS, options(0, 0));
    let result = aggregator.fetch_all().await.unwrap();

    assert_eq!(
        result.get("requisitions"),
        Some(&EndpointData::List(vec![
            json!({"id": "p1"}),
            json!({"id": "c1"}),
            json!({"id": "c2"})
        ]))
    );

    let source = aggregator.into_source();
    let bmi = source
        .requests
        .iter()
        .find(|r| r.path == "/biological-calculations/bmi")
        .unwrap();
    assert_eq!(bmi.query, vec![("requisitionId".to_string(), "c1".to_string())]);
}

#[tokio::test]
async fn test_one_requisition_half_failing_keeps_the_other() {
    let source = ScriptedSource::new(|request| {
        if request.path != "/requisitions" {
            return Ok(None);
        }
        if request.query.iter().any(|(_, v)| v == "true") {
            Err(ClientError::Server {
                endpoint: request.path.clone(),
                status: 502,
            })
        } else {
            Ok(Some(json!([{"id": "c1"}])))
        }
    });
    let mut aggregator = Aggregator::new(source, &DEFAULT_ENDPOINTS, options(0, 0));
    let result = aggregator.fetch_all().await.unwrap();
    assert_eq!(result.get("requisitions").map(EndpointData::len), Some(1));
}
