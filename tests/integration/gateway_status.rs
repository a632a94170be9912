//! Integration tests for gateway status classification and retries

use std::time::{Duration, Instant};

use health_data_export::client::{
    build_http_client, ApiGateway, ApiRequest, ClientError, SessionManager, DEFAULT_ENDPOINTS,
};
use health_data_export::config::ExportConfig;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "idToken": "t1",
            "refreshToken": "r1",
            "expiresIn": 3600
        })))
        .mount(server)
        .await;
}

fn config_for(server: &MockServer, retry_attempts: u32) -> ExportConfig {
    ExportConfig {
        base_url: format!("{}/", server.uri()),
        retry_attempts,
        retry_base_delay_ms: 1,
        rate_limit_ms: 0,
        ..ExportConfig::default()
    }
}

async fn logged_in_with(server: &MockServer, config: &ExportConfig) -> ApiGateway {
    mount_login(server).await;
    let mut gateway = ApiGateway::new(config, &DEFAULT_ENDPOINTS).unwrap();
    gateway.login("a@b.com", "pw").await.unwrap();
    gateway
}

async fn logged_in_gateway(server: &MockServer, retry_attempts: u32) -> ApiGateway {
    logged_in_with(server, &config_for(server, retry_attempts)).await
}

#[tokio::test]
async fn test_success_attaches_headers_and_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/requisitions"))
        .and(query_param("pending", "false"))
        .and(header("authorization", "Bearer t1"))
        .and(header("x-app-version", env!("CARGO_PKG_VERSION")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "r1"}])))
        .expect(1)
        .mount(&server)
        .await;

    let mut gateway = logged_in_gateway(&server, 3).await;
    let request = ApiRequest::get("/requisitions").with_query("pending", "false");
    let value = gateway.request(&request).await.unwrap();
    assert_eq!(value, Some(json!([{"id": "r1"}])));
}

#[tokio::test]
async fn test_not_found_is_soft_null() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notes"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let mut gateway = logged_in_gateway(&server, 3).await;
    assert_eq!(gateway.request(&ApiRequest::get("/notes")).await.unwrap(), None);
}

#[tokio::test]
async fn test_bad_request_is_soft_null() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/story"))
        .respond_with(ResponseTemplate::new(400).set_body_string("malformed"))
        .expect(1)
        .mount(&server)
        .await;

    let mut gateway = logged_in_gateway(&server, 3).await;
    assert_eq!(gateway.request(&ApiRequest::get("/story")).await.unwrap(), None);
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/settings"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let mut gateway = logged_in_gateway(&server, 3).await;
    let err = gateway
        .request(&ApiRequest::get("/user/settings"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::AuthExpired { ref endpoint } if endpoint == "/user/settings"));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_server_error_retried_then_raised() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/results"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let mut gateway = logged_in_gateway(&server, 3).await;
    let err = gateway.request(&ApiRequest::get("/results")).await.unwrap_err();
    assert!(matches!(err, ClientError::Server { status: 503, .. }));
}

#[tokio::test]
async fn test_rate_limited_retried_then_raised() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/categories"))
        .respond_with(ResponseTemplate::new(429))
        .expect(2)
        .mount(&server)
        .await;

    let mut gateway = logged_in_gateway(&server, 2).await;
    let err = gateway
        .request(&ApiRequest::get("/categories"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::RateLimited { .. }));
}

#[tokio::test]
async fn test_transient_server_error_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/biomarkers"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/biomarkers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let mut gateway = logged_in_gateway(&server, 3).await;
    let value = gateway.request(&ApiRequest::get("/biomarkers")).await.unwrap();
    assert_eq!(value, Some(json!([])));
}

#[tokio::test]
async fn test_invalid_json_is_soft_null() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let mut gateway = logged_in_gateway(&server, 3).await;
    assert_eq!(gateway.request(&ApiRequest::get("/user")).await.unwrap(), None);
}

#[tokio::test]
async fn test_rate_limit_delays_every_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(3)
        .mount(&server)
        .await;

    let config = ExportConfig {
        rate_limit_ms: 120,
        ..config_for(&server, 1)
    };
    let mut gateway = logged_in_with(&server, &config).await;

    // Wall clock on purpose: a paused clock would also fast-forward the HTTP client's timers
    for _ in 0..3 {
        let started = Instant::now();
        let value = gateway.request(&ApiRequest::get("/notes")).await.unwrap();
        assert_eq!(value, Some(json!([])));
        assert!(started.elapsed() >= Duration::from_millis(120));
    }
}

#[tokio::test]
async fn test_unreachable_host_is_soft_null_after_retries() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    let login_config = ExportConfig {
        retry_base_delay_ms: 20,
        ..config_for(&server, 3)
    };

    let closed_port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let api_config = ExportConfig {
        base_url: format!("http://127.0.0.1:{closed_port}"),
        ..login_config.clone()
    };

    let http = build_http_client(&login_config).unwrap();
    let mut session = SessionManager::new(http.clone(), &login_config, DEFAULT_ENDPOINTS.login);
    session.login("a@b.com", "pw").await.unwrap();
    let mut gateway = ApiGateway::with_session(http, &api_config, session);

    let started = Instant::now();
    let value = gateway.request(&ApiRequest::get("/notes")).await.unwrap();
    assert_eq!(value, None);
    // Three attempts wait 40ms then 80ms between them
    assert!(started.elapsed() >= Duration::from_millis(120));
    assert!(gateway.session().is_some());
}
