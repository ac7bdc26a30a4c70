//! Integration tests for the pacer
//!
//! These tests use wiremock to create mock HTTP servers and drive real
//! requests through the scheduler and the reqwest transport.

use request_pacer::config::{Config, SchedulerConfig, TransportConfig};
use request_pacer::{Body, BodyEncoding, ErrorCode, Pacer, PacerError, RequestSpec};
use reqwest::cookie::CookieStore;
use reqwest::StatusCode;
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with short pauses
fn create_test_config(max_slots: u32) -> Config {
    Config {
        scheduler: SchedulerConfig {
            max_slots,
            sleep_every: 0,
            sleep_for: 5, // Very short for testing
            max_per_minute: 0,
            max_retries: 3,
            transient_codes: ErrorCode::default_transient(),
        },
        transport: TransportConfig {
            user_agent: "TestPacer/1.0".to_string(),
            timeout: 5_000,
            connect_timeout: 1_000,
            https_only: false,
            headers: BTreeMap::from([("accept-language".to_string(), "en".to_string())]),
        },
    }
}

/// Returns a URL on a local port with nothing listening
async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to read address");
    drop(listener);
    format!("http://{}/gone", addr)
}

#[tokio::test]
async fn test_session_cookie_carried_to_later_requests() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // Login sets the session cookie
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_string("user=ada&pass=secret"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "session=abc123; Path=/")
                .set_body_string("welcome"),
        )
        .mount(&mock_server)
        .await;

    // Account page only answers with the cookie present
    Mock::given(method("GET"))
        .and(path("/account"))
        .and(header("cookie", "session=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("balance: 42"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/account"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let pacer = Pacer::new(create_test_config(2)).expect("Failed to create pacer");

    let login = RequestSpec::post(&format!("{}/login", base_url))
        .unwrap()
        .form(&[("user", "ada"), ("pass", "secret")])
        .immediate();
    let response = pacer.dispatch(login).await.expect("Login failed");
    assert_eq!(response.status, StatusCode::OK);

    let account = RequestSpec::get(&format!("{}/account", base_url)).unwrap();
    let response = pacer.dispatch(account).await.expect("Account fetch failed");
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.text(), Some("balance: 42"));

    // The jar is inspectable by collaborators
    let jar = pacer.cookie_jar().expect("HTTP transport has a jar");
    let url = url::Url::parse(&base_url).unwrap();
    let cookies = jar.cookies(&url).expect("Cookie stored");
    assert_eq!(cookies.to_str().unwrap(), "session=abc123");
}

#[tokio::test]
async fn test_user_agent_and_default_headers_sent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/whoami"))
        .and(header("user-agent", "TestPacer/1.0"))
        .and(header("accept-language", "en"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let pacer = Pacer::new(create_test_config(1)).expect("Failed to create pacer");
    let request = RequestSpec::get(&format!("{}/whoami", mock_server.uri())).unwrap();
    let response = pacer.dispatch(request).await.expect("Request failed");

    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_retry_if_on_503_then_success() {
    let mock_server = MockServer::start().await;

    // First two calls are unavailable, then the real page
    Mock::given(method("GET"))
        .and(path("/report"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/report"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ready"))
        .mount(&mock_server)
        .await;

    let pacer = Pacer::new(create_test_config(2)).expect("Failed to create pacer");
    let request = RequestSpec::get(&format!("{}/report", mock_server.uri()))
        .unwrap()
        .retry_if(|r| r.status == StatusCode::SERVICE_UNAVAILABLE);

    let started = Instant::now();
    let response = pacer.dispatch(request).await.expect("Request failed");

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.text(), Some("ready"));

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 3);

    // Backoff of 5ms * 1 * 2 then 5ms * 2 * 2
    assert!(started.elapsed() >= Duration::from_millis(30));
    assert_eq!(pacer.stats().retried, 2);
}

#[tokio::test]
async fn test_client_errors_are_returned_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let pacer = Pacer::new(create_test_config(2)).expect("Failed to create pacer");
    let request = RequestSpec::get(&format!("{}/missing", mock_server.uri())).unwrap();
    let response = pacer.dispatch(request).await.expect("Request failed");

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(!response.is_success());
}

#[tokio::test]
async fn test_bytes_encoding_keeps_raw_body() {
    let mock_server = MockServer::start().await;
    let payload = vec![0x50, 0x4b, 0x03, 0x04, 0xff];

    Mock::given(method("GET"))
        .and(path("/export.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .mount(&mock_server)
        .await;

    let pacer = Pacer::new(create_test_config(1)).expect("Failed to create pacer");
    let request = RequestSpec::get(&format!("{}/export.zip", mock_server.uri()))
        .unwrap()
        .encoding(BodyEncoding::Bytes);
    let response = pacer.dispatch(request).await.expect("Request failed");

    assert_eq!(response.body, Body::Bytes(payload));
}

#[tokio::test]
async fn test_connection_refused_without_retry() {
    let url = closed_port_url().await;
    let pacer = Pacer::new(create_test_config(1)).expect("Failed to create pacer");

    let request = RequestSpec::get(&url).unwrap().no_retry();
    let error = pacer.dispatch(request).await.unwrap_err();

    assert_eq!(error.code(), Some(ErrorCode::ConnectionRefused));
    assert_eq!(error.url(), Some(url.as_str()));
    assert!(matches!(error, PacerError::Transport { attempts: 1, .. }));
    assert!(error.to_string().contains("ECONNREFUSED"));
}

#[tokio::test]
async fn test_connection_refused_exhausts_retries() {
    let url = closed_port_url().await;
    let pacer = Pacer::new(create_test_config(1)).expect("Failed to create pacer");

    let error = pacer
        .dispatch(RequestSpec::get(&url).unwrap())
        .await
        .unwrap_err();

    assert_eq!(error.code(), Some(ErrorCode::ConnectionRefused));
    assert!(matches!(error, PacerError::Transport { attempts: 4, .. }));
    assert_eq!(pacer.stats().dispatched, 4);
}

#[tokio::test]
async fn test_codes_outside_transient_set_fail_fast() {
    let url = closed_port_url().await;
    let mut config = create_test_config(1);
    config.scheduler.transient_codes = HashSet::from([ErrorCode::Timeout]);
    let pacer = Pacer::new(config).expect("Failed to create pacer");

    let error = pacer
        .dispatch(RequestSpec::get(&url).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(error, PacerError::Transport { attempts: 1, .. }));
}

#[tokio::test]
async fn test_many_requests_all_complete() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(20)))
        .expect(10)
        .mount(&mock_server)
        .await;

    let pacer = Pacer::new(create_test_config(3)).expect("Failed to create pacer");
    let pending: Vec<_> = (0..10)
        .map(|i| {
            let request =
                RequestSpec::get(&format!("{}/item/{}", mock_server.uri(), i)).unwrap();
            pacer.dispatch(request)
        })
        .collect();

    for request in pending {
        let response = request.await.expect("Request failed");
        assert_eq!(response.status, StatusCode::OK);
    }

    let stats = pacer.stats();
    assert_eq!(stats.dispatched, 10);
    assert_eq!(stats.retried, 0);
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let mut config = create_test_config(1);
    config.scheduler.max_slots = 0;

    assert!(matches!(
        Pacer::new(config).err(),
        Some(PacerError::Config(_))
    ));
}
