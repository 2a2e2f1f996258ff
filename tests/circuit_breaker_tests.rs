//! Circuit breaker behavior observed through the client, against wiremock.

use breakwater::{CircuitBreakerConfig, CircuitState, Client, Error, ErrorKind};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn guarded_client(base_url: impl AsRef<str>, breaker: CircuitBreakerConfig) -> Client {
    Client::builder()
        .base_url(base_url)
        .unwrap()
        .circuit_breaker(breaker)
        .build()
        .unwrap()
}

fn tripping_breaker() -> CircuitBreakerConfig {
    CircuitBreakerConfig::enabled()
        .error_percent_threshold(50)
        .request_volume_threshold(10)
        .sleep_window(Duration::from_millis(100))
        .count_server_errors(true)
}

#[tokio::test]
async fn test_breaker_opens_and_stops_contacting_upstream() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let client = guarded_client(mock_server.uri(), tripping_breaker());

    for _ in 0..10 {
        let response = client.get("/flaky").await.unwrap();
        assert_eq!(response.status.as_u16(), 500);
    }

    let result = client.get("/flaky").await;
    match result {
        Err(Error::CircuitOpen { ref name }) => {
            assert_eq!(name, client.circuit_breaker().unwrap().name());
        }
        _ => panic!("Expected CircuitOpen, got {:?}", result),
    }

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 10);
}

#[tokio::test]
async fn test_half_open_trial_success_closes_breaker() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(10)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let client = guarded_client(mock_server.uri(), tripping_breaker());
    for _ in 0..10 {
        client.get("/recovering").await.unwrap();
    }

    let breaker = client.circuit_breaker().unwrap();
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(client.get("/recovering").await.unwrap_err().is_admission_rejected());

    tokio::time::sleep(Duration::from_millis(150)).await;

    let response = client.get("/recovering").await.unwrap();
    assert!(response.is_ok());
    assert_eq!(breaker.state(), CircuitState::Closed);

    assert!(client.get("/recovering").await.unwrap().is_ok());
}

#[tokio::test]
async fn test_failed_trial_reopens_breaker() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let client = guarded_client(mock_server.uri(), tripping_breaker());
    for _ in 0..10 {
        client.get("/down").await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(150)).await;

    let trial = client.get("/down").await.unwrap();
    assert_eq!(trial.status.as_u16(), 503);

    let breaker = client.circuit_breaker().unwrap();
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(matches!(
        client.get("/down").await,
        Err(Error::CircuitOpen { .. })
    ));
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 11);
}

#[tokio::test]
async fn test_server_errors_do_not_count_by_default() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let breaker = CircuitBreakerConfig::enabled()
        .error_percent_threshold(50)
        .request_volume_threshold(10);
    let client = guarded_client(mock_server.uri(), breaker);

    for _ in 0..20 {
        assert!(client.get("/").await.unwrap().is_not_ok());
    }

    let snapshot = client.circuit_breaker().unwrap().snapshot();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.requests, 20);
    assert_eq!(snapshot.failures, 0);
}

#[tokio::test]
async fn test_transport_errors_trip_breaker() {
    let breaker = CircuitBreakerConfig::enabled()
        .error_percent_threshold(50)
        .request_volume_threshold(3)
        .sleep_window(Duration::from_secs(60));
    let client = guarded_client("http://127.0.0.1:1", breaker);

    for _ in 0..3 {
        let err = client.get("/").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    let err = client.get("/").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AdmissionRejected);
}

#[tokio::test]
async fn test_breaker_timeout_counts_as_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&mock_server)
        .await;

    let breaker = CircuitBreakerConfig::enabled().timeout(Duration::from_millis(50));
    let client = guarded_client(mock_server.uri(), breaker);

    let result = client.get("/slow").await;
    assert!(matches!(result, Err(Error::Timeout)), "got {:?}", result);

    let snapshot = client.circuit_breaker().unwrap().snapshot();
    assert_eq!(snapshot.requests, 1);
    assert_eq!(snapshot.failures, 1);
    assert_eq!(snapshot.in_flight, 0);
}

#[tokio::test]
async fn test_concurrency_cap_rejects_without_queueing() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .mount(&mock_server)
        .await;

    let breaker = CircuitBreakerConfig::enabled().max_concurrent_requests(1);
    let client = guarded_client(mock_server.uri(), breaker);

    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.get("/slow").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = client.get("/slow").await;
    match result {
        Err(Error::ConcurrencyLimitExceeded { limit, .. }) => assert_eq!(limit, 1),
        _ => panic!("Expected ConcurrencyLimitExceeded, got {:?}", result),
    }

    assert!(slow.await.unwrap().unwrap().is_ok());
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_disabled_breaker_never_rejects() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let breaker = tripping_breaker();
    let client = Client::builder()
        .base_url(mock_server.uri())
        .unwrap()
        .circuit_breaker(CircuitBreakerConfig {
            enabled: false,
            ..breaker
        })
        .build()
        .unwrap();

    assert!(client.circuit_breaker().is_none());
    for _ in 0..30 {
        assert_eq!(client.get("/").await.unwrap().status.as_u16(), 500);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_are_all_recorded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/fail"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let breaker = CircuitBreakerConfig::enabled()
        .request_volume_threshold(u32::MAX)
        .max_concurrent_requests(100)
        .rolling_window(Duration::from_secs(600))
        .count_server_errors(true);
    let client = guarded_client(mock_server.uri(), breaker);

    let tasks: Vec<_> = (0..40)
        .map(|i| {
            let client = client.clone();
            let target = if i % 2 == 0 { "/ok" } else { "/fail" };
            tokio::spawn(async move { client.get(target).await })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let snapshot = client.circuit_breaker().unwrap().snapshot();
    assert_eq!(snapshot.requests, 40);
    assert_eq!(snapshot.failures, 20);
    assert_eq!(snapshot.in_flight, 0);
    assert_eq!(snapshot.state, CircuitState::Closed);
}

#[tokio::test]
async fn test_clients_do_not_share_breakers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let tripped = guarded_client(mock_server.uri(), tripping_breaker());
    let healthy = guarded_client(mock_server.uri(), tripping_breaker());

    for _ in 0..10 {
        tripped.get("/").await.unwrap();
    }

    assert!(tripped.get("/").await.is_err());
    assert!(healthy.get("/").await.is_ok());
}
