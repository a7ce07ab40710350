use sesam_exporter::metrics::catalog::API_UP;
use sesam_exporter::{ApiClient, Error, Fetch, MemorySink, MetricKind};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(host: &str, sink: Arc<MemorySink>) -> ApiClient {
    ApiClient::new(host, "secret", sink)
        .unwrap()
        .with_retry_policy(3, Duration::from_millis(10))
}

fn statuses(sink: &MemorySink) -> Vec<String> {
    sink.named(API_UP)
        .iter()
        .map(|r| r.label("status").unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn sends_auth_and_accept_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/datasets"))
        .and(query_param("include-internal-datasets", "false"))
        .and(header("Authorization", "bearer secret"))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let body = client(&server.uri(), sink.clone())
        .fetch("datasets", &[("include-internal-datasets", "false")])
        .await
        .unwrap();

    assert_eq!(body, b"[]");
    let recorded = sink.named(API_UP);
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].kind, MetricKind::Counter);
    assert_eq!(recorded[0].value, 1.0);
    assert_eq!(recorded[0].label("path"), Some("datasets"));
    assert_eq!(recorded[0].label("status"), Some("200"));
}

#[tokio::test]
async fn succeeds_on_third_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/pipes"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/pipes"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"_id": "p"}]"#))
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let body = client(&server.uri(), sink.clone())
        .fetch("pipes", &[])
        .await
        .unwrap();

    assert_eq!(body, br#"[{"_id": "p"}]"#);
    assert_eq!(statuses(&sink), vec!["503", "503", "200"]);
}

#[tokio::test]
async fn gives_up_after_three_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/pipes"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let err = client(&server.uri(), sink.clone())
        .fetch("pipes", &[])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(statuses(&sink), vec!["500", "500", "500"]);
}

#[tokio::test]
async fn transport_errors_are_labeled_error() {
    // Nothing listens on the discard port.
    let sink = Arc::new(MemorySink::new());
    let err = client("http://127.0.0.1:9", sink.clone())
        .fetch("pipes", &[])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RetriesExhausted { .. }));
    assert_eq!(statuses(&sink), vec!["error", "error", "error"]);
}

#[tokio::test]
async fn absolute_paths_hit_the_root() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/pipes"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    client(&server.uri(), sink)
        .fetch("/api/pipes", &[])
        .await
        .unwrap();
}
