use super::*;
use crate::config::{HttpConfig, RetryPolicy};
use crate::progress;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Executor wired to a mock server, with fast retries for test runtime.
fn executor_for(server: &MockServer) -> RequestExecutor {
    let mut config = HttpConfig::default();
    config.retry = RetryPolicy {
        max_retries: config.retry.max_retries,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
        jitter: false,
    };
    executor_with(server, config)
}

fn executor_with(server: &MockServer, mut config: HttpConfig) -> RequestExecutor {
    config.base_url = server.uri();
    RequestExecutor::new(config).unwrap()
}

#[tokio::test]
async fn get_decodes_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/documents/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "7",
            "name": "q3-report.pdf"
        })))
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let body = executor.execute(Request::get("/documents/7")).await.unwrap();

    assert_eq!(body.json().unwrap()["name"], "q3-report.pdf");
}

#[tokio::test]
async fn execute_json_decodes_into_typed_payload() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Document {
        id: String,
        pages: u32,
    }

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/documents/9"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "9", "pages": 12})),
        )
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let document: Document = executor
        .execute_json(Request::get("/documents/9"))
        .await
        .unwrap();

    assert_eq!(
        document,
        Document {
            id: "9".into(),
            pages: 12
        }
    );
}

#[tokio::test]
async fn execute_json_mismatch_is_a_decode_error() {
    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Expected {
        count: u32,
    }

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": "twelve"})))
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let result: Result<Expected> = executor.execute_json(Request::get("/stats")).await;

    assert!(matches!(result, Err(Error::Decode(_))));
}

#[tokio::test]
async fn default_headers_merge_with_per_call_overrides() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyses"))
        .and(header("x-api-key", "key-123"))
        .and(header("x-trace", "trace-9"))
        .and(body_json(json!({"document_id": "7"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"queued": true})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = HttpConfig::default();
    config
        .default_headers
        .insert("X-Api-Key".into(), "key-123".into());

    let executor = executor_with(&server, config);
    let body = executor
        .execute(
            Request::post("/analyses")
                .json(json!({"document_id": "7"}))
                .header("X-Trace", "trace-9"),
        )
        .await
        .unwrap();

    assert_eq!(body.json().unwrap()["queued"], true);
}

#[tokio::test]
async fn json_error_body_message_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"message": "unsupported format"})),
        )
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let result = executor
        .execute(Request::post("/documents").json(json!({})).retries(0))
        .await;

    match result {
        Err(Error::Http { status, message }) => {
            assert_eq!(status, 422);
            assert_eq!(message, "unsupported format");
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn non_json_error_body_surfaces_raw_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let result = executor.execute(Request::get("/status").retries(0)).await;

    match result {
        Err(Error::Http { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "upstream exploded");
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_error_body_falls_back_to_status_reason() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let result = executor.execute(Request::get("/status").retries(0)).await;

    match result {
        Err(Error::Http { status, message }) => {
            assert_eq!(status, 503);
            assert_eq!(message, "Service Unavailable");
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn transient_server_errors_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let body = executor
        .execute(Request::get("/flaky").retries(3))
        .await
        .unwrap();

    assert_eq!(body.json().unwrap()["ok"], true);
}

#[tokio::test]
async fn attempts_never_exceed_retries_plus_one() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let result = executor.execute(Request::get("/always-broken").retries(2)).await;

    assert!(matches!(result, Err(Error::Http { status: 500, .. })));
    // Mock expectation (exactly 3 requests) is verified when `server` drops
}

#[tokio::test]
async fn timeout_settles_within_tolerance() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let start = Instant::now();
    let result = executor
        .execute(
            Request::get("/slow")
                .timeout(Duration::from_millis(100))
                .retries(0),
        )
        .await;
    let elapsed = start.elapsed();

    assert!(matches!(result, Err(Error::Timeout(_))));
    assert!(
        elapsed < Duration::from_millis(600),
        "timeout should fire near 100ms, took {elapsed:?}"
    );
}

#[tokio::test]
async fn cancel_in_flight_yields_cancelled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let pending = executor.dispatch(Request::get("/slow")).await;
    let id = pending.id();
    assert_eq!(executor.live_operations().await, 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(executor.cancel(id).await, "id should be live");

    let result = pending.outcome().await;
    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(executor.live_operations().await, 0);

    // Cancelling a settled id is a no-op
    assert!(!executor.cancel(id).await);
}

#[tokio::test]
async fn cancelled_request_is_never_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut config = HttpConfig::default();
    config.retry.base_delay = Duration::from_millis(300);
    let executor = executor_with(&server, config);

    let pending = executor
        .dispatch(Request::get("/broken").retries(5))
        .await;

    // Let the first attempt fail, then cancel during the backoff sleep
    tokio::time::sleep(Duration::from_millis(100)).await;
    executor.cancel(pending.id()).await;

    let result = pending.outcome().await;
    assert!(matches!(result, Err(Error::Cancelled)));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1, "no retry may follow a cancellation");
}

#[tokio::test]
async fn cancel_all_empties_registry_and_cancels_every_handle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let first = executor.dispatch(Request::get("/slow/1")).await;
    let second = executor.dispatch(Request::get("/slow/2")).await;
    assert_ne!(first.id(), second.id(), "live ids are never shared");
    assert_eq!(executor.live_operations().await, 2);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(executor.cancel_all().await, 2);
    assert_eq!(executor.live_operations().await, 0);

    assert!(matches!(first.outcome().await, Err(Error::Cancelled)));
    assert!(matches!(second.outcome().await, Err(Error::Cancelled)));
}

#[tokio::test]
async fn no_content_settles_as_empty_success() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let body = executor
        .execute(Request::delete("/documents/7"))
        .await
        .unwrap();

    assert!(body.is_empty());
}

#[tokio::test]
async fn unparseable_success_body_settles_as_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let body = executor.execute(Request::get("/legacy")).await.unwrap();

    assert!(body.is_empty());
}

#[tokio::test]
async fn multipart_content_type_comes_from_the_transport() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/documents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "42"})))
        .mount(&server)
        .await;

    // A configured default Content-Type must not leak into multipart calls
    let mut config = HttpConfig::default();
    config
        .default_headers
        .insert("Content-Type".into(), "application/json".into());

    let executor = executor_with(&server, config);
    let spec = MultipartSpec::new()
        .text("kind", "contract")
        .file("file", "scan.pdf", b"%PDF-1.7 content".to_vec());
    let body = executor.upload("/documents", spec).await.unwrap();
    assert_eq!(body.json().unwrap()["id"], "42");

    let requests = server.received_requests().await.unwrap();
    let content_type = requests[0]
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(
        content_type.starts_with("multipart/form-data"),
        "transport must own the Content-Type, got {content_type:?}"
    );
    assert!(
        content_type.contains("boundary="),
        "boundary must be computed by the transport, got {content_type:?}"
    );
}

#[tokio::test]
async fn progress_reports_cumulative_percentages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 64 * 1024]))
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let (sender, stream) = progress::channel();
    let body = executor
        .execute(Request::get("/export").progress(sender))
        .await
        .unwrap();
    // 64 KiB of 'x' is not JSON, so the call itself settles empty
    assert!(body.is_empty());

    let values: Vec<f32> = stream.collect().await;
    assert!(!values.is_empty(), "progress should have been reported");
    assert!(
        values.windows(2).all(|w| w[0] <= w[1]),
        "percentages must be cumulative: {values:?}"
    );
    let last = values.last().copied().unwrap();
    assert!(
        (last - 100.0).abs() < 0.5,
        "final report should reach 100%, got {last}"
    );
}
