//! End-to-end execution: CSRF handling and response health classification.

use std::sync::Arc;

use odata_wire::{
    EntityKey, Error, ODataRequest, ODataVersion, RequestExecutor, ReqwestTransport,
};

use crate::mock_server::{response_with_headers, MockServerFixture, MockTransport};

fn executor_for(fixture: &MockServerFixture) -> RequestExecutor {
    RequestExecutor::with_transport(
        fixture.base_url.clone(),
        Arc::new(ReqwestTransport::new().unwrap()),
    )
}

#[tokio::test]
async fn test_read_parses_v4_collection() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("GET", "/svc/People?$top=2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"value":[{"UserName":"a"},{"UserName":"b"}]}"#)
        .create_async()
        .await;

    let executor = executor_for(&fixture);
    let request = ODataRequest::read(ODataVersion::V4, "/svc", "People").with_encoded_query("$top=2");
    let mut response = executor.execute(&request).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.as_list().await.unwrap().len(), 2);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_create_fetches_csrf_token_first() {
    let mut fixture = MockServerFixture::new().await;
    let head = fixture
        .server
        .mock("HEAD", "/svc")
        .match_header("x-csrf-token", "Fetch")
        .with_status(200)
        .with_header("x-csrf-token", "token123")
        .with_header("set-cookie", "SAP_SESSIONID=abc; Path=/")
        .create_async()
        .await;
    let post = fixture
        .server
        .mock("POST", "/svc/People")
        .match_header("x-csrf-token", "token123")
        .match_header("cookie", "SAP_SESSIONID=abc")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"UserName":"new"}"#)
        .create_async()
        .await;

    let executor = executor_for(&fixture);
    let request = ODataRequest::create(
        ODataVersion::V4,
        "/svc",
        "People",
        serde_json::json!({"UserName": "new"}),
    );
    let response = executor.execute(&request).await.unwrap();
    assert_eq!(response.status(), 201);
    head.assert_async().await;
    post.assert_async().await;
}

#[tokio::test]
async fn test_disabled_csrf_skips_preflight() {
    let mut fixture = MockServerFixture::new().await;
    let head = fixture
        .server
        .mock("HEAD", "/svc")
        .expect(0)
        .create_async()
        .await;
    let post = fixture
        .server
        .mock("POST", "/svc/People")
        .with_status(201)
        .with_body("{}")
        .create_async()
        .await;

    let executor = executor_for(&fixture).without_csrf();
    let request = ODataRequest::create(ODataVersion::V4, "/svc", "People", serde_json::json!({}));
    executor.execute(&request).await.unwrap();
    head.assert_async().await;
    post.assert_async().await;
}

#[tokio::test]
async fn test_existing_token_header_skips_preflight() {
    let mut fixture = MockServerFixture::new().await;
    let head = fixture
        .server
        .mock("HEAD", "/svc")
        .expect(0)
        .create_async()
        .await;
    let post = fixture
        .server
        .mock("POST", "/svc/People")
        .match_header("x-csrf-token", "prefetched")
        .with_status(201)
        .with_body("{}")
        .create_async()
        .await;

    let executor = executor_for(&fixture);
    let request =
        ODataRequest::create(ODataVersion::V4, "/svc", "People", serde_json::json!({}))
            .header("X-CSRF-Token", "prefetched");
    executor.execute(&request).await.unwrap();
    head.assert_async().await;
    post.assert_async().await;
}

#[tokio::test]
async fn test_reads_never_trigger_preflight() {
    let mut fixture = MockServerFixture::new().await;
    let head = fixture
        .server
        .mock("HEAD", "/svc")
        .expect(0)
        .create_async()
        .await;
    let get = fixture
        .server
        .mock("GET", "/svc/People")
        .with_status(200)
        .with_body(r#"{"value":[]}"#)
        .create_async()
        .await;

    let executor = executor_for(&fixture);
    let request = ODataRequest::read(ODataVersion::V4, "/svc", "People");
    executor.execute(&request).await.unwrap();
    head.assert_async().await;
    get.assert_async().await;
}

#[tokio::test]
async fn test_service_error_document_is_classified() {
    let mut fixture = MockServerFixture::new().await;
    fixture
        .server
        .mock("GET", "/svc/People")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":{"code":"err123","message":"Something went wrong"}}"#)
        .create_async()
        .await;

    let executor = executor_for(&fixture);
    let request = ODataRequest::read(ODataVersion::V4, "/svc", "People");
    let error = executor.execute(&request).await.unwrap_err();
    match error {
        Error::Service(service) => {
            assert_eq!(service.code, "err123");
            assert_eq!(service.status, 400);
        }
        other => panic!("expected a service error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unparseable_error_body_keeps_cause_and_status() {
    let mut fixture = MockServerFixture::new().await;
    fixture
        .server
        .mock("GET", "/svc/People")
        .with_status(502)
        .with_body("<html>Bad Gateway</html>")
        .create_async()
        .await;

    let executor = executor_for(&fixture);
    let request = ODataRequest::read(ODataVersion::V4, "/svc", "People");
    let error = executor.execute(&request).await.unwrap_err();
    match &error {
        Error::Deserialization(inner) => {
            assert_eq!(inner.status, Some(502));
            assert!(inner.source.is_some());
        }
        other => panic!("expected a deserialization error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_not_found_is_branchable_by_status() {
    let mut fixture = MockServerFixture::new().await;
    fixture
        .server
        .mock("GET", "/svc/People('missing')")
        .with_status(404)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":{"code":"not_found","message":"no such entity"}}"#)
        .create_async()
        .await;

    let executor = executor_for(&fixture);
    let request = ODataRequest::read_by_key(
        ODataVersion::V4,
        "/svc",
        "People",
        EntityKey::single("missing"),
    );
    let error = executor.execute(&request).await.unwrap_err();
    assert_eq!(error.status_code(), Some(404));
}

#[tokio::test]
async fn test_expired_token_retried_once() {
    let transport = Arc::new(MockTransport::new());
    // pre-flight, rejected main request, refresh, retried main request
    transport.script(Ok(response_with_headers(
        200,
        vec![("x-csrf-token", "stale")],
        "",
    )));
    transport.script(Ok(response_with_headers(
        403,
        vec![("x-csrf-token", "Required")],
        "",
    )));
    transport.script(Ok(response_with_headers(
        200,
        vec![("x-csrf-token", "fresh")],
        "",
    )));
    transport.script_json(201, r#"{"UserName":"new"}"#);

    let executor = RequestExecutor::with_transport("https://host", transport.clone());
    let request = ODataRequest::create(
        ODataVersion::V4,
        "/svc",
        "People",
        serde_json::json!({"UserName": "new"}),
    );
    let response = executor.execute(&request).await.unwrap();
    assert_eq!(response.status(), 201);

    let requests = transport.recorded_requests();
    assert_eq!(requests.len(), 4);
    let retried = &requests[3];
    assert!(retried
        .headers
        .iter()
        .any(|(name, value)| name == "X-CSRF-Token" && value == "fresh"));
}

#[tokio::test]
async fn test_preflight_failure_does_not_abort_main_request() {
    let transport = Arc::new(MockTransport::new());
    transport.script(Err(odata_wire::TransportError::Other(
        "HEAD not supported".into(),
    )));
    transport.script_json(201, "{}");

    let executor = RequestExecutor::with_transport("https://host", transport.clone());
    let request = ODataRequest::create(ODataVersion::V4, "/svc", "People", serde_json::json!({}));
    let response = executor.execute(&request).await.unwrap();
    assert_eq!(response.status(), 201);
    assert_eq!(transport.recorded_requests().len(), 2);
}
