//! Batch round-trip: encode a multipart request, decode the multipart
//! response and correlate the parts.

use std::sync::Arc;

use odata_wire::{
    BatchRequest, BatchResponse, EntityKey, ODataRequest, ODataVersion, RequestExecutor,
    ReqwestTransport,
};

use crate::mock_server::MockServerFixture;

fn batch_response_body() -> String {
    [
        "--batch_r1",
        "Content-Type: application/http",
        "",
        "HTTP/1.1 200 OK",
        "Content-Type: application/json",
        "",
        r#"{"value":[{"UserName":"a"}]}"#,
        "--batch_r1",
        "Content-Type: multipart/mixed; boundary=changeset_r2",
        "",
        "--changeset_r2",
        "Content-Type: application/http",
        "Content-ID: 1",
        "",
        "HTTP/1.1 201 Created",
        "Content-Type: application/json",
        "",
        r#"{"UserName":"new"}"#,
        "--changeset_r2",
        "Content-Type: application/http",
        "Content-ID: 2",
        "",
        "HTTP/1.1 204 No Content",
        "",
        "--changeset_r2--",
        "--batch_r1--",
        "",
    ]
    .join("\r\n")
}

#[tokio::test]
async fn test_batch_round_trip() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", "/svc/$batch")
        .match_header(
            "content-type",
            mockito::Matcher::Regex("multipart/mixed;boundary=batch_.*".to_string()),
        )
        .match_body(mockito::Matcher::Regex(
            "GET /svc/People HTTP/1.1".to_string(),
        ))
        .with_status(202)
        .with_header("content-type", "multipart/mixed; boundary=batch_r1")
        .with_body(batch_response_body())
        .create_async()
        .await;

    let executor = RequestExecutor::with_transport(
        fixture.base_url.clone(),
        Arc::new(ReqwestTransport::new().unwrap()),
    )
    .without_csrf();

    let mut batch = BatchRequest::new(ODataVersion::V4, "/svc");
    let read_handle = batch
        .add_read(ODataRequest::read(ODataVersion::V4, "/svc", "People"))
        .unwrap();
    batch.begin_changeset().unwrap();
    let create_handle = batch
        .add_change(ODataRequest::create(
            ODataVersion::V4,
            "/svc",
            "People",
            serde_json::json!({"UserName": "new"}),
        ))
        .unwrap();
    let delete_handle = batch
        .add_change(ODataRequest::delete(
            ODataVersion::V4,
            "/svc",
            "People",
            EntityKey::single("old"),
        ))
        .unwrap();
    batch.end_changeset().unwrap();

    let decoded: BatchResponse = executor.execute_batch(&batch).await.unwrap();
    assert_eq!(decoded.len(), 2);

    let mut read_response = decoded.response_for(read_handle).unwrap();
    assert_eq!(read_response.status(), 200);
    assert_eq!(read_response.as_list().await.unwrap().len(), 1);

    let mut create_response = decoded.response_for(create_handle).unwrap();
    assert_eq!(create_response.status(), 201);
    assert_eq!(
        create_response.as_value().await.unwrap()["UserName"],
        "new"
    );

    let delete_response = decoded.response_for(delete_handle).unwrap();
    assert_eq!(delete_response.status(), 204);

    mock.assert_async().await;
}
