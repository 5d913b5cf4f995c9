//! Pull-based pagination over the V2 `__next` and V4 `@odata.nextLink`
//! conventions.

use std::sync::Arc;

use futures::StreamExt;
use odata_wire::{ODataRequest, ODataVersion, RequestExecutor};

use crate::mock_server::MockTransport;

fn v2_page(ids: std::ops::Range<u32>, next: Option<&str>) -> String {
    let items = ids
        .map(|id| format!(r#"{{"Id":{id}}}"#))
        .collect::<Vec<_>>()
        .join(",");
    match next {
        Some(link) => {
            format!(r#"{{"d":{{"results":[{items}],"__count":"91","__next":"{link}"}}}}"#)
        }
        None => format!(r#"{{"d":{{"results":[{items}],"__count":"91"}}}}"#),
    }
}

fn script_five_pages(transport: &MockTransport) {
    transport.script_json(200, &v2_page(0..20, Some("/svc/People?$skiptoken=20")));
    transport.script_json(200, &v2_page(20..40, Some("/svc/People?$skiptoken=40")));
    transport.script_json(200, &v2_page(40..60, Some("/svc/People?$skiptoken=60")));
    transport.script_json(200, &v2_page(60..80, Some("/svc/People?$skiptoken=80")));
    transport.script_json(200, &v2_page(80..91, None));
}

#[tokio::test]
async fn test_five_pages_pull_one_request_each() {
    let transport = Arc::new(MockTransport::new());
    script_five_pages(&transport);

    let executor =
        RequestExecutor::with_transport("https://host", transport.clone()).without_csrf();
    let request = ODataRequest::read(ODataVersion::V2, "/svc", "People")
        .header("X-Correlation-Id", "trace-1");

    let mut paginator = executor.execute_paginated(&request).await.unwrap();
    // the first page is already fetched; nothing else is prefetched
    assert_eq!(transport.recorded_requests().len(), 1);

    let mut items = 0;
    let mut pages = 0;
    while let Some(mut page) = paginator.next_page().await.unwrap() {
        assert_eq!(page.inline_count().await.unwrap(), 91);
        items += page.as_list().await.unwrap().len();
        pages += 1;
        assert_eq!(transport.recorded_requests().len(), pages.max(1));
    }

    assert_eq!(pages, 5);
    assert_eq!(items, 91);

    let requests = transport.recorded_requests();
    // one initial request plus four follow-ups
    assert_eq!(requests.len(), 5);
    for request in &requests {
        assert_eq!(request.method, "GET");
        assert!(request
            .headers
            .iter()
            .any(|(name, value)| name == "X-Correlation-Id" && value == "trace-1"));
    }
    assert!(requests[1].url.contains("$skiptoken=20"));
    assert!(requests[4].url.contains("$skiptoken=80"));
}

#[tokio::test]
async fn test_stream_adapter_yields_all_pages() {
    let transport = Arc::new(MockTransport::new());
    script_five_pages(&transport);

    let executor =
        RequestExecutor::with_transport("https://host", transport.clone()).without_csrf();
    let request = ODataRequest::read(ODataVersion::V2, "/svc", "People");

    let paginator = executor.execute_paginated(&request).await.unwrap();
    let pages: Vec<_> = paginator.into_stream().collect().await;
    assert_eq!(pages.len(), 5);
    assert!(pages.iter().all(|page| page.is_ok()));
}

#[tokio::test]
async fn test_duplicate_base_parameters_stripped_from_next_link() {
    let transport = Arc::new(MockTransport::new());
    transport.script_json(
        200,
        &v2_page(0..2, Some("/svc/People?$inlinecount=allpages&$skiptoken=2")),
    );
    transport.script_json(200, &v2_page(2..4, None));

    let executor =
        RequestExecutor::with_transport("https://host", transport.clone()).without_csrf();
    let request = ODataRequest::read(ODataVersion::V2, "/svc", "People")
        .with_encoded_query("$inlinecount=allpages");

    let mut paginator = executor.execute_paginated(&request).await.unwrap();
    while paginator.next_page().await.unwrap().is_some() {}

    let requests = transport.recorded_requests();
    assert_eq!(requests.len(), 2);
    let follow_up = &requests[1].url;
    assert_eq!(follow_up.matches("$inlinecount").count(), 1);
    assert!(follow_up.contains("$skiptoken=2"));
}

#[tokio::test]
async fn test_absolute_next_link_is_followed() {
    let transport = Arc::new(MockTransport::new());
    transport.script_json(
        200,
        &v2_page(0..2, Some("https://host/svc/People?$skiptoken=2")),
    );
    transport.script_json(200, &v2_page(2..4, None));

    let executor =
        RequestExecutor::with_transport("https://host", transport.clone()).without_csrf();
    let request = ODataRequest::read(ODataVersion::V2, "/svc", "People");

    let mut paginator = executor.execute_paginated(&request).await.unwrap();
    while paginator.next_page().await.unwrap().is_some() {}

    let requests = transport.recorded_requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].url.starts_with("https://host/svc/People"));
}

#[tokio::test]
async fn test_error_surfaces_on_the_pull_that_caused_it() {
    let transport = Arc::new(MockTransport::new());
    transport.script_json(200, &v2_page(0..2, Some("/svc/People?$skiptoken=2")));
    transport.script_json(
        500,
        r#"{"error":{"code":"boom","message":{"lang":"en","value":"page lost"}}}"#,
    );

    let executor =
        RequestExecutor::with_transport("https://host", transport.clone()).without_csrf();
    let request = ODataRequest::read(ODataVersion::V2, "/svc", "People");

    let mut paginator = executor.execute_paginated(&request).await.unwrap();
    assert!(paginator.next_page().await.unwrap().is_some());
    let error = paginator.next_page().await.unwrap_err();
    assert_eq!(error.status_code(), Some(500));
    // the failed link is consumed, the paginator is exhausted
    assert!(paginator.next_page().await.unwrap().is_none());
}

#[tokio::test]
async fn test_v4_next_link_convention() {
    let transport = Arc::new(MockTransport::new());
    transport.script_json(
        200,
        r#"{"value":[{"Id":1}],"@odata.nextLink":"People?$skiptoken=1"}"#,
    );
    transport.script_json(200, r#"{"value":[{"Id":2}]}"#);

    let executor =
        RequestExecutor::with_transport("https://host", transport.clone()).without_csrf();
    let request = ODataRequest::read(ODataVersion::V4, "/svc", "People");

    let mut paginator = executor.execute_paginated(&request).await.unwrap();
    let mut items = 0;
    while let Some(mut page) = paginator.next_page().await.unwrap() {
        items += page.as_list().await.unwrap().len();
    }
    assert_eq!(items, 2);

    let requests = transport.recorded_requests();
    assert_eq!(requests.len(), 2);
    // service-relative link resolved against the request path's parent
    assert!(requests[1].url.starts_with("https://host/svc/People?"));
}
