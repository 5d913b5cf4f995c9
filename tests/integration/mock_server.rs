//! Test doubles: a mockito-backed HTTP server fixture and a scripted
//! in-process transport.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use mockito::{Server, ServerGuard};
use odata_wire::executor::{
    HttpTransport, RawResponse, TransportError, TransportRequest,
};

/// Test fixture that manages a mock server.
pub struct MockServerFixture {
    pub server: ServerGuard,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self { server, base_url }
    }
}

/// A transport answering from a scripted queue while recording every
/// request it saw.
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn script(&self, response: Result<RawResponse, TransportError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn script_json(&self, status: u16, body: &str) {
        self.script(Ok(RawResponse::buffered(
            status,
            vec![("content-type".to_string(), "application/json".to_string())],
            body.to_string(),
        )));
    }

    pub fn recorded_requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Other("no scripted response left".into())))
    }
}

/// A scripted response carrying arbitrary headers.
pub fn response_with_headers(
    status: u16,
    headers: Vec<(&str, &str)>,
    body: &str,
) -> RawResponse {
    RawResponse::buffered(
        status,
        headers
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
        body.to_string(),
    )
}
