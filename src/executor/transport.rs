//! HTTP transport collaborator.
//!
//! The executor talks to the network through the [`HttpTransport`] trait so
//! tests can substitute a scripted transport. [`ReqwestTransport`] is the
//! production implementation, a thin wrapper over a tuned [`reqwest::Client`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use thiserror::Error;

use crate::BoxStream;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 32;

/// Failures below the protocol layer, before any OData semantics apply.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No connection to the host could be established.
    #[error("connection could not be established: {0}")]
    Connect(#[source] reqwest::Error),

    /// The request did not complete within the configured timeout.
    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    /// No connection was available in the pool. Raised by transports that
    /// bound concurrent connections.
    #[error(
        "connection pool exhausted; execute requests in a bounded scope so \
         connections are returned promptly, or increase the pool size"
    )]
    PoolExhausted,

    /// Any other client-side HTTP failure.
    #[error(transparent)]
    Http(reqwest::Error),

    /// Failure specific to a non-reqwest transport implementation.
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout(error)
        } else if error.is_connect() {
            TransportError::Connect(error)
        } else {
            TransportError::Http(error)
        }
    }
}

/// A fully assembled HTTP request, ready for the wire.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: String,
    /// Absolute URL; the path and query portions are already encoded.
    pub url: String,
    /// Ordered header multimap.
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl TransportRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }
}

/// Body handle of a [`RawResponse`]: either buffered up front or streamed.
pub enum RawBody {
    Buffered(Bytes),
    Stream(BoxStream<'static, Result<Bytes, TransportError>>),
}

impl std::fmt::Debug for RawBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawBody::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            RawBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// An HTTP response as the transport saw it, before OData interpretation.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    /// Headers in arrival order; repeated names stay repeated.
    pub headers: Vec<(String, String)>,
    pub body: RawBody,
}

impl RawResponse {
    /// A response with an in-memory body, convenient for scripted
    /// transports in tests.
    pub fn buffered(
        status: u16,
        headers: Vec<(String, String)>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            status,
            headers,
            body: RawBody::Buffered(body.into()),
        }
    }
}

/// The executor's view of an HTTP client.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError>;
}

/// Production transport over a pooled [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .pool_idle_timeout(DEFAULT_POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(DEFAULT_POOL_MAX_IDLE_PER_HOST)
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an externally configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| TransportError::Other(format!("invalid HTTP method {:?}", request.method)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed();

        Ok(RawResponse {
            status,
            headers,
            body: RawBody::Stream(stream),
        })
    }
}
