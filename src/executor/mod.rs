//! Request execution: transport abstraction, CSRF token handling and
//! response health classification.

mod csrf;
mod transport;

pub use transport::{
    HttpTransport, RawBody, RawResponse, ReqwestTransport, TransportError, TransportRequest,
};

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Error;
use crate::request::{BatchRequest, ODataRequest};
use crate::response::{BatchResponse, ODataResponse};
use crate::uri::EncodeStrategy;

/// Executes [`ODataRequest`]s and [`BatchRequest`]s against a service host.
///
/// The executor owns the destination (`base_url`, scheme and authority only)
/// and a shared [`HttpTransport`]. For modifying requests it performs the
/// CSRF token pre-flight unless disabled or a token header is already
/// present, and it retries once when the service rejects an expired token.
/// Every response is health-classified before it is returned.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    csrf_enabled: bool,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_url", &self.base_url)
            .field("csrf_enabled", &self.csrf_enabled)
            .finish()
    }
}

impl RequestExecutor {
    /// An executor over the default [`ReqwestTransport`].
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        Ok(Self::with_transport(
            base_url,
            Arc::new(ReqwestTransport::new()?),
        ))
    }

    /// An executor over a caller-supplied transport.
    pub fn with_transport(base_url: impl Into<String>, transport: Arc<dyn HttpTransport>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            transport,
            base_url,
            csrf_enabled: true,
        }
    }

    /// Disables the CSRF token pre-flight for all requests.
    pub fn without_csrf(mut self) -> Self {
        self.csrf_enabled = false;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn absolute(&self, relative_uri: &str) -> String {
        format!("{}{relative_uri}", self.base_url)
    }

    fn wants_csrf(&self, mutating: bool, headers: &[(String, String)]) -> bool {
        if !self.csrf_enabled || !mutating {
            if mutating {
                debug!("CSRF token pre-flight disabled, skipping");
            }
            return false;
        }
        let already_present = headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case(csrf::X_CSRF_TOKEN));
        if already_present {
            debug!("request already carries a CSRF token, skipping pre-flight");
        }
        !already_present
    }

    fn token_rejected(response: &RawResponse) -> bool {
        response.status == 403
            && response.headers.iter().any(|(name, value)| {
                name.eq_ignore_ascii_case(csrf::X_CSRF_TOKEN)
                    && value.eq_ignore_ascii_case(csrf::CSRF_REQUIRED)
            })
    }

    /// Sends a prepared transport request, fetching a CSRF token first when
    /// `mutating` requires one, and retrying once on token expiry.
    async fn send_with_csrf(
        &self,
        request: TransportRequest,
        service_path: &str,
        mutating: bool,
    ) -> crate::Result<RawResponse> {
        let mut csrf_failure = None;
        let mut prepared = request.clone();
        if self.wants_csrf(mutating, &request.headers) {
            match csrf::fetch_token(self.transport.as_ref(), &self.base_url, service_path).await {
                Ok(token) => token.apply(&mut prepared),
                Err(failure) => {
                    warn!(%failure, "continuing without a CSRF token");
                    csrf_failure = Some(failure);
                }
            }
        }

        let outcome = self.transport.send(prepared).await;
        let response = match outcome {
            Ok(response) => response,
            Err(error) => {
                // surface the earlier pre-flight failure alongside the real one
                let error = match csrf_failure {
                    Some(failure) => {
                        TransportError::Other(format!("{error}; note: {failure}"))
                    }
                    None => error,
                };
                return Err(Error::Transport(error));
            }
        };

        if mutating && self.csrf_enabled && Self::token_rejected(&response) {
            debug!("CSRF token rejected, fetching a fresh one and retrying once");
            match csrf::fetch_token(self.transport.as_ref(), &self.base_url, service_path).await {
                Ok(token) => {
                    let mut retry = request;
                    token.apply(&mut retry);
                    return self.transport.send(retry).await.map_err(Error::Transport);
                }
                Err(failure) => {
                    warn!(%failure, "token refresh failed, returning the rejected response");
                }
            }
        }
        Ok(response)
    }

    /// Executes a single request and classifies the response.
    pub async fn execute(&self, request: &ODataRequest) -> crate::Result<ODataResponse> {
        let relative = request.relative_uri(EncodeStrategy::Regular)?;
        debug!(method = request.method(), uri = %relative, "executing request");

        let mut transport_request =
            TransportRequest::new(request.method(), self.absolute(&relative));
        transport_request.headers = request.wire_headers();
        transport_request.body = request.payload().map(|payload| payload.to_string());

        let raw = self
            .send_with_csrf(
                transport_request,
                request.service_path(),
                request.kind().is_mutating(),
            )
            .await?;
        ODataResponse::new(request.version(), raw).healthy().await
    }

    /// Executes a `$batch` request and decodes its multipart response.
    pub async fn execute_batch(&self, batch: &BatchRequest) -> crate::Result<BatchResponse> {
        let relative = batch.relative_uri()?;
        debug!(uri = %relative, "executing batch request");

        let mut transport_request = TransportRequest::new("POST", self.absolute(&relative));
        transport_request.headers = batch.wire_headers();
        transport_request.body = Some(batch.body()?);

        let raw = self
            .send_with_csrf(transport_request, batch.service_path(), true)
            .await?;
        let response = ODataResponse::new(batch.version(), raw).healthy().await?;
        BatchResponse::from_response(response).await
    }

    /// Sends an already-assembled GET, classifying the response under the
    /// given protocol version. Used for next-link follow-ups.
    pub(crate) async fn send_classified(
        &self,
        request: TransportRequest,
        version: crate::protocol::ODataVersion,
    ) -> crate::Result<ODataResponse> {
        let raw = self.transport.send(request).await.map_err(Error::Transport)?;
        ODataResponse::new(version, raw).healthy().await
    }
}
