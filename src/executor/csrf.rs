//! CSRF token pre-flight.
//!
//! Modifying requests against CSRF-protected services need a token fetched
//! with a HEAD request to the service root. The pre-flight is best-effort:
//! its failure is reported to the caller of the main request only if that
//! request fails as well.

use tracing::debug;

use crate::executor::transport::{HttpTransport, TransportRequest};
use crate::uri::sanitize_service_path;

pub(crate) const X_CSRF_TOKEN: &str = "X-CSRF-Token";
pub(crate) const CSRF_FETCH: &str = "Fetch";
pub(crate) const CSRF_REQUIRED: &str = "Required";

/// A fetched token plus the session cookies that scope its validity.
#[derive(Debug, Clone)]
pub(crate) struct CsrfToken {
    pub token: String,
    pub cookies: Vec<String>,
}

/// HEAD the service root with `X-CSRF-Token: Fetch` and capture the token
/// and session cookies. Failures come back as a plain description since
/// they never surface on their own.
pub(crate) async fn fetch_token(
    transport: &dyn HttpTransport,
    base_url: &str,
    service_path: &str,
) -> Result<CsrfToken, String> {
    let url = format!("{base_url}{}", sanitize_service_path(service_path));
    let mut request = TransportRequest::new("HEAD", url);
    request
        .headers
        .push((X_CSRF_TOKEN.to_string(), CSRF_FETCH.to_string()));

    let response = transport
        .send(request)
        .await
        .map_err(|error| format!("CSRF token pre-flight failed: {error}"))?;

    let token = response
        .headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(X_CSRF_TOKEN))
        .map(|(_, value)| value.clone())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            format!(
                "CSRF token pre-flight returned HTTP {} without a token header",
                response.status
            )
        })?;

    // only the cookie pair itself, attributes like Path are not sent back
    let cookies = response
        .headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("Set-Cookie"))
        .filter_map(|(_, value)| value.split(';').next())
        .map(|pair| pair.trim().to_string())
        .filter(|pair| !pair.is_empty())
        .collect();

    debug!("obtained CSRF token from service root");
    Ok(CsrfToken { token, cookies })
}

impl CsrfToken {
    /// Applies the token and its cookies to an outgoing request.
    pub(crate) fn apply(&self, request: &mut TransportRequest) {
        request
            .headers
            .push((X_CSRF_TOKEN.to_string(), self.token.clone()));
        if !self.cookies.is_empty() {
            request
                .headers
                .push(("Cookie".to_string(), self.cookies.join("; ")));
        }
    }
}
