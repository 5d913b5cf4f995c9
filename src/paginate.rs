//! Pull-based pagination over server-driven next-links.
//!
//! A [`Paginator`] starts from an already-executed first response and issues
//! exactly one request per pulled page, replicating the original request's
//! headers. No page is prefetched; errors surface on the pull that caused
//! them.

use futures::StreamExt;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::executor::{RequestExecutor, TransportRequest};
use crate::protocol::ODataVersion;
use crate::request::ODataRequest;
use crate::response::ODataResponse;
use crate::uri::EncodeStrategy;
use crate::BoxStream;

/// Splits an encoded query string into raw `key=value` pairs.
fn query_pairs(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

/// Async iterator over the pages of a paginated read.
pub struct Paginator {
    executor: RequestExecutor,
    version: ODataVersion,
    headers: Vec<(String, String)>,
    base_query: Vec<(String, String)>,
    base_uri: String,
    first: Option<ODataResponse>,
    next: Option<String>,
}

impl Paginator {
    /// A paginator over the pages following `first`, which was produced by
    /// executing `request` through `executor`.
    pub fn new(
        executor: RequestExecutor,
        request: &ODataRequest,
        first: ODataResponse,
    ) -> crate::Result<Self> {
        let base_uri = request.relative_uri(EncodeStrategy::Regular)?;
        Ok(Self {
            executor,
            version: request.version(),
            headers: request.wire_headers(),
            base_query: request.encoded_query().map(query_pairs).unwrap_or_default(),
            base_uri,
            first: Some(first),
            next: None,
        })
    }

    /// Resolves a next-link (absolute, host-relative or service-relative)
    /// into an absolute URL, dropping link query parameters that are present
    /// with the same value on the base request, since those are re-applied
    /// from the base.
    fn follow_up_url(&self, link: &str) -> crate::Result<String> {
        let absolute = if link.starts_with("http://") || link.starts_with("https://") {
            link.to_string()
        } else if link.starts_with('/') {
            format!("{}{link}", self.executor.base_url())
        } else {
            // relative to the request path's parent
            let base_path = self.base_uri.split('?').next().unwrap_or(&self.base_uri);
            let parent = match base_path.rsplit_once('/') {
                Some((parent, _)) => parent,
                None => "",
            };
            format!("{}{parent}/{link}", self.executor.base_url())
        };

        let mut url = Url::parse(&absolute).map_err(|error| {
            Error::encoding(format!("next link is not a valid URL ({error}): {link}"))
        })?;

        let link_pairs = url.query().map(query_pairs).unwrap_or_default();
        let mut merged = self.base_query.clone();
        for (key, value) in link_pairs {
            if !merged.iter().any(|(k, v)| *k == key && *v == value) {
                merged.push((key, value));
            }
        }
        if merged.is_empty() {
            url.set_query(None);
        } else {
            let rendered = merged
                .iter()
                .map(|(key, value)| {
                    if value.is_empty() {
                        key.clone()
                    } else {
                        format!("{key}={value}")
                    }
                })
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&rendered));
        }
        Ok(url.to_string())
    }

    /// Pulls the next page, issuing at most one request. `None` once the
    /// last page has been handed out.
    pub async fn next_page(&mut self) -> crate::Result<Option<ODataResponse>> {
        if let Some(mut first) = self.first.take() {
            self.next = first.next_link().await?;
            return Ok(Some(first));
        }

        let link = match self.next.take() {
            Some(link) => link,
            None => return Ok(None),
        };

        let url = self.follow_up_url(&link)?;
        debug!(url = %url, "fetching next page");
        let mut request = TransportRequest::new("GET", url);
        request.headers = self.headers.clone();

        let mut page = self.executor.send_classified(request, self.version).await?;
        self.next = page.next_link().await?;
        Ok(Some(page))
    }

    /// Adapts the paginator into a stream of pages. The stream ends after
    /// the last page, or after the pull that produced an error.
    pub fn into_stream(self) -> BoxStream<'static, crate::Result<ODataResponse>> {
        futures::stream::unfold(self, |mut paginator| async move {
            match paginator.next_page().await {
                Ok(Some(page)) => Some((Ok(page), paginator)),
                Ok(None) => None,
                Err(error) => {
                    // the next link is already consumed, the stream ends here
                    Some((Err(error), paginator))
                }
            }
        })
        .boxed()
    }
}

impl RequestExecutor {
    /// Executes `request` and wraps the response in a [`Paginator`] starting
    /// at its first page.
    pub async fn execute_paginated(&self, request: &ODataRequest) -> crate::Result<Paginator> {
        let first = self.execute(request).await?;
        Paginator::new(self.clone(), request, first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_pair_splitting() {
        assert_eq!(
            query_pairs("$top=5&$skiptoken=8"),
            vec![
                ("$top".to_string(), "5".to_string()),
                ("$skiptoken".to_string(), "8".to_string())
            ]
        );
        assert!(query_pairs("").is_empty());
    }
}
