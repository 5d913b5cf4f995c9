use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{DeserializationError, Error, ServiceError};
use crate::executor::{RawBody, RawResponse, TransportError};
use crate::protocol::ODataVersion;
use crate::request::BatchItemHandle;
use crate::response::multipart::{
    boundary_from_content_type, EmbeddedResponse, MultipartParser, ResponseSegment,
};
use crate::uri::{extract_delta_token, extract_skip_token};
use crate::BoxStream;

const STREAM_CONSUMED: &str = "stream has already been operated upon or closed";

/// Body handle of a response. Buffering is the default: the first buffered
/// read drains the stream into memory and every later read reuses the
/// buffer. Taking the raw stream instead is single-shot, and the choice is
/// sticky either way.
enum BodyState {
    Stream(BoxStream<'static, Result<Bytes, TransportError>>),
    Buffered(Bytes),
    Consumed,
}

impl std::fmt::Debug for BodyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BodyState::Stream(_) => f.write_str("Stream"),
            BodyState::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            BodyState::Consumed => f.write_str("Consumed"),
        }
    }
}

/// An executed OData response: status, ordered headers and the payload
/// accessors of the protocol dialect the request was made in.
#[derive(Debug)]
pub struct ODataResponse {
    version: ODataVersion,
    status: u16,
    headers: Vec<(String, String)>,
    body: BodyState,
}

impl ODataResponse {
    pub(crate) fn new(version: ODataVersion, raw: RawResponse) -> Self {
        let body = match raw.body {
            RawBody::Buffered(bytes) => BodyState::Buffered(bytes),
            RawBody::Stream(stream) => BodyState::Stream(stream),
        };
        Self {
            version,
            status: raw.status,
            headers: raw.headers,
            body,
        }
    }

    fn from_embedded(version: ODataVersion, embedded: EmbeddedResponse) -> Self {
        Self {
            version,
            status: embedded.status,
            headers: embedded.headers,
            body: BodyState::Buffered(Bytes::from(embedded.body)),
        }
    }

    pub fn version(&self) -> ODataVersion {
        self.version
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// All headers in arrival order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Values of a header, case-insensitively, preserving arrival order.
    /// Repeated headers such as `Set-Cookie` are never merged.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn first_header(&self, name: &str) -> Option<&str> {
        self.header_values(name).into_iter().next()
    }

    /// The entity version identifier: the first non-empty `ETag` header.
    pub fn version_identifier(&self) -> Option<&str> {
        self.header_values("ETag")
            .into_iter()
            .find(|value| !value.is_empty())
    }

    /// Buffers the body (if not already buffered) and returns it. Repeatable.
    pub async fn body_bytes(&mut self) -> crate::Result<Bytes> {
        match &mut self.body {
            BodyState::Buffered(bytes) => Ok(bytes.clone()),
            BodyState::Consumed => Err(Error::illegal_usage(STREAM_CONSUMED)),
            BodyState::Stream(stream) => {
                let mut buffer = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buffer.extend_from_slice(&chunk?);
                }
                let bytes = buffer.freeze();
                debug!(bytes = bytes.len(), "buffered response body");
                self.body = BodyState::Buffered(bytes.clone());
                Ok(bytes)
            }
        }
    }

    /// Buffers the body and decodes it as UTF-8, replacing invalid
    /// sequences.
    pub async fn body_text(&mut self) -> crate::Result<String> {
        let bytes = self.body_bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Takes the raw body stream without buffering. Single-shot: afterwards
    /// no body access is possible, and a buffered body cannot be un-buffered
    /// into a stream again.
    pub fn take_body_stream(
        &mut self,
    ) -> crate::Result<BoxStream<'static, Result<Bytes, TransportError>>> {
        match std::mem::replace(&mut self.body, BodyState::Consumed) {
            BodyState::Stream(stream) => Ok(stream),
            BodyState::Buffered(bytes) => {
                self.body = BodyState::Buffered(bytes);
                Err(Error::illegal_usage(
                    "response body was already buffered; read it through the buffered accessors",
                ))
            }
            BodyState::Consumed => Err(Error::illegal_usage(STREAM_CONSUMED)),
        }
    }

    fn no_payload_error(&self) -> Error {
        Error::Deserialization(DeserializationError::new(format!(
            "{} response did not contain any payload.",
            self.version
        )))
    }

    /// Parses the body as JSON. An empty body is a deserialization error.
    pub async fn as_json(&mut self) -> crate::Result<Value> {
        let text = self.body_text().await?;
        if text.trim().is_empty() {
            return Err(self.no_payload_error());
        }
        serde_json::from_str(&text).map_err(|source| {
            Error::Deserialization(
                DeserializationError::with_source("response body is not valid JSON", source)
                    .with_status(self.status),
            )
        })
    }

    fn lookup<'a>(value: &'a Value, paths: &[&[&str]]) -> Option<&'a Value> {
        for path in paths {
            let mut cursor = value;
            let mut found = true;
            for segment in *path {
                match cursor.get(segment) {
                    Some(next) => cursor = next,
                    None => {
                        found = false;
                        break;
                    }
                }
            }
            if found {
                return Some(cursor);
            }
        }
        None
    }

    /// The result set of a collection response, unwrapped from the dialect's
    /// envelope (`d.results` in V2, `value` in V4).
    pub async fn as_list(&mut self) -> crate::Result<Vec<Value>> {
        let document = self.as_json().await?;
        match Self::lookup(&document, self.version.result_set_paths()) {
            Some(Value::Array(items)) => Ok(items.clone()),
            _ => Err(Error::Deserialization(
                DeserializationError::new(format!(
                    "{} response does not contain a result set",
                    self.version
                ))
                .with_status(self.status),
            )),
        }
    }

    /// A single-entity result, unwrapped from the dialect's envelope.
    pub async fn as_value(&mut self) -> crate::Result<Value> {
        let document = self.as_json().await?;
        match Self::lookup(&document, self.version.result_single_paths()) {
            Some(value) => Ok(value.clone()),
            None => Err(self.no_payload_error()),
        }
    }

    /// The inline count requested via `$inlinecount` / `$count`. Its absence
    /// is an error, since it only exists when explicitly requested.
    pub async fn inline_count(&mut self) -> crate::Result<u64> {
        let document = self.as_json().await?;
        let count = match Self::lookup(&document, self.version.inline_count_paths()) {
            // V2 renders the count as a string, V4 as a number
            Some(Value::String(text)) => text.parse::<u64>().ok(),
            Some(Value::Number(number)) => number.as_u64(),
            _ => None,
        };
        count.ok_or_else(|| {
            Error::Deserialization(
                DeserializationError::new(format!(
                    "{} response does not contain an inline count",
                    self.version
                ))
                .with_status(self.status),
            )
        })
    }

    fn link(&self, document: &Value, paths: &[&[&str]]) -> Option<String> {
        match Self::lookup(document, paths) {
            Some(Value::String(link)) if !link.is_empty() => Some(link.clone()),
            _ => None,
        }
    }

    /// The next-link of a server-paginated response, if any.
    pub async fn next_link(&mut self) -> crate::Result<Option<String>> {
        let document = self.as_json().await?;
        let link = self.link(&document, self.version.next_link_paths());
        if let Some(link) = &link {
            debug!(next_link = %link, "response carries a next link");
        }
        Ok(link)
    }

    /// The delta-link of a change-tracking response, if any.
    pub async fn delta_link(&mut self) -> crate::Result<Option<String>> {
        let document = self.as_json().await?;
        Ok(self.link(&document, self.version.delta_link_paths()))
    }

    /// The `$skiptoken` of the next-link, if any.
    pub async fn skip_token(&mut self) -> crate::Result<Option<String>> {
        Ok(self.next_link().await?.as_deref().and_then(extract_skip_token))
    }

    /// The `$deltatoken` of the delta-link, if any.
    pub async fn delta_token(&mut self) -> crate::Result<Option<String>> {
        Ok(self.delta_link().await?.as_deref().and_then(extract_delta_token))
    }

    /// Classifies the response health. A 2xx status passes the response
    /// through; anything else becomes an error: a parseable OData error
    /// document raises [`Error::Service`], an unparseable body a
    /// deserialization error carrying the parse failure and status.
    pub async fn healthy(mut self) -> crate::Result<Self> {
        if (200..300).contains(&self.status) {
            return Ok(self);
        }
        let status = self.status;
        let body = self.body_text().await.unwrap_or_default();
        match ServiceError::from_body(&body, status) {
            Ok(service_error) => {
                warn!(status, code = %service_error.code, "service answered with an error document");
                Err(Error::Service(service_error))
            }
            Err(parse_failure) => Err(Error::Deserialization(
                DeserializationError::with_source(
                    format!(
                        "service returned HTTP {status} with a body that is not an OData error document"
                    ),
                    parse_failure,
                )
                .with_status(status),
            )),
        }
    }
}

/// A decoded `$batch` response. Individual responses are retrieved by the
/// [`BatchItemHandle`] returned when the request was added to the batch.
#[derive(Debug)]
pub struct BatchResponse {
    version: ODataVersion,
    status: u16,
    segments: Vec<ResponseSegment>,
}

impl BatchResponse {
    /// Decodes the multipart body of an executed `$batch` request.
    pub async fn from_response(mut response: ODataResponse) -> crate::Result<Self> {
        let content_type = response
            .first_header("Content-Type")
            .ok_or_else(|| Error::illegal_usage("No delimiter found in HTTP header."))?
            .to_string();
        let boundary = boundary_from_content_type(&content_type)?;

        let body = match response.body_text().await {
            Ok(body) => body,
            Err(Error::Transport(cause)) => {
                return Err(Error::illegal_usage_with(
                    "Unable to read HTTP content.",
                    cause,
                ))
            }
            Err(other) => return Err(other),
        };
        if body.is_empty() {
            return Err(Error::illegal_usage(
                "HTTP response does not contain a content.",
            ));
        }

        let segments = MultipartParser::parse(&body, &boundary).to_list()?;
        Ok(Self {
            version: response.version,
            status: response.status,
            segments,
        })
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Number of top-level parts.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The response belonging to the request behind `handle`.
    ///
    /// Correlation is positional: parts appear in the order the requests
    /// were added to the batch. When a whole changeset failed, the service
    /// sends a single error part in its place; that part is returned for
    /// every member of the changeset.
    pub fn response_for(&self, handle: BatchItemHandle) -> crate::Result<ODataResponse> {
        let segment = self.segments.get(handle.outer()).ok_or_else(|| {
            Error::illegal_usage(format!(
                "batch response has no part at position {}",
                handle.outer()
            ))
        })?;
        let raw = match (segment, handle.inner()) {
            (ResponseSegment::Single(raw), None) => raw,
            (ResponseSegment::Changeset(members), Some(inner)) => {
                members.get(inner).ok_or_else(|| {
                    Error::illegal_usage(format!(
                        "changeset at position {} has no member {inner}",
                        handle.outer()
                    ))
                })?
            }
            // the whole changeset failed; its single error part answers
            // every member
            (ResponseSegment::Single(raw), Some(_)) => raw,
            (ResponseSegment::Changeset(_), None) => {
                return Err(Error::illegal_usage(format!(
                    "part at position {} is a changeset; the handle must address a member",
                    handle.outer()
                )))
            }
        };
        let embedded = EmbeddedResponse::parse(raw)?;
        Ok(ODataResponse::from_embedded(self.version, embedded))
    }
}
