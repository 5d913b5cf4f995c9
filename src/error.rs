use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::executor::TransportError;

/// Unified error type for the OData wire-protocol engine.
///
/// This aggregates all low-level failures into actionable, high-level
/// categories. Encoding and construction errors are raised at build time;
/// transport, service and deserialization errors surface at the point of
/// execution or read.
#[derive(Debug, Error)]
pub enum Error {
    /// A value could not be percent-encoded unambiguously, or a supposedly
    /// pre-encoded input still contained raw reserved characters.
    #[error("Encoding error: {message}")]
    Encoding { message: String },

    /// A request was assembled inconsistently, e.g. a batch mixing service
    /// paths or protocol versions.
    #[error("Request construction error: {message}")]
    RequestConstruction { message: String },

    /// The HTTP transport collaborator failed before a response was obtained.
    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    /// A response body was absent or could not be interpreted where content
    /// was required.
    #[error("Response deserialization error: {0}")]
    Deserialization(#[from] DeserializationError),

    /// The service answered with a well-formed OData error document.
    #[error("OData service error: {0}")]
    Service(#[from] ServiceError),

    /// Protocol misuse, such as consuming a single-consumption stream twice.
    /// Carries the underlying failure when one triggered the misuse report.
    #[error("Illegal usage: {message}")]
    IllegalUsage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    pub(crate) fn encoding(message: impl Into<String>) -> Self {
        Error::Encoding {
            message: message.into(),
        }
    }

    pub(crate) fn construction(message: impl Into<String>) -> Self {
        Error::RequestConstruction {
            message: message.into(),
        }
    }

    pub(crate) fn illegal_usage(message: impl Into<String>) -> Self {
        Error::IllegalUsage {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn illegal_usage_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::IllegalUsage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The HTTP status code associated with this error, if any.
    ///
    /// Allows consumers to branch on well-known statuses, e.g. 404 on a
    /// by-key read.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Service(e) => Some(e.status),
            Error::Deserialization(e) => e.status,
            _ => None,
        }
    }
}

/// A response body was missing or failed to parse where content was expected.
///
/// The original parse failure, if any, is preserved as the error source.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DeserializationError {
    pub message: String,
    #[source]
    pub source: Option<serde_json::Error>,
    /// HTTP status of the offending response, when known.
    pub status: Option<u16>,
}

impl DeserializationError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            status: None,
        }
    }

    pub(crate) fn with_source(message: impl Into<String>, source: serde_json::Error) -> Self {
        Self {
            message: message.into(),
            source: Some(source),
            status: None,
        }
    }

    pub(crate) fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// An error document returned by the OData service, following the standard
/// envelope `{"error":{"code","message","target","details","innererror"}}`.
#[derive(Debug, Error)]
#[error("{code}: {message} (HTTP {status})")]
pub struct ServiceError {
    /// Service-defined error code, e.g. `"err123"`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional target of the error, e.g. the offending property.
    pub target: Option<String>,
    /// Nested error details, possibly empty.
    pub details: Vec<ServiceErrorDetail>,
    /// Free-form `innererror` contents.
    pub inner_error: HashMap<String, serde_json::Value>,
    /// HTTP status of the response carrying this error.
    pub status: u16,
    /// The raw response body, for diagnostics.
    pub raw_body: String,
}

/// A single entry of the `details` list of an OData error document.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServiceErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(deserialize_with = "deserialize_message", default)]
    pub message: String,
    #[serde(default)]
    pub target: Option<String>,
}

/// Wire shape of the error envelope. V2 services wrap the message in
/// `{"lang":…,"value":…}` and place details under `innererror.errordetails`;
/// both shapes are normalized into [`ServiceError`].
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(deserialize_with = "deserialize_message", default)]
    message: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    details: Option<Vec<ServiceErrorDetail>>,
    #[serde(default)]
    innererror: Option<HashMap<String, serde_json::Value>>,
}

fn deserialize_message<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    // V4 carries a plain string, V2 an object {"lang": "...", "value": "..."}.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Message {
        Plain(String),
        Localized { value: String },
    }

    Ok(match Message::deserialize(deserializer)? {
        Message::Plain(value) => value,
        Message::Localized { value } => value,
    })
}

const ERROR_DETAILS_FIELD: &str = "errordetails";

impl ServiceError {
    /// Parse the standard OData error envelope from a response body.
    ///
    /// Returns the JSON parse failure unmodified if the body is not a
    /// well-formed envelope, so callers can retain it as a cause.
    pub fn from_body(body: &str, status: u16) -> Result<Self, serde_json::Error> {
        let envelope: ErrorEnvelope = serde_json::from_str(body)?;
        let ErrorBody {
            code,
            message,
            target,
            details,
            innererror,
        } = envelope.error;

        let mut inner_error = innererror.unwrap_or_default();
        let details = match details {
            Some(details) => details,
            // V2 keeps the details nested inside "innererror.errordetails".
            None => inner_error
                .remove(ERROR_DETAILS_FIELD)
                .and_then(|value| serde_json::from_value(value).ok())
                .unwrap_or_default(),
        };

        Ok(Self {
            code,
            message,
            target,
            details,
            inner_error,
            status,
            raw_body: body.to_string(),
        })
    }
}
