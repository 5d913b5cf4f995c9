use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// The OData protocol dialect a request or response conforms to.
///
/// The two supported versions differ in URI syntax (key literals, nested
/// expand), the JSON envelope shape (`d`-wrapped for V2, annotation-based for
/// V4) and the spelling of the inline-count query option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ODataVersion {
    /// Version 2.0 of the OData protocol.
    V2,
    /// Version 4.0 of the OData protocol.
    V4,
}

impl ODataVersion {
    /// The version number sent in the `OData-Version` header, e.g. `"4.0"`.
    pub fn version_str(&self) -> &'static str {
        match self {
            ODataVersion::V2 => "2.0",
            ODataVersion::V4 => "4.0",
        }
    }

    /// JSON paths (tried in order) locating the result set of a collection
    /// response.
    pub(crate) fn result_set_paths(&self) -> &'static [&'static [&'static str]] {
        match self {
            ODataVersion::V2 => &[&["d", "results"]],
            ODataVersion::V4 => &[&["value"]],
        }
    }

    /// JSON paths locating a single-entity result.
    pub(crate) fn result_single_paths(&self) -> &'static [&'static [&'static str]] {
        match self {
            ODataVersion::V2 => &[&["d"]],
            ODataVersion::V4 => &[&[]],
        }
    }

    /// JSON paths locating the inline count.
    pub(crate) fn inline_count_paths(&self) -> &'static [&'static [&'static str]] {
        match self {
            ODataVersion::V2 => &[&["d", "__count"]],
            ODataVersion::V4 => &[&["@odata.count"], &["@count"]],
        }
    }

    /// JSON paths locating the next-link of a paginated response.
    pub(crate) fn next_link_paths(&self) -> &'static [&'static [&'static str]] {
        match self {
            ODataVersion::V2 => &[&["d", "__next"]],
            ODataVersion::V4 => &[&["@odata.nextLink"], &["@nextLink"]],
        }
    }

    /// JSON paths locating the delta-link of a change-tracking response.
    pub(crate) fn delta_link_paths(&self) -> &'static [&'static [&'static str]] {
        match self {
            ODataVersion::V2 => &[&["d", "__delta"]],
            ODataVersion::V4 => &[&["@odata.deltaLink"], &["@deltaLink"]],
        }
    }

    /// The (inline) count query option for this dialect.
    pub fn inline_count_option(&self, enabled: bool) -> (&'static str, &'static str) {
        match self {
            ODataVersion::V2 => ("$inlinecount", if enabled { "allpages" } else { "none" }),
            ODataVersion::V4 => ("$count", if enabled { "true" } else { "false" }),
        }
    }
}

impl fmt::Display for ODataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OData {}", self.version_str())
    }
}

/// A typed literal value, as used in entity-key predicates and filter
/// comparisons. Rendering depends on the protocol dialect.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// String literal; single-quoted, internal quotes doubled.
    String(String),
    /// Signed integer; raw in V4, `L`-suffixed for i64 in V2.
    Integer(i64),
    /// Decimal literal; raw in V4, `M`-suffixed in V2.
    Decimal(String),
    /// Floating point; raw in V4, `d`-suffixed in V2.
    Double(f64),
    /// Boolean `true` / `false`.
    Boolean(bool),
    /// GUID; `guid'…'` in V2, bare in V4.
    Guid(Uuid),
    /// Point in time; `datetimeoffset'…'` in V2, ISO-8601 offset form in V4.
    DateTime(DateTime<Utc>),
    /// ISO-8601 duration such as `PT2H`; `time'…'` in V2, `duration'…'` in V4.
    Duration(String),
    /// The bare token `null`, unquoted.
    Null,
}

impl Literal {
    /// Render this literal in the given dialect. The output is raw (not
    /// percent-encoded); encoding is applied by the URI layer.
    pub fn render(&self, version: ODataVersion) -> String {
        match self {
            Literal::String(value) => format!("'{}'", value.replace('\'', "''")),
            Literal::Integer(value) => match version {
                ODataVersion::V2 if *value > i32::MAX as i64 || *value < i32::MIN as i64 => {
                    format!("{value}L")
                }
                _ => value.to_string(),
            },
            Literal::Decimal(value) => match version {
                ODataVersion::V2 => format!("{value}M"),
                ODataVersion::V4 => value.clone(),
            },
            Literal::Double(value) => match version {
                ODataVersion::V2 => format!("{}d", render_double(*value)),
                ODataVersion::V4 => render_double(*value),
            },
            Literal::Boolean(value) => value.to_string(),
            Literal::Guid(value) => match version {
                ODataVersion::V2 => format!("guid'{value}'"),
                ODataVersion::V4 => value.to_string(),
            },
            Literal::DateTime(value) => match version {
                ODataVersion::V2 => format!(
                    "datetimeoffset'{}'",
                    value.to_rfc3339_opts(SecondsFormat::Secs, true)
                ),
                ODataVersion::V4 => value.to_rfc3339_opts(SecondsFormat::Secs, true),
            },
            Literal::Duration(value) => match version {
                ODataVersion::V2 => format!("time'{value}'"),
                ODataVersion::V4 => format!("duration'{value}'"),
            },
            Literal::Null => "null".to_string(),
        }
    }
}

/// `f64::to_string` drops the fractional part for whole numbers ("1"), which
/// services would read as an integer literal. Keep a decimal point in every
/// finite rendering.
fn render_double(value: f64) -> String {
    let rendered = value.to_string();
    if value.is_finite() && !rendered.contains('.') {
        format!("{rendered}.0")
    } else {
        rendered
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::String(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::String(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Integer(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Integer(value as i64)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Boolean(value)
    }
}

impl From<Uuid> for Literal {
    fn from(value: Uuid) -> Self {
        Literal::Guid(value)
    }
}
