use crate::protocol::{Literal, ODataVersion};
use crate::uri::encode::{encode_path_segment, encode_service_path, sanitize_service_path, EncodeStrategy};

/// The key predicate of an entity, e.g. `('US','1003764')`.
///
/// A key with a single unnamed field renders as `(value)`; named fields
/// render as `(name=value,…)` in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityKey {
    fields: Vec<(Option<String>, Literal)>,
}

impl EntityKey {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// A key consisting of a single unnamed value.
    pub fn single(value: impl Into<Literal>) -> Self {
        Self {
            fields: vec![(None, value.into())],
        }
    }

    /// Appends a named key field. Insertion order is preserved on the wire.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.fields.push((Some(name.into()), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Renders the parenthesized key predicate, percent-encoded for use in a
    /// path. Field names are taken as-is; values are rendered per dialect and
    /// then encoded.
    pub fn render(&self, version: ODataVersion) -> String {
        let inner = if self.fields.len() == 1 && self.fields[0].0.is_none() {
            encode_path_segment(&self.fields[0].1.render(version))
        } else {
            self.fields
                .iter()
                .map(|(name, value)| {
                    let rendered = encode_path_segment(&value.render(version));
                    match name {
                        Some(name) => format!("{name}={rendered}"),
                        None => rendered,
                    }
                })
                .collect::<Vec<_>>()
                .join(",")
        };
        format!("({inner})")
    }
}

/// A resource path below the service root: entity collection, optional key
/// predicate and optional navigation trail, e.g.
/// `BusinessPartners('42')/to_Addresses/$count`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePath {
    collection: String,
    key: Option<EntityKey>,
    segments: Vec<String>,
}

impl ResourcePath {
    /// A path addressing an entity collection.
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            key: None,
            segments: Vec::new(),
        }
    }

    /// A path addressing a single entity by key.
    pub fn entity(name: impl Into<String>, key: EntityKey) -> Self {
        Self {
            collection: name.into(),
            key: Some(key),
            segments: Vec::new(),
        }
    }

    /// Appends a navigation or system segment such as a property name or
    /// `$count`.
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// Renders the path relative to the service root, without a leading
    /// slash. Every segment is percent-encoded.
    pub fn render(&self, version: ODataVersion) -> String {
        let mut out = encode_path_segment(&self.collection);
        if let Some(key) = &self.key {
            if !key.is_empty() {
                out.push_str(&key.render(version));
            }
        }
        for segment in &self.segments {
            out.push('/');
            out.push_str(&encode_path_segment(segment));
        }
        out
    }
}

/// Assembles the relative request URI `service_path/resource_path?query`.
///
/// The service path is sanitized and encoded under the given strategy. The
/// query string must already be encoded (the query serializer produces
/// encoded output); it is validated and an [`Error::Encoding`] raised on any
/// character the encoding would not have let through.
///
/// [`Error::Encoding`]: crate::error::Error::Encoding
pub fn build_uri(
    service_path: &str,
    resource_path: &str,
    encoded_query: Option<&str>,
    strategy: EncodeStrategy,
) -> crate::Result<String> {
    let service = encode_service_path(&sanitize_service_path(service_path), strategy);
    let mut uri = if resource_path.is_empty() {
        if service.is_empty() {
            "/".to_string()
        } else {
            service
        }
    } else {
        format!("{service}/{resource_path}")
    };
    if let Some(query) = encoded_query {
        if !query.is_empty() {
            crate::uri::encode::validate_query(query)?;
            uri.push('?');
            uri.push_str(query);
        }
    }
    Ok(uri)
}

fn extract_query_param(uri: &str, name: &str) -> Option<String> {
    let query = uri.split_once('?').map_or(uri, |(_, query)| query);
    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            if key.eq_ignore_ascii_case(name) && !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Extracts the `$skiptoken` value from a URI or query string,
/// case-insensitively. An empty value counts as absent.
pub fn extract_skip_token(uri: &str) -> Option<String> {
    extract_query_param(uri, "$skiptoken")
}

/// Extracts the `$deltatoken` value from a URI or query string,
/// case-insensitively. An empty value counts as absent.
pub fn extract_delta_token(uri: &str) -> Option<String> {
    extract_query_param(uri, "$deltatoken")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_unnamed_key() {
        let key = EntityKey::single("1003764");
        assert_eq!(key.render(ODataVersion::V4), "('1003764')");
    }

    #[test]
    fn test_compound_key_preserves_order() {
        let key = EntityKey::new().field("Country", "US").field("Id", 42);
        assert_eq!(key.render(ODataVersion::V4), "(Country='US',Id=42)");
    }

    #[test]
    fn test_key_value_is_encoded() {
        let key = EntityKey::new()
            .field("key1", "foo/bar")
            .field("key2", 123);
        assert_eq!(key.render(ODataVersion::V4), "(key1='foo%2Fbar',key2=123)");
    }

    #[test]
    fn test_null_key_value() {
        let key = EntityKey::new().field("Id", Literal::Null);
        assert_eq!(key.render(ODataVersion::V4), "(Id=null)");
    }

    #[test]
    fn test_navigation_path() {
        let path = ResourcePath::entity("BusinessPartners", EntityKey::single("42"))
            .segment("to_Addresses")
            .segment("$count");
        assert_eq!(
            path.render(ODataVersion::V2),
            "BusinessPartners('42')/to_Addresses/$count"
        );
    }

    #[test]
    fn test_build_uri_joins_parts() {
        assert_eq!(
            build_uri("/svc/", "Entities", Some("$top=5"), EncodeStrategy::Regular).unwrap(),
            "/svc/Entities?$top=5"
        );
        assert_eq!(
            build_uri("/", "Entities", None, EncodeStrategy::Regular).unwrap(),
            "/Entities"
        );
        assert_eq!(
            build_uri("/svc", "", None, EncodeStrategy::Regular).unwrap(),
            "/svc"
        );
    }

    #[test]
    fn test_build_uri_collapses_repeated_slashes() {
        assert_eq!(
            build_uri("/api//v2", "People", None, EncodeStrategy::Regular).unwrap(),
            "/api/v2/People"
        );
    }

    #[test]
    fn test_build_uri_rejects_raw_query() {
        let result = build_uri(
            "/svc",
            "Entities",
            Some("$filter=Name eq 'x'"),
            EncodeStrategy::Regular,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_token_extraction() {
        assert_eq!(
            extract_skip_token("/svc/Entities?$Skiptoken=abc&x=1"),
            Some("abc".to_string())
        );
        assert_eq!(extract_skip_token("/svc/Entities?$skiptoken="), None);
        assert_eq!(
            extract_delta_token("$deltatoken=tok123"),
            Some("tok123".to_string())
        );
        assert_eq!(extract_delta_token("/svc/Entities"), None);
    }
}
