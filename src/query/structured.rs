use crate::error::Error;
use crate::protocol::ODataVersion;
use crate::query::{FilterExpression, OrderBy};
use crate::uri::encode_query;

/// A structured set of query options for an entity collection, including
/// nested sub-queries attached to navigation properties via `$expand`.
///
/// Nested queries render parenthesized in V4 (`$expand=Nav($select=a;$top=2)`)
/// and are flattened to slash-joined `$select`/`$expand` paths in V2. Custom
/// parameters and the inline count are only meaningful on the root query;
/// setting them on a nested query is a construction error.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredQuery {
    field_name: String,
    is_root: bool,
    version: ODataVersion,
    simple_selectors: Vec<String>,
    complex_selectors: Vec<StructuredQuery>,
    filters: Vec<FilterExpression>,
    order_by: Option<OrderBy>,
    top: Option<u64>,
    skip: Option<u64>,
    search: Option<String>,
    inline_count: bool,
    custom_parameters: Vec<(String, String)>,
}

impl StructuredQuery {
    fn new(field_name: String, is_root: bool, version: ODataVersion) -> Self {
        Self {
            field_name,
            is_root,
            version,
            simple_selectors: Vec::new(),
            complex_selectors: Vec::new(),
            filters: Vec::new(),
            order_by: None,
            top: None,
            skip: None,
            search: None,
            inline_count: false,
            custom_parameters: Vec::new(),
        }
    }

    /// The root query of a request against an entity collection.
    pub fn on_entity(entity_name: impl Into<String>, version: ODataVersion) -> Self {
        Self::new(entity_name.into(), true, version)
    }

    /// A sub-query scoped to a navigation property, to be attached to a
    /// parent via [`expand`](Self::expand).
    pub fn nested_on_property(property_name: impl Into<String>, version: ODataVersion) -> Self {
        Self::new(property_name.into(), false, version)
    }

    pub fn entity_name(&self) -> &str {
        &self.field_name
    }

    pub fn version(&self) -> ODataVersion {
        self.version
    }

    /// Adds fields to `$select`.
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.simple_selectors.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Attaches a nested sub-query as an `$expand` of this query.
    pub fn expand(mut self, nested: StructuredQuery) -> crate::Result<Self> {
        if nested.is_root {
            return Err(Error::construction(
                "a root query cannot be nested; build sub-queries with nested_on_property",
            ));
        }
        if nested.version != self.version {
            return Err(Error::construction(format!(
                "cannot nest an {} query inside an {} query",
                nested.version, self.version
            )));
        }
        self.complex_selectors.push(nested);
        Ok(self)
    }

    /// Adds a `$filter` term. Multiple terms are conjoined with `and`.
    pub fn filter(mut self, filter: FilterExpression) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn top(mut self, top: u64) -> Self {
        self.top = Some(top);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn search(mut self, phrase: impl Into<String>) -> Self {
        self.search = Some(phrase.into());
        self
    }

    /// Requests the inline count (`$inlinecount=allpages` / `$count=true`).
    /// Root-only.
    pub fn with_inline_count(mut self) -> crate::Result<Self> {
        if !self.is_root {
            return Err(Error::construction(
                "inline count can only be requested on the root query",
            ));
        }
        self.inline_count = true;
        Ok(self)
    }

    /// Adds a custom (non-`$`) query parameter. Root-only.
    pub fn custom_parameter(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> crate::Result<Self> {
        if !self.is_root {
            return Err(Error::construction(
                "custom query parameters can only be set on the root query",
            ));
        }
        self.custom_parameters.push((key.into(), value.into()));
        Ok(self)
    }

    fn rendered_filter(&self) -> Option<String> {
        match self.filters.len() {
            0 => None,
            1 => Some(self.filters[0].render(self.version)),
            _ => Some(
                self.filters
                    .iter()
                    .map(|filter| filter.render(self.version))
                    .collect::<Vec<_>>()
                    .join(" and "),
            ),
        }
    }

    /// Collects V2 slash-flattened select and expand paths.
    fn collect_v2_paths(&self, prefix: &str, selects: &mut Vec<String>, expands: &mut Vec<String>) {
        let join = |field: &str| {
            if prefix.is_empty() {
                field.to_string()
            } else {
                format!("{prefix}/{field}")
            }
        };
        for field in &self.simple_selectors {
            selects.push(join(field));
        }
        for nested in &self.complex_selectors {
            let path = join(&nested.field_name);
            expands.push(path.clone());
            nested.collect_v2_paths(&path, selects, expands);
        }
    }

    /// The options of this query as `key=value` pairs, excluding select and
    /// expand (those depend on the dialect and nesting level).
    fn option_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(filter) = self.rendered_filter() {
            pairs.push(("$filter".to_string(), filter));
        }
        if let Some(search) = &self.search {
            pairs.push(("$search".to_string(), search.clone()));
        }
        if let Some(order) = self.order_by.as_ref().filter(|order| !order.is_empty()) {
            pairs.push(("$orderby".to_string(), order.render()));
        }
        if let Some(top) = self.top {
            pairs.push(("$top".to_string(), top.to_string()));
        }
        if let Some(skip) = self.skip {
            pairs.push(("$skip".to_string(), skip.to_string()));
        }
        if self.inline_count {
            let (key, value) = self.version.inline_count_option(true);
            pairs.push((key.to_string(), value.to_string()));
        }
        for (key, value) in &self.custom_parameters {
            pairs.push((key.clone(), value.clone()));
        }
        pairs
    }

    /// V4 rendering of a nested query, the content between the parentheses
    /// of its `$expand` entry. Options are joined by `;`.
    fn nested_options_v4(&self) -> String {
        let mut parts = Vec::new();
        if !self.simple_selectors.is_empty() {
            parts.push(format!("$select={}", self.simple_selectors.join(",")));
        }
        if let Some(expand) = self.expand_v4() {
            parts.push(format!("$expand={expand}"));
        }
        for (key, value) in self.option_pairs() {
            parts.push(format!("{key}={value}"));
        }
        parts.join(";")
    }

    fn expand_v4(&self) -> Option<String> {
        if self.complex_selectors.is_empty() {
            return None;
        }
        let entries = self
            .complex_selectors
            .iter()
            .map(|nested| {
                let options = nested.nested_options_v4();
                if options.is_empty() {
                    nested.field_name.clone()
                } else {
                    format!("{}({options})", nested.field_name)
                }
            })
            .collect::<Vec<_>>()
            .join(",");
        Some(entries)
    }

    /// Renders the query string without percent-encoding, options joined
    /// by `&`.
    pub fn to_query_string(&self) -> String {
        let mut parts = Vec::new();
        match self.version {
            ODataVersion::V2 => {
                let mut selects = Vec::new();
                let mut expands = Vec::new();
                self.collect_v2_paths("", &mut selects, &mut expands);
                if !selects.is_empty() {
                    parts.push(format!("$select={}", selects.join(",")));
                }
                if !expands.is_empty() {
                    parts.push(format!("$expand={}", expands.join(",")));
                }
            }
            ODataVersion::V4 => {
                if !self.simple_selectors.is_empty() {
                    parts.push(format!("$select={}", self.simple_selectors.join(",")));
                }
                if let Some(expand) = self.expand_v4() {
                    parts.push(format!("$expand={expand}"));
                }
            }
        }
        for (key, value) in self.option_pairs() {
            parts.push(format!("{key}={value}"));
        }
        parts.join("&")
    }

    /// Renders the query string percent-encoded for the wire.
    pub fn to_encoded_string(&self) -> String {
        encode_query(&self.to_query_string())
    }
}
