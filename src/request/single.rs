use serde_json::Value;

use crate::protocol::ODataVersion;
use crate::uri::{build_uri, EncodeStrategy, EntityKey, ResourcePath};

/// What a request does, which fixes its HTTP method and payload expectations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// GET on a collection.
    Read,
    /// GET on a single entity addressed by key.
    ReadByKey,
    /// POST of a new entity.
    Create,
    /// PATCH or PUT of an existing entity, per [`UpdateStrategy`].
    Update,
    /// DELETE of an existing entity.
    Delete,
    /// GET invocation of an unbound function.
    Function,
    /// POST invocation of an unbound action.
    Action,
}

impl RequestKind {
    /// Whether this kind changes server state, which decides CSRF handling
    /// and changeset membership.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            RequestKind::Create | RequestKind::Update | RequestKind::Delete | RequestKind::Action
        )
    }
}

/// HTTP verb used for updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateStrategy {
    /// Sparse update, only the supplied fields change.
    #[default]
    Patch,
    /// Full replacement of the entity.
    Put,
}

/// A single OData request: service path, resource path, query string and
/// ordered headers. Built through the kind-specific constructors; executed
/// by the [`RequestExecutor`](crate::executor::RequestExecutor) or embedded
/// into a [`BatchRequest`](crate::request::BatchRequest).
#[derive(Debug, Clone, PartialEq)]
pub struct ODataRequest {
    kind: RequestKind,
    version: ODataVersion,
    service_path: String,
    resource_path: ResourcePath,
    encoded_query: Option<String>,
    headers: Vec<(String, String)>,
    payload: Option<Value>,
    update_strategy: UpdateStrategy,
}

impl ODataRequest {
    fn new(
        kind: RequestKind,
        version: ODataVersion,
        service_path: impl Into<String>,
        resource_path: ResourcePath,
    ) -> Self {
        Self {
            kind,
            version,
            service_path: service_path.into(),
            resource_path,
            encoded_query: None,
            headers: Vec::new(),
            payload: None,
            update_strategy: UpdateStrategy::default(),
        }
    }

    /// GET on an entity collection.
    pub fn read(
        version: ODataVersion,
        service_path: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self::new(
            RequestKind::Read,
            version,
            service_path,
            ResourcePath::collection(collection),
        )
    }

    /// GET on a single entity by key.
    pub fn read_by_key(
        version: ODataVersion,
        service_path: impl Into<String>,
        collection: impl Into<String>,
        key: EntityKey,
    ) -> Self {
        Self::new(
            RequestKind::ReadByKey,
            version,
            service_path,
            ResourcePath::entity(collection, key),
        )
    }

    /// POST a new entity into a collection.
    pub fn create(
        version: ODataVersion,
        service_path: impl Into<String>,
        collection: impl Into<String>,
        payload: Value,
    ) -> Self {
        let mut request = Self::new(
            RequestKind::Create,
            version,
            service_path,
            ResourcePath::collection(collection),
        );
        request.payload = Some(payload);
        request
    }

    /// Update an entity by key; PATCH by default, PUT via
    /// [`with_update_strategy`](Self::with_update_strategy).
    pub fn update(
        version: ODataVersion,
        service_path: impl Into<String>,
        collection: impl Into<String>,
        key: EntityKey,
        payload: Value,
    ) -> Self {
        let mut request = Self::new(
            RequestKind::Update,
            version,
            service_path,
            ResourcePath::entity(collection, key),
        );
        request.payload = Some(payload);
        request
    }

    /// DELETE an entity by key.
    pub fn delete(
        version: ODataVersion,
        service_path: impl Into<String>,
        collection: impl Into<String>,
        key: EntityKey,
    ) -> Self {
        Self::new(
            RequestKind::Delete,
            version,
            service_path,
            ResourcePath::entity(collection, key),
        )
    }

    /// GET invocation of a function at an arbitrary resource path.
    pub fn function(
        version: ODataVersion,
        service_path: impl Into<String>,
        path: ResourcePath,
    ) -> Self {
        Self::new(RequestKind::Function, version, service_path, path)
    }

    /// POST invocation of an action with a JSON parameter payload.
    pub fn action(
        version: ODataVersion,
        service_path: impl Into<String>,
        path: ResourcePath,
        payload: Option<Value>,
    ) -> Self {
        let mut request = Self::new(RequestKind::Action, version, service_path, path);
        request.payload = payload;
        request
    }

    /// Attaches a rendered [`StructuredQuery`](crate::query::StructuredQuery)
    /// as the query string.
    pub fn with_query(mut self, query: &crate::query::StructuredQuery) -> Self {
        self.encoded_query = Some(query.to_encoded_string());
        self
    }

    /// Attaches an already-encoded query string verbatim. Validated when the
    /// URI is built.
    pub fn with_encoded_query(mut self, query: impl Into<String>) -> Self {
        self.encoded_query = Some(query.into());
        self
    }

    pub fn with_update_strategy(mut self, strategy: UpdateStrategy) -> Self {
        self.update_strategy = strategy;
        self
    }

    /// Appends a header. Headers form an ordered multimap; repeated names
    /// are sent repeatedly, in insertion order.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets `If-Match` to a version identifier, typically a previously read
    /// `ETag`.
    pub fn if_match(self, version_identifier: impl Into<String>) -> Self {
        self.header("If-Match", version_identifier)
    }

    /// Sets `If-Match: *`, matching any entity version.
    pub fn if_match_any(self) -> Self {
        self.header("If-Match", "*")
    }

    /// Asks the service for server-driven paging with at most `size` items
    /// per page.
    pub fn prefer_max_page_size(self, size: u64) -> Self {
        self.header("Prefer", format!("odata.maxpagesize={size}"))
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn version(&self) -> ODataVersion {
        self.version
    }

    pub fn service_path(&self) -> &str {
        &self.service_path
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// The encoded query string attached to this request, if any.
    pub fn encoded_query(&self) -> Option<&str> {
        self.encoded_query.as_deref()
    }

    /// Explicitly set headers, in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(header, _)| header.eq_ignore_ascii_case(name))
    }

    /// The HTTP method for this request.
    pub fn method(&self) -> &'static str {
        match self.kind {
            RequestKind::Read | RequestKind::ReadByKey | RequestKind::Function => "GET",
            RequestKind::Create | RequestKind::Action => "POST",
            RequestKind::Update => match self.update_strategy {
                UpdateStrategy::Patch => "PATCH",
                UpdateStrategy::Put => "PUT",
            },
            RequestKind::Delete => "DELETE",
        }
    }

    /// The request URI relative to the host, encoded under the given
    /// strategy.
    pub fn relative_uri(&self, strategy: EncodeStrategy) -> crate::Result<String> {
        build_uri(
            &self.service_path,
            &self.resource_path.render(self.version),
            self.encoded_query.as_deref(),
            strategy,
        )
    }

    /// Headers as sent on the wire for a standalone request: the explicit
    /// headers plus `Accept: application/json` and, when a payload is
    /// present, `Content-Type: application/json`, unless overridden.
    pub fn wire_headers(&self) -> Vec<(String, String)> {
        let mut headers = self.headers.clone();
        if !self.has_header("Accept") {
            headers.push(("Accept".to_string(), "application/json".to_string()));
        }
        if self.payload.is_some() && !self.has_header("Content-Type") {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        headers
    }
}
