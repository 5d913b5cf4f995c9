use std::fmt;

use uuid::Uuid;

use crate::error::Error;
use crate::protocol::ODataVersion;
use crate::request::ODataRequest;
use crate::uri::{build_uri, sanitize_service_path, EncodeStrategy};

/// Source of boundary identifiers. Injectable so tests can render
/// byte-stable bodies.
type UuidSource = Box<dyn FnMut() -> Uuid + Send>;

/// Position of a request within a batch, used to correlate the decoded
/// response segments back to the request that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchItemHandle {
    outer: usize,
    inner: Option<usize>,
}

impl BatchItemHandle {
    /// Index of the top-level batch part.
    pub fn outer(&self) -> usize {
        self.outer
    }

    /// Index within the part's changeset, if the request is part of one.
    pub fn inner(&self) -> Option<usize> {
        self.inner
    }
}

struct ChangesetMember {
    request: ODataRequest,
    content_id: u32,
}

enum BatchItem {
    Single(ODataRequest),
    Changeset {
        boundary: String,
        members: Vec<ChangesetMember>,
    },
}

/// Encodes several requests into one `multipart/mixed` POST against the
/// service's `$batch` endpoint.
///
/// Reads and function invocations are added as standalone parts; mutations
/// must go inside a changeset, opened with
/// [`begin_changeset`](Self::begin_changeset) and closed with
/// [`end_changeset`](Self::end_changeset). `Content-ID`s are assigned to
/// changeset members from a batch-wide counter, in the order requests are
/// added. All embedded requests must share the batch's service path and
/// protocol version; mismatches fail at add time.
pub struct BatchRequest {
    version: ODataVersion,
    service_path: String,
    boundary: String,
    items: Vec<BatchItem>,
    headers: Vec<(String, String)>,
    uuid_source: UuidSource,
    next_content_id: u32,
    changeset_open: bool,
}

impl fmt::Debug for BatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchRequest")
            .field("version", &self.version)
            .field("service_path", &self.service_path)
            .field("boundary", &self.boundary)
            .field("items", &self.items.len())
            .finish()
    }
}

impl BatchRequest {
    /// A batch with random boundaries.
    pub fn new(version: ODataVersion, service_path: impl Into<String>) -> Self {
        Self::with_uuid_source(version, service_path, Box::new(Uuid::new_v4))
    }

    /// A batch whose boundary identifiers come from the given source. The
    /// batch boundary is drawn immediately; each changeset draws one when it
    /// is begun.
    pub fn with_uuid_source(
        version: ODataVersion,
        service_path: impl Into<String>,
        mut uuid_source: UuidSource,
    ) -> Self {
        let boundary = format!("batch_{}", uuid_source());
        Self {
            version,
            service_path: sanitize_service_path(&service_path.into()),
            boundary,
            items: Vec::new(),
            headers: Vec::new(),
            uuid_source,
            next_content_id: 1,
            changeset_open: false,
        }
    }

    pub fn version(&self) -> ODataVersion {
        self.version
    }

    pub fn service_path(&self) -> &str {
        &self.service_path
    }

    /// The outer batch boundary, without the leading dashes.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Appends a header to the outer `$batch` request.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn check_compatible(&self, request: &ODataRequest) -> crate::Result<()> {
        if request.version() != self.version {
            return Err(Error::construction(format!(
                "batch is {} but request is {}",
                self.version,
                request.version()
            )));
        }
        if sanitize_service_path(request.service_path()) != self.service_path {
            return Err(Error::construction(format!(
                "batch is bound to service path {:?} but request targets {:?}",
                self.service_path,
                request.service_path()
            )));
        }
        Ok(())
    }

    fn add_standalone(&mut self, request: ODataRequest) -> crate::Result<BatchItemHandle> {
        if self.changeset_open {
            return Err(Error::construction(
                "reads cannot be added while a changeset is open",
            ));
        }
        if request.kind().is_mutating() {
            return Err(Error::construction(
                "modifying requests must be added inside a changeset",
            ));
        }
        self.check_compatible(&request)?;
        let handle = BatchItemHandle {
            outer: self.items.len(),
            inner: None,
        };
        self.items.push(BatchItem::Single(request));
        Ok(handle)
    }

    /// Adds a collection or by-key read as a standalone batch part.
    pub fn add_read(&mut self, request: ODataRequest) -> crate::Result<BatchItemHandle> {
        self.add_standalone(request)
    }

    /// Adds a function invocation as a standalone batch part.
    pub fn add_function(&mut self, request: ODataRequest) -> crate::Result<BatchItemHandle> {
        self.add_standalone(request)
    }

    /// Opens a changeset. Subsequent [`add_change`](Self::add_change) calls
    /// land in it until [`end_changeset`](Self::end_changeset).
    pub fn begin_changeset(&mut self) -> crate::Result<&mut Self> {
        if self.changeset_open {
            return Err(Error::construction("a changeset is already open"));
        }
        let boundary = format!("changeset_{}", (self.uuid_source)());
        self.items.push(BatchItem::Changeset {
            boundary,
            members: Vec::new(),
        });
        self.changeset_open = true;
        Ok(self)
    }

    /// Adds a modifying request to the open changeset.
    pub fn add_change(&mut self, request: ODataRequest) -> crate::Result<BatchItemHandle> {
        if !self.changeset_open {
            return Err(Error::construction(
                "modifying requests require an open changeset",
            ));
        }
        if !request.kind().is_mutating() {
            return Err(Error::construction(
                "only modifying requests can be part of a changeset",
            ));
        }
        self.check_compatible(&request)?;
        let content_id = self.next_content_id;
        self.next_content_id += 1;
        let outer = self.items.len() - 1;
        // changeset_open guarantees the last item is the open changeset
        match self.items.last_mut() {
            Some(BatchItem::Changeset { members, .. }) => {
                let handle = BatchItemHandle {
                    outer,
                    inner: Some(members.len()),
                };
                members.push(ChangesetMember {
                    request,
                    content_id,
                });
                Ok(handle)
            }
            _ => Err(Error::construction("no open changeset to add to")),
        }
    }

    /// Closes the open changeset.
    pub fn end_changeset(&mut self) -> crate::Result<&mut Self> {
        if !self.changeset_open {
            return Err(Error::construction("no changeset is open"));
        }
        self.changeset_open = false;
        Ok(self)
    }

    /// The URI of the `$batch` endpoint, relative to the host.
    pub fn relative_uri(&self) -> crate::Result<String> {
        build_uri(&self.service_path, "$batch", None, EncodeStrategy::Regular)
    }

    /// Headers of the outer request: content type with the batch boundary,
    /// the protocol version and any explicitly added headers.
    pub fn wire_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            (
                "Content-Type".to_string(),
                format!("multipart/mixed;boundary={}", self.boundary),
            ),
            (
                "OData-Version".to_string(),
                self.version.version_str().to_string(),
            ),
        ];
        headers.extend(self.headers.iter().cloned());
        headers
    }

    fn request_lines(
        &self,
        request: &ODataRequest,
        content_id: Option<u32>,
    ) -> crate::Result<Vec<String>> {
        let mut lines = vec![
            "Content-Type: application/http".to_string(),
            "Content-Transfer-Encoding: binary".to_string(),
        ];
        if let Some(id) = content_id {
            lines.push(format!("Content-ID: {id}"));
        }
        lines.push(String::new());
        lines.push(format!(
            "{} {} HTTP/1.1",
            request.method(),
            request.relative_uri(EncodeStrategy::Batch)?
        ));
        for (name, value) in request.headers() {
            lines.push(format!("{name}: {value}"));
        }
        if request.payload().is_some() && !request.has_header("Content-Type") {
            lines.push("Content-Type: application/json".to_string());
        }
        lines.push(String::new());
        if let Some(payload) = request.payload() {
            lines.push(payload.to_string());
        }
        lines.push(String::new());
        Ok(lines)
    }

    /// Renders the multipart body with CRLF line endings. An empty batch
    /// renders just the closing delimiter.
    pub fn body(&self) -> crate::Result<String> {
        if self.changeset_open {
            return Err(Error::construction(
                "cannot render a batch while a changeset is open",
            ));
        }
        let mut lines: Vec<String> = Vec::new();
        for item in &self.items {
            lines.push(format!("--{}", self.boundary));
            match item {
                BatchItem::Single(request) => {
                    lines.extend(self.request_lines(request, None)?);
                }
                BatchItem::Changeset { boundary, members } => {
                    lines.push(format!("Content-Type: multipart/mixed;boundary={boundary}"));
                    lines.push(String::new());
                    for member in members {
                        lines.push(format!("--{boundary}"));
                        lines.extend(self.request_lines(&member.request, Some(member.content_id))?);
                    }
                    lines.push(format!("--{boundary}--"));
                    lines.push(String::new());
                }
            }
        }
        lines.push(format!("--{}--", self.boundary));
        lines.push(String::new());
        Ok(lines.join("\r\n"))
    }
}
