//! Wire-protocol engine for OData V2 and V4 services.
//!
//! The crate covers the full request/response cycle against an OData
//! service without any generated or typed model layer:
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`protocol`] | Protocol dialects and literal rendering |
//! | [`uri`] | Percent-encoding, resource paths, entity keys |
//! | [`query`] | `$select`/`$expand` trees, filters, ordering |
//! | [`request`] | Single requests and the multipart `$batch` encoder |
//! | [`response`] | Multipart decoding and payload accessors |
//! | [`executor`] | Transport, CSRF handling, health classification |
//! | [`paginate`] | Pull-based next-link pagination |
//!
//! # Example
//!
//! ```no_run
//! use odata_wire::{
//!     FilterExpression, ODataRequest, ODataVersion, RequestExecutor, StructuredQuery,
//! };
//!
//! # async fn run() -> odata_wire::Result<()> {
//! let executor = RequestExecutor::new("https://services.example.com")?;
//!
//! let query = StructuredQuery::on_entity("People", ODataVersion::V4)
//!     .select(["UserName", "FirstName"])
//!     .filter(FilterExpression::eq("FirstName", "Scott"))
//!     .top(10);
//! let request =
//!     ODataRequest::read(ODataVersion::V4, "/TripPinService", "People").with_query(&query);
//!
//! let mut response = executor.execute(&request).await?;
//! for person in response.as_list().await? {
//!     println!("{person}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod executor;
pub mod paginate;
pub mod protocol;
pub mod query;
pub mod request;
pub mod response;
pub mod uri;

pub use error::{DeserializationError, Error, ServiceError, ServiceErrorDetail};
pub use executor::{HttpTransport, RequestExecutor, ReqwestTransport, TransportError};
pub use paginate::Paginator;
pub use protocol::{Literal, ODataVersion};
pub use query::{ComparisonOp, FilterExpression, Order, OrderBy, StructuredQuery};
pub use request::{BatchItemHandle, BatchRequest, ODataRequest, RequestKind, UpdateStrategy};
pub use response::{BatchResponse, MultipartParser, ODataResponse};
pub use uri::{EncodeStrategy, EntityKey, ResourcePath};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed stream alias for async iteration.
pub type BoxStream<'a, T> = futures::stream::BoxStream<'a, T>;
