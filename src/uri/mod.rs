//! URI assembly: percent-encoding, service-path sanitation, resource paths
//! and entity-key predicates.

mod encode;
mod path;

pub use encode::{
    encode_path_segment, encode_query, encode_service_path, sanitize_service_path, validate_query,
    EncodeStrategy,
};
pub use path::{build_uri, extract_delta_token, extract_skip_token, EntityKey, ResourcePath};
