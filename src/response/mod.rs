//! Response interpretation: multipart decoding of `$batch` bodies and the
//! payload accessors of executed requests.

pub mod multipart;
mod result;

pub use multipart::{EmbeddedResponse, MultipartParser, RawSegment, ResponseSegment};
pub use result::{BatchResponse, ODataResponse};
