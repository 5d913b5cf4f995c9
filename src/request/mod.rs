//! Request construction: single CRUD/function requests and the multipart
//! `$batch` encoder.

mod batch;
mod single;

pub use batch::{BatchItemHandle, BatchRequest};
pub use single::{ODataRequest, RequestKind, UpdateStrategy};
