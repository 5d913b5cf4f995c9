//! Percent-encoding tuned to OData URI conventions.
//!
//! The character sets here are deliberately more permissive than generic URI
//! component encoding: sub-delimiters that are legal (and conventional) in
//! OData paths and query strings pass through unencoded, so that expressions
//! like `$filter=Name eq 'A&B'` stay readable on the wire. The vertical bar
//! is always encoded since several gateways reject it raw.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::Error;

/// Characters kept verbatim in path segments.
///
/// Unreserved characters plus the sub-delimiters OData paths legitimately
/// contain: `- . _ ~ ! $ ' ( ) * , ; & = @ : +`.
const PATH_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b',')
    .remove(b';')
    .remove(b'&')
    .remove(b'=')
    .remove(b'@')
    .remove(b':')
    .remove(b'+');

/// Characters kept verbatim in query values: the path set plus `/` and `?`.
const QUERY_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b',')
    .remove(b';')
    .remove(b'&')
    .remove(b'=')
    .remove(b'@')
    .remove(b':')
    .remove(b'+')
    .remove(b'/')
    .remove(b'?');

/// Like [`PATH_SET`] but with `;` and `=` encoded as well. Service paths
/// inside a `$batch` payload must not carry raw matrix parameters.
const BATCH_PATH_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b',')
    .remove(b'&')
    .remove(b'@')
    .remove(b':')
    .remove(b'+');

/// Where an encoded fragment will be placed, which decides how strict the
/// encoding has to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeStrategy {
    /// A path or query fragment of a top-level request URI.
    Regular,
    /// A request line inside a `$batch` multipart body.
    Batch,
}

fn is_hex(byte: u8) -> bool {
    byte.is_ascii_hexdigit()
}

/// Percent-encodes `input` against `set`, copying already-valid `%XX`
/// triplets through unchanged so the operation is idempotent.
fn encode_with(input: &str, set: &'static AsciiSet) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%'
            && index + 2 < bytes.len()
            && is_hex(bytes[index + 1])
            && is_hex(bytes[index + 2])
        {
            out.push_str(&input[index..index + 3]);
            index += 3;
            continue;
        }
        // Find the next '%' so multi-byte characters stay intact.
        let mut end = index;
        while end < bytes.len() && bytes[end] != b'%' {
            end += 1;
        }
        if end == index {
            out.push_str("%25");
            index += 1;
        } else {
            out.extend(utf8_percent_encode(&input[index..end], set));
            index = end;
        }
    }
    out
}

/// Encodes a path segment for use in a request URI.
pub fn encode_path_segment(input: &str) -> String {
    encode_with(input, PATH_SET)
}

/// Encodes a query value for use in a request URI.
pub fn encode_query(input: &str) -> String {
    encode_with(input, QUERY_SET)
}

/// Encodes an already-assembled service path, preserving `/` separators.
/// Under the [`EncodeStrategy::Batch`] strategy `;` and `=` are encoded too.
pub fn encode_service_path(input: &str, strategy: EncodeStrategy) -> String {
    let set = match strategy {
        EncodeStrategy::Regular => PATH_SET,
        EncodeStrategy::Batch => BATCH_PATH_SET,
    };
    input
        .split('/')
        .map(|segment| encode_with(segment, set))
        .collect::<Vec<_>>()
        .join("/")
}

/// Checks that a query string contains only characters legal after encoding.
///
/// Rejects whitespace, control characters and the reserved characters the
/// query set would have encoded. A `%` is accepted only as part of a valid
/// `%XX` triplet.
pub fn validate_query(query: &str) -> crate::Result<()> {
    let bytes = query.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        let byte = bytes[index];
        if byte == b'%' {
            if index + 2 >= bytes.len() || !is_hex(bytes[index + 1]) || !is_hex(bytes[index + 2]) {
                return Err(Error::encoding(format!(
                    "query contains a bare '%' at position {index}: {query}"
                )));
            }
            index += 3;
            continue;
        }
        let legal = byte.is_ascii_alphanumeric()
            || matches!(
                byte,
                b'-' | b'.'
                    | b'_'
                    | b'~'
                    | b'!'
                    | b'$'
                    | b'\''
                    | b'('
                    | b')'
                    | b'*'
                    | b','
                    | b';'
                    | b'&'
                    | b'='
                    | b'@'
                    | b':'
                    | b'+'
                    | b'/'
                    | b'?'
            );
        if !legal {
            return Err(Error::encoding(format!(
                "query contains illegal character {:?} at position {index}: {query}",
                byte as char
            )));
        }
        index += 1;
    }
    Ok(())
}

/// Normalizes a service path to the canonical `/path` form: exactly one
/// leading slash, no trailing slash, repeated slashes collapsed. A path
/// without any segments stays empty.
pub fn sanitize_service_path(input: &str) -> String {
    let segments: Vec<&str> = input
        .trim()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.is_empty() {
        String::new()
    } else {
        format!("/{}", segments.join("/"))
    }
}
