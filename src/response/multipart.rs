//! Decoding of `multipart/mixed` batch response bodies.
//!
//! The parser splits a body at its boundary delimiters into top-level
//! segments, recursing one level into changeset segments. Iteration over
//! the parsed segments is a terminal operation and may happen once;
//! [`MultipartParser::to_list`] materializes the segments for repeated
//! access.

use crate::error::{DeserializationError, Error};

/// The raw lines of one part of a multipart document.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSegment {
    pub lines: Vec<String>,
}

impl RawSegment {
    /// The header block of the segment, the lines before the first blank.
    fn header_lines(&self) -> &[String] {
        let end = self
            .lines
            .iter()
            .position(|line| line.is_empty())
            .unwrap_or(self.lines.len());
        &self.lines[..end]
    }

    /// Value of a header in the segment's own header block.
    fn header(&self, name: &str) -> Option<&str> {
        self.header_lines().iter().find_map(|line| {
            let (header, value) = line.split_once(':')?;
            if header.trim().eq_ignore_ascii_case(name) {
                Some(value.trim())
            } else {
                None
            }
        })
    }

    /// The lines after the segment's own header block and its blank line.
    fn content_lines(&self) -> &[String] {
        match self.lines.iter().position(|line| line.is_empty()) {
            Some(blank) => &self.lines[blank + 1..],
            None => &[],
        }
    }
}

/// A top-level part of a batch response: one response, or a changeset
/// containing several.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseSegment {
    Single(RawSegment),
    Changeset(Vec<RawSegment>),
}

/// Extracts the `boundary` parameter from a `Content-Type` header value.
pub(crate) fn boundary_from_content_type(content_type: &str) -> crate::Result<String> {
    for parameter in content_type.split(';') {
        if let Some((name, value)) = parameter.split_once('=') {
            if name.trim().eq_ignore_ascii_case("boundary") {
                return Ok(value.trim().trim_matches('"').to_string());
            }
        }
    }
    Err(Error::illegal_usage("No delimiter found in HTTP header."))
}

/// Extracts the `charset` parameter from a `Content-Type` header value.
pub(crate) fn charset_from_content_type(content_type: &str) -> Option<String> {
    for parameter in content_type.split(';') {
        if let Some((name, value)) = parameter.split_once('=') {
            if name.trim().eq_ignore_ascii_case("charset") {
                return Some(value.trim().trim_matches('"').to_ascii_lowercase());
            }
        }
    }
    None
}

/// Splits `body` at `--boundary` / `--boundary--` lines. Tolerates CRLF and
/// LF endings and a leading blank line; a body without any delimiter yields
/// no segments.
fn split_at_boundary(body: &str, boundary: &str) -> Vec<RawSegment> {
    let delimiter = format!("--{boundary}");
    let terminator = format!("--{boundary}--");

    let mut segments = Vec::new();
    let mut current: Option<Vec<String>> = None;
    for raw_line in body.split('\n') {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if line == terminator {
            if let Some(lines) = current.take() {
                segments.push(RawSegment { lines });
            }
            break;
        }
        if line == delimiter {
            if let Some(lines) = current.take() {
                segments.push(RawSegment { lines });
            }
            current = Some(Vec::new());
            continue;
        }
        if let Some(lines) = &mut current {
            lines.push(line.to_string());
        }
    }
    if let Some(lines) = current.take() {
        // tolerated: truncated body without the closing delimiter
        segments.push(RawSegment { lines });
    }
    segments
}

const STREAM_CONSUMED: &str = "stream has already been operated upon or closed";

/// Parses a batch response body into its [`ResponseSegment`]s.
#[derive(Debug)]
pub struct MultipartParser {
    segments: Vec<ResponseSegment>,
    consumed: bool,
}

impl MultipartParser {
    /// Parses `body` against the given outer boundary. Segments announcing
    /// a nested `multipart/mixed` content type are split once more into
    /// their changeset members.
    pub fn parse(body: &str, boundary: &str) -> Self {
        let segments = split_at_boundary(body, boundary)
            .into_iter()
            .map(|segment| {
                let nested_boundary = segment
                    .header("Content-Type")
                    .filter(|value| value.to_ascii_lowercase().contains("multipart/mixed"))
                    .and_then(|value| boundary_from_content_type(value).ok());
                match nested_boundary {
                    Some(inner) => {
                        let content = segment.content_lines().join("\n");
                        ResponseSegment::Changeset(split_at_boundary(&content, &inner))
                    }
                    None => ResponseSegment::Single(segment),
                }
            })
            .collect();
        Self {
            segments,
            consumed: false,
        }
    }

    fn take(&mut self) -> crate::Result<Vec<ResponseSegment>> {
        if self.consumed {
            return Err(Error::illegal_usage(STREAM_CONSUMED));
        }
        self.consumed = true;
        Ok(std::mem::take(&mut self.segments))
    }

    /// Iterates the parsed segments. Terminal: a second pass fails.
    pub fn iter_segments(
        &mut self,
    ) -> crate::Result<impl Iterator<Item = ResponseSegment>> {
        Ok(self.take()?.into_iter())
    }

    /// Materializes the segments for repeated access. Terminal as well.
    pub fn to_list(&mut self) -> crate::Result<Vec<ResponseSegment>> {
        self.take()
    }
}

/// One HTTP response embedded in a batch part: status line, headers, body.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedResponse {
    pub status: u16,
    /// Response headers, minus the `application/http` envelope headers.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl EmbeddedResponse {
    /// Parses the `application/http` content of a segment.
    pub fn parse(segment: &RawSegment) -> crate::Result<Self> {
        let content = segment.content_lines();
        let status_line = content
            .first()
            .filter(|line| !line.is_empty())
            .ok_or_else(|| {
                Error::Deserialization(DeserializationError::new(
                    "batch part does not contain an HTTP response",
                ))
            })?;

        // "HTTP/1.1 200 OK"
        let mut words = status_line.split_whitespace();
        let protocol = words.next().unwrap_or_default();
        let status = words
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .filter(|_| protocol.starts_with("HTTP/"))
            .ok_or_else(|| {
                Error::Deserialization(DeserializationError::new(format!(
                    "malformed status line in batch part: {status_line:?}"
                )))
            })?;

        let mut headers = Vec::new();
        let mut body_start = content.len();
        for (index, line) in content.iter().enumerate().skip(1) {
            if line.is_empty() {
                body_start = index + 1;
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
        }

        let body = content[body_start.min(content.len())..]
            .join("\n")
            .trim_end()
            .to_string();

        Ok(Self {
            status,
            headers,
            body,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|(header, value)| {
            if header.eq_ignore_ascii_case(name) {
                Some(value.as_str())
            } else {
                None
            }
        })
    }

    /// Charset of the embedded body, when declared; UTF-8 otherwise.
    pub fn charset(&self) -> String {
        self.header("Content-Type")
            .and_then(charset_from_content_type)
            .unwrap_or_else(|| "utf-8".to_string())
    }
}
