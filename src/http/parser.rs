use std::fmt;

use crate::http::headers::Headers;
use crate::http::request::{Method, Request};
use crate::http::response::StatusCode;

pub const DEFAULT_MAX_HEADER_BYTES: usize = 8 * 1024;
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Upper bounds applied while buffering a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Request line plus header block, including the terminating blank line
    pub max_header_bytes: usize,
    /// Largest `Content-Length` accepted
    pub max_body_bytes: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// More bytes are needed before a decision can be made.
    Incomplete,
    MalformedRequestLine,
    UnsupportedMethod(String),
    InvalidHeader,
    InvalidContentLength,
    /// Chunked (or any other) transfer coding is not implemented.
    UnsupportedTransferEncoding,
    HeadersTooLarge,
    PayloadTooLarge,
}

impl ParseError {
    /// Status code of the response sent back for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ParseError::Incomplete
            | ParseError::MalformedRequestLine
            | ParseError::InvalidHeader
            | ParseError::InvalidContentLength => StatusCode::BadRequest,
            ParseError::UnsupportedMethod(_) | ParseError::UnsupportedTransferEncoding => {
                StatusCode::NotImplemented
            }
            ParseError::HeadersTooLarge => StatusCode::RequestHeaderFieldsTooLarge,
            ParseError::PayloadTooLarge => StatusCode::PayloadTooLarge,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Incomplete => f.write_str("incomplete request"),
            ParseError::MalformedRequestLine => f.write_str("malformed request line"),
            ParseError::UnsupportedMethod(m) => write!(f, "unsupported method {:?}", m),
            ParseError::InvalidHeader => f.write_str("invalid header line"),
            ParseError::InvalidContentLength => f.write_str("invalid Content-Length"),
            ParseError::UnsupportedTransferEncoding => {
                f.write_str("Transfer-Encoding is not supported")
            }
            ParseError::HeadersTooLarge => f.write_str("header section too large"),
            ParseError::PayloadTooLarge => f.write_str("declared body too large"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parses one request from the front of `buf` using [`ParseLimits::default`].
///
/// On success returns the request and the number of bytes it occupied;
/// anything after that offset belongs to the next pipelined request.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    parse_http_request_with_limits(buf, &ParseLimits::default())
}

pub fn parse_http_request_with_limits(
    buf: &[u8],
    limits: &ParseLimits,
) -> Result<(Request, usize), ParseError> {
    // Request line
    let line_end = match find(buf, b"\r\n") {
        Some(idx) => idx,
        None => return Err(incomplete_or_too_large(buf, limits)),
    };
    let (method, path, version) = parse_request_line(&buf[..line_end])?;

    // Header section ends at the first blank line. Searching from the end of
    // the request line lets a request with no headers terminate immediately.
    let headers_end = match find(&buf[line_end..], b"\r\n\r\n") {
        Some(idx) => line_end + idx,
        None => return Err(incomplete_or_too_large(buf, limits)),
    };
    let body_start = headers_end + 4;
    if body_start > limits.max_header_bytes {
        return Err(ParseError::HeadersTooLarge);
    }

    let headers = if headers_end > line_end {
        parse_headers(&buf[line_end + 2..headers_end])?
    } else {
        Headers::new()
    };

    if headers.contains("Transfer-Encoding") {
        return Err(ParseError::UnsupportedTransferEncoding);
    }

    // Body
    let body = match headers.get("Content-Length") {
        None => None,
        Some(raw) => {
            let len = parse_content_length(raw)?;
            if len > limits.max_body_bytes {
                return Err(ParseError::PayloadTooLarge);
            }
            if buf.len() - body_start < len {
                return Err(ParseError::Incomplete);
            }
            Some(buf[body_start..body_start + len].to_vec())
        }
    };

    let consumed = body_start + body.as_ref().map_or(0, Vec::len);
    let request = Request {
        method,
        path,
        version,
        headers,
        body,
    };

    Ok((request, consumed))
}

fn parse_request_line(line: &[u8]) -> Result<(Method, String, String), ParseError> {
    let line = std::str::from_utf8(line).map_err(|_| ParseError::MalformedRequestLine)?;

    let mut parts = line.splitn(3, ' ');
    let method = parts.next().unwrap_or_default();
    let path = parts.next().ok_or(ParseError::MalformedRequestLine)?;
    let version = parts.next().ok_or(ParseError::MalformedRequestLine)?;

    if method.is_empty()
        || path.is_empty()
        || !version.starts_with("HTTP/")
        || version.contains(' ')
    {
        return Err(ParseError::MalformedRequestLine);
    }

    let method = Method::from_str(method)
        .ok_or_else(|| ParseError::UnsupportedMethod(method.to_string()))?;

    Ok((method, path.to_string(), version.to_string()))
}

fn parse_headers(block: &[u8]) -> Result<Headers, ParseError> {
    let mut headers = Headers::new();

    for line in split_lines(block) {
        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or(ParseError::InvalidHeader)?;
        let (name, value) = (&line[..colon], &line[colon + 1..]);
        if name.is_empty() || !name.iter().all(|b| b.is_ascii_graphic()) {
            return Err(ParseError::InvalidHeader);
        }
        let name = String::from_utf8_lossy(name);

        // Values may carry obs-text; undecodable bytes become U+FFFD.
        let value = String::from_utf8_lossy(trim_whitespace(value));

        // Repeated Content-Length values must agree.
        if name.eq_ignore_ascii_case("Content-Length")
            && headers.get("Content-Length").is_some_and(|prev| prev != value)
        {
            return Err(ParseError::InvalidContentLength);
        }

        headers.insert(name, value);
    }

    Ok(headers)
}

fn split_lines(block: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = Some(block);
    std::iter::from_fn(move || {
        let current = rest?;
        match find(current, b"\r\n") {
            Some(idx) => {
                rest = Some(&current[idx + 2..]);
                Some(&current[..idx])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

fn trim_whitespace(mut value: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', tail @ ..] = value {
        value = tail;
    }
    while let [head @ .., b' ' | b'\t'] = value {
        value = head;
    }
    value
}

fn parse_content_length(raw: &str) -> Result<usize, ParseError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidContentLength);
    }
    raw.parse::<usize>()
        .map_err(|_| ParseError::InvalidContentLength)
}

fn incomplete_or_too_large(buf: &[u8], limits: &ParseLimits) -> ParseError {
    if buf.len() > limits.max_header_bytes {
        ParseError::HeadersTooLarge
    } else {
        ParseError::Incomplete
    }
}

fn find(buf: &[u8], needle: &[u8]) -> Option<usize> {
    buf.windows(needle.len()).position(|w| w == needle)
}
