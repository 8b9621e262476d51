//! Parsing of request heads, and body length bookkeeping.

use std::collections::HashMap;

use crate::{ReadError, Request};

/// Blank line separating the head from the body.
pub const HEAD_DELIMITER: &[u8] = b"\r\n\r\n";

const CONTENT_LENGTH: &str = "Content-Length";

/// Parse the request line and header fields of a request head.
///
/// Header parsing stops at the first line that isn't a header field, which normally is the
/// blank line ending the head.
pub fn parse_head(head: &[u8]) -> Result<Request, ReadError> {
    let text = String::from_utf8_lossy(head);

    // CRLF is the required newline, but a bare LF is accepted the same
    let mut lines = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line));

    let line = lines.next().unwrap_or_default();
    let (method, path, version) = parse_request_line(line)
        .ok_or_else(|| ReadError::MalformedRequestLine(line.to_string()))?;

    let mut headers = HashMap::new();
    for line in lines {
        let Some((name, value)) = parse_field(line) else {
            break;
        };
        headers.insert(name.to_string(), value.to_string());
    }

    let request = Request {
        method: method.to_string(),
        path: path.to_string(),
        version: version.to_string(),
        headers,
        ..Default::default()
    };
    Ok(request)
}

/// Split `METHOD SP PATH SP "HTTP/" VERSION`, none of the parts may contain spaces.
fn parse_request_line(line: &str) -> Option<(&str, &str, &str)> {
    let (method, rest) = line.split_once(' ')?;
    let (path, version) = rest.split_once(' ')?;
    let version = version.strip_prefix("HTTP/")?;

    if version.contains(' ') {
        return None;
    }

    Some((method, path, version))
}

/// Split `NAME ":" [SP] VALUE`.
fn parse_field(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    let value = value.strip_prefix(' ').unwrap_or(value);

    Some((name, value))
}

/// Get the declared body length of a request, if any.
pub fn body_length(request: &Request) -> Result<Option<usize>, ReadError> {
    let Some(value) = request.header(CONTENT_LENGTH) else {
        return Ok(None);
    };

    let length = value
        .trim()
        .parse()
        .map_err(|_| ReadError::InvalidContentLength(value.to_string()))?;
    Ok(Some(length))
}

/// Get how many body bytes still have to be read, given how many already are buffered.
pub fn remaining_body(declared: usize, buffered: usize) -> Result<usize, ReadError> {
    declared
        .checked_sub(buffered)
        .ok_or(ReadError::BodyOverrun { declared, buffered })
}
