use std::{collections::HashMap, io, net::SocketAddr};

use bytes::{Buf, Bytes};

/// Version numbers above this keep the connection open after the response.
const PERSISTENT_VERSION: f64 = 1.05;

/// A parsed HTTP request.
///
/// Created once per message, and owned by the connection's current cycle until it is handled.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: String,
    pub path: String,
    /// Version text following `HTTP/` in the request line, for example `1.1`.
    pub version: String,
    /// Header fields, keys as received, the last occurrence of a name wins.
    pub headers: HashMap<String, String>,
    /// Request body, only present if a `Content-Length` was declared.
    pub body: Option<Bytes>,
    /// Groups captured by the matched route pattern, index 0 is the whole path.
    ///
    /// Groups that didn't participate in the match are empty.
    pub captures: Vec<String>,
    pub remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Get a header value, the name is matched exactly.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Get a captured path group.
    pub fn capture(&self, index: usize) -> Option<&str> {
        self.captures.get(index).map(String::as_str)
    }

    /// Read the body as a stream, empty if there's no body.
    pub fn body_reader(&self) -> impl io::Read {
        self.body.clone().unwrap_or_default().reader()
    }

    /// Returns true if the connection should be kept open after responding to this request.
    ///
    /// Versions that don't parse as a number close the connection.
    pub fn is_persistent(&self) -> bool {
        self.version
            .parse::<f64>()
            .map(|version| version > PERSISTENT_VERSION)
            .unwrap_or(false)
    }
}
