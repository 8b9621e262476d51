use std::io;

use bytes::{Bytes, BytesMut};

/// Sent in place of the response when a handler panics, after which the connection closes.
pub(crate) const INTERNAL_ERROR: &[u8] =
    b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Output sink a handler writes its response to.
///
/// Handlers write the complete raw response, status line, headers, and body. Nothing is added
/// or checked, the bytes are sent to the client as written.
#[derive(Debug, Default)]
pub struct Response {
    buffer: BytesMut,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.buffer.freeze()
    }
}

impl io::Write for Response {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
