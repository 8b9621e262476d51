use std::{io, net::SocketAddr};

use bytes::{Bytes, BytesMut};

use crate::Dispatcher;

/// Continuation of an asynchronous operation, run on the dispatcher with the outcome.
pub type Continuation<T> = Box<dyn FnOnce(&Dispatcher, io::Result<T>) + Send>;

/// A connected byte stream with asynchronous, completion based operations.
///
/// Every operation finishes by posting its continuation to the dispatcher it was issued on.
/// Callers issue at most one read and one write at a time.
pub trait Stream: Send + Sync + 'static {
    /// Read into `buffer` until it contains `delimiter`.
    ///
    /// Bytes already in `buffer` are inspected first. The stream may read past the delimiter,
    /// the continuation receives the buffer and the length up to and including the first
    /// delimiter.
    fn read_until(
        &self,
        dispatcher: &Dispatcher,
        buffer: BytesMut,
        delimiter: &'static [u8],
        done: Continuation<(BytesMut, usize)>,
    );

    /// Append exactly `count` bytes to `buffer`.
    fn read_exact(
        &self,
        dispatcher: &Dispatcher,
        buffer: BytesMut,
        count: usize,
        done: Continuation<BytesMut>,
    );

    /// Write all of `data` to the stream.
    fn write_all(&self, dispatcher: &Dispatcher, data: Bytes, done: Continuation<()>);

    /// Address of the remote peer, if known.
    fn peer_addr(&self) -> Option<SocketAddr>;
}

/// Capability to accept incoming connections.
///
/// Plain and secure transports are variants of this trait, the HTTP pipeline only depends on
/// the trait.
pub trait Transport: Send + Sync + 'static {
    /// Stream type of accepted connections.
    type Stream: Stream;

    /// Accept the next connection.
    fn accept(&self, dispatcher: &Dispatcher, done: Continuation<Self::Stream>);

    /// Local address connections are accepted on, if known.
    fn local_addr(&self) -> Option<SocketAddr>;
}

/// Box a closure as a `Continuation`.
pub fn continuation<T, F>(f: F) -> Continuation<T>
where
    F: FnOnce(&Dispatcher, io::Result<T>) + Send + 'static,
{
    Box::new(f)
}
