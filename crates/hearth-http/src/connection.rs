use std::{
    io, mem,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use bytes::{Bytes, BytesMut};
use hearth::{continuation, Dispatcher, Stream};
use tracing::{event, span, Level, Span};

use crate::{
    reader::{self, HEAD_DELIMITER},
    response::INTERNAL_ERROR,
    ReadError, Request, Response, Routes,
};

/// Where a connection is in its request/response cycle.
enum Phase {
    /// Waiting for a complete request head.
    AwaitingRequest,
    /// Head parsed, waiting for the rest of a declared body.
    ReadingBody {
        request: Request,
        declared: usize,
        remaining: usize,
    },
    /// Request complete, to be routed and handled.
    Routing(Request),
    /// Response ready to be sent.
    Writing { response: Bytes, persistent: bool },
    Closed,
}

/// Outcome of a transport operation, resuming a suspended connection.
enum Outcome {
    Head(io::Result<(BytesMut, usize)>),
    Body {
        request: Request,
        declared: usize,
        result: io::Result<BytesMut>,
    },
    Written {
        persistent: bool,
        result: io::Result<()>,
    },
}

/// A single HTTP connection, serving requests one after another.
///
/// The connection owns itself while suspended, by moving into the continuation of its pending
/// transport operation. Only one operation is pending at a time, so completions of one
/// connection never overlap. When no operation is pending anymore the connection drops,
/// releasing the stream.
pub struct Connection<S> {
    stream: Arc<S>,
    routes: Arc<Routes>,
    /// Bytes read past the end of the current message.
    buffer: BytesMut,
    span: Span,
}

impl<S: Stream> Connection<S> {
    pub fn open(stream: S, routes: Arc<Routes>) -> Self {
        let span = span!(Level::INFO, "connection", peer_addr = ?stream.peer_addr());
        span.in_scope(|| event!(Level::DEBUG, "connection opened"));

        Self {
            stream: Arc::new(stream),
            routes,
            buffer: BytesMut::new(),
            span,
        }
    }

    /// Start reading the first request.
    pub fn start(self, dispatcher: &Dispatcher) {
        self.advance(dispatcher, Phase::AwaitingRequest);
    }

    /// Step through phases until the connection suspends on the transport, or closes.
    fn advance(mut self, dispatcher: &Dispatcher, mut phase: Phase) {
        let span = self.span.clone();
        let _entered = span.enter();

        loop {
            phase = match phase {
                Phase::AwaitingRequest => {
                    let stream = self.stream.clone();
                    let buffer = mem::take(&mut self.buffer);

                    let done = continuation(move |dispatcher, result| {
                        self.resume(dispatcher, Outcome::Head(result))
                    });
                    stream.read_until(dispatcher, buffer, HEAD_DELIMITER, done);
                    return;
                }
                Phase::ReadingBody {
                    request,
                    declared,
                    remaining,
                } => {
                    let stream = self.stream.clone();
                    let buffer = mem::take(&mut self.buffer);

                    let done = continuation(move |dispatcher, result| {
                        let outcome = Outcome::Body {
                            request,
                            declared,
                            result,
                        };
                        self.resume(dispatcher, outcome)
                    });
                    stream.read_exact(dispatcher, buffer, remaining, done);
                    return;
                }
                Phase::Routing(request) => self.respond(request),
                Phase::Writing {
                    response,
                    persistent,
                } => {
                    let stream = self.stream.clone();

                    let done = continuation(move |dispatcher, result| {
                        self.resume(dispatcher, Outcome::Written { persistent, result })
                    });
                    stream.write_all(dispatcher, response, done);
                    return;
                }
                Phase::Closed => {
                    event!(Level::DEBUG, "connection closed");
                    return;
                }
            };
        }
    }

    fn resume(mut self, dispatcher: &Dispatcher, outcome: Outcome) {
        let span = self.span.clone();

        let phase = span.in_scope(|| match outcome {
            Outcome::Head(result) => self.on_head(result),
            Outcome::Body {
                request,
                declared,
                result,
            } => self.on_body(request, declared, result),
            Outcome::Written { persistent, result } => on_written(persistent, result),
        });

        self.advance(dispatcher, phase);
    }

    fn on_head(&mut self, result: io::Result<(BytesMut, usize)>) -> Phase {
        match self.read_head(result) {
            Ok(phase) => phase,
            Err(error) => {
                event!(Level::DEBUG, ?error, "failed to read request");
                Phase::Closed
            }
        }
    }

    fn read_head(&mut self, result: io::Result<(BytesMut, usize)>) -> Result<Phase, ReadError> {
        let (mut buffer, head_len) = result?;

        let head = buffer.split_to(head_len);
        let mut request = reader::parse_head(&head)?;
        request.remote_addr = self.stream.peer_addr();

        event!(
            Level::DEBUG,
            method = %request.method,
            path = %request.path,
            version = %request.version,
            "received request"
        );

        // Whatever follows the head is kept for the body, or for the next request
        self.buffer = buffer;

        let Some(declared) = reader::body_length(&request)? else {
            return Ok(Phase::Routing(request));
        };

        let remaining = reader::remaining_body(declared, self.buffer.len())?;
        let phase = if remaining == 0 {
            Phase::Routing(self.take_body(request, declared))
        } else {
            Phase::ReadingBody {
                request,
                declared,
                remaining,
            }
        };
        Ok(phase)
    }

    fn on_body(
        &mut self,
        request: Request,
        declared: usize,
        result: io::Result<BytesMut>,
    ) -> Phase {
        match result {
            Ok(buffer) => {
                self.buffer = buffer;
                Phase::Routing(self.take_body(request, declared))
            }
            Err(error) => {
                event!(Level::DEBUG, ?error, "failed to read request body");
                Phase::Closed
            }
        }
    }

    fn take_body(&mut self, mut request: Request, declared: usize) -> Request {
        request.body = Some(self.buffer.split_to(declared).freeze());
        request
    }

    fn respond(&self, mut request: Request) -> Phase {
        let Some(route) = self.routes.resolve(&request.path, &request.method) else {
            event!(Level::DEBUG, "no route for request, closing");
            return Phase::Closed;
        };
        request.captures = route.captures;

        let persistent = request.is_persistent();
        let mut response = Response::new();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            (route.handler)(&mut response, &request)
        }));

        match result {
            Ok(()) => Phase::Writing {
                response: response.into_bytes(),
                persistent,
            },
            Err(_) => {
                event!(Level::ERROR, path = %request.path, "handler panicked");
                Phase::Writing {
                    response: Bytes::from_static(INTERNAL_ERROR),
                    persistent: false,
                }
            }
        }
    }
}

fn on_written(persistent: bool, result: io::Result<()>) -> Phase {
    match result {
        Ok(()) if persistent => Phase::AwaitingRequest,
        Ok(()) => Phase::Closed,
        Err(error) => {
            event!(Level::DEBUG, ?error, "failed to write response");
            Phase::Closed
        }
    }
}
