use std::{
    io,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use bytes::{Buf, Bytes, BytesMut};
use hearth::{Completion, Continuation, Dispatcher, Stream};
use memchr::memmem;
use mio::{Interest, Token};
use tracing::{event, Level};

use crate::{
    net::{channel::Channel, completion, is_pending, is_retry, Progress},
    Ready, Registry, Wake,
};

const READ_CHUNK: usize = 4096;

/// Accepted TCP connection, optionally carrying a TLS session.
///
/// Operations are attempted immediately when issued, and resumed on readiness events.
pub struct TcpStream {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<Registry>,
    token: Token,
    peer_addr: SocketAddr,
    state: Mutex<State>,
}

struct State {
    socket: mio::net::TcpStream,
    channel: Channel,
    read: Option<PendingRead>,
    write: Option<PendingWrite>,
}

enum PendingRead {
    Until {
        buffer: BytesMut,
        delimiter: &'static [u8],
        done: Continuation<(BytesMut, usize)>,
    },
    Exact {
        buffer: BytesMut,
        remaining: usize,
        done: Continuation<BytesMut>,
    },
}

struct PendingWrite {
    data: Bytes,
    done: Continuation<()>,
}

impl TcpStream {
    pub(crate) fn open(
        registry: Arc<Registry>,
        socket: mio::net::TcpStream,
        peer_addr: SocketAddr,
        channel: Channel,
    ) -> io::Result<Self> {
        event!(Level::DEBUG, ?peer_addr, "opening stream");

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let token = registry.insert(Arc::new(weak.clone()));

            let state = State {
                socket,
                channel,
                read: None,
                write: None,
            };
            Inner {
                registry: registry.clone(),
                token,
                peer_addr,
                state: Mutex::new(state),
            }
        });

        // Register for mio events, if this fails dropping `inner` cleans up the handler
        {
            let mut state = inner.lock();
            let interest = Interest::READABLE | Interest::WRITABLE;
            registry.register(&mut state.socket, inner.token, interest)?;
        }

        Ok(Self { inner })
    }
}

impl Stream for TcpStream {
    fn read_until(
        &self,
        dispatcher: &Dispatcher,
        buffer: BytesMut,
        delimiter: &'static [u8],
        done: Continuation<(BytesMut, usize)>,
    ) {
        let pending = PendingRead::Until {
            buffer,
            delimiter,
            done,
        };
        self.inner.start_read(dispatcher, pending);
    }

    fn read_exact(
        &self,
        dispatcher: &Dispatcher,
        buffer: BytesMut,
        count: usize,
        done: Continuation<BytesMut>,
    ) {
        let pending = PendingRead::Exact {
            buffer,
            remaining: count,
            done,
        };
        self.inner.start_read(dispatcher, pending);
    }

    fn write_all(&self, dispatcher: &Dispatcher, data: Bytes, done: Continuation<()>) {
        let pending = PendingWrite { data, done };
        self.inner.start_write(dispatcher, pending);
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.inner.peer_addr)
    }
}

impl Inner {
    fn start_read(&self, dispatcher: &Dispatcher, pending: PendingRead) {
        let completion = {
            let mut state = self.lock();
            if state.read.is_some() {
                Some(pending.fail(busy_error()))
            } else {
                state.read = Some(pending);
                state.progress_read()
            }
        };

        if let Some(completion) = completion {
            dispatcher.post(completion);
        }
    }

    fn start_write(&self, dispatcher: &Dispatcher, pending: PendingWrite) {
        let completion = {
            let mut state = self.lock();
            if state.write.is_some() {
                Some(completion(pending.done, Err(busy_error())))
            } else {
                state.write = Some(pending);
                state.progress_write()
            }
        };

        if let Some(completion) = completion {
            dispatcher.post(completion);
        }
    }

    fn on_ready(&self, dispatcher: &Dispatcher, ready: Ready) {
        event!(Level::TRACE, ?ready, "stream ready");

        let mut completions = Vec::new();
        {
            let mut state = self.lock();

            if ready.readable {
                completions.extend(state.progress_read());
            }

            if ready.writable {
                // TLS output can be left over from reading, even without a pending write
                if let Err(error) = state.flush_channel() {
                    event!(Level::DEBUG, "failed to flush channel: {}", error);
                }
                completions.extend(state.progress_write());
            }
        }

        for completion in completions {
            dispatcher.post(completion);
        }
    }

    fn lock(&self) -> MutexGuard<State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Wake for Weak<Inner> {
    fn wake(&self, dispatcher: &Dispatcher, ready: Ready) {
        if let Some(inner) = self.upgrade() {
            inner.on_ready(dispatcher, ready);
        }
    }

    fn shutdown(&self) {
        let Some(inner) = self.upgrade() else {
            return;
        };

        // Continuations can own this stream, drop them after unlocking
        let pending = {
            let mut state = inner.lock();
            (state.read.take(), state.write.take())
        };
        drop(pending);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        event!(Level::DEBUG, peer_addr = ?self.peer_addr, "closing stream");

        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.channel.close(&mut state.socket);

        if let Err(error) = self.registry.remove(&mut state.socket, self.token) {
            event!(Level::DEBUG, "failed to deregister stream: {}", error);
        }
    }
}

impl State {
    fn progress_read(&mut self) -> Option<Completion> {
        match self.read.take()? {
            PendingRead::Until {
                mut buffer,
                delimiter,
                done,
            } => match self.fill_until(&mut buffer, delimiter) {
                Some(result) => Some(completion(done, result.map(|len| (buffer, len)))),
                None => {
                    self.read = Some(PendingRead::Until {
                        buffer,
                        delimiter,
                        done,
                    });
                    None
                }
            },
            PendingRead::Exact {
                mut buffer,
                mut remaining,
                done,
            } => match self.fill_exact(&mut buffer, &mut remaining) {
                Some(result) => Some(completion(done, result.map(|_| buffer))),
                None => {
                    self.read = Some(PendingRead::Exact {
                        buffer,
                        remaining,
                        done,
                    });
                    None
                }
            },
        }
    }

    fn fill_until(&mut self, buffer: &mut BytesMut, delimiter: &[u8]) -> Progress<usize> {
        let mut searched = 0;

        loop {
            if let Some(position) = memmem::find(&buffer[searched..], delimiter) {
                return Some(Ok(searched + position + delimiter.len()));
            }

            // A delimiter can straddle the boundary of what we've already got
            searched = buffer.len().saturating_sub(delimiter.len().saturating_sub(1));

            match self.recv_into(buffer, READ_CHUNK) {
                Ok(0) => return Some(Err(io::ErrorKind::UnexpectedEof.into())),
                Ok(_) => {}
                Err(error) if is_pending(&error) => return None,
                Err(error) if is_retry(&error) => {}
                Err(error) => return Some(Err(error)),
            }
        }
    }

    fn fill_exact(&mut self, buffer: &mut BytesMut, remaining: &mut usize) -> Progress<()> {
        while *remaining > 0 {
            match self.recv_into(buffer, (*remaining).min(READ_CHUNK)) {
                Ok(0) => return Some(Err(io::ErrorKind::UnexpectedEof.into())),
                Ok(read) => *remaining -= read,
                Err(error) if is_pending(&error) => return None,
                Err(error) if is_retry(&error) => {}
                Err(error) => return Some(Err(error)),
            }
        }

        Some(Ok(()))
    }

    /// Receive at most `limit` bytes, appending them to `buffer`.
    fn recv_into(&mut self, buffer: &mut BytesMut, limit: usize) -> io::Result<usize> {
        let start = buffer.len();
        buffer.resize(start + limit, 0);

        let result = self.channel.recv(&mut self.socket, &mut buffer[start..]);

        let read = *result.as_ref().unwrap_or(&0);
        buffer.truncate(start + read);

        result
    }

    fn progress_write(&mut self) -> Option<Completion> {
        let mut pending = self.write.take()?;

        loop {
            if pending.data.is_empty() {
                return match self.flush_channel() {
                    Ok(true) => Some(completion(pending.done, Ok(()))),
                    Ok(false) => {
                        self.write = Some(pending);
                        None
                    }
                    Err(error) => Some(completion(pending.done, Err(error))),
                };
            }

            match self.channel.send(&mut self.socket, &pending.data) {
                Ok(0) => {
                    let error = io::ErrorKind::WriteZero.into();
                    return Some(completion(pending.done, Err(error)));
                }
                Ok(sent) => pending.data.advance(sent),
                Err(error) if is_pending(&error) => {
                    self.write = Some(pending);
                    return None;
                }
                Err(error) if is_retry(&error) => {}
                Err(error) => return Some(completion(pending.done, Err(error))),
            }
        }
    }

    fn flush_channel(&mut self) -> io::Result<bool> {
        self.channel.flush(&mut self.socket)
    }
}

impl PendingRead {
    fn fail(self, error: io::Error) -> Completion {
        match self {
            PendingRead::Until { done, .. } => completion(done, Err(error)),
            PendingRead::Exact { done, .. } => completion(done, Err(error)),
        }
    }
}

fn busy_error() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "operation already pending on stream")
}
