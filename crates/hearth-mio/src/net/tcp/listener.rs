use std::{
    io,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use anyhow::{Context as _, Error};
use hearth::{Completion, Continuation, Dispatcher};
use mio::{Interest, Token};
use tracing::{event, Level};

use crate::{
    net::{completion, is_pending, is_retry},
    Ready, Registry, Wake,
};

pub(crate) type Accepted = (mio::net::TcpStream, SocketAddr);

/// Non-blocking TCP listener with a single pending accept operation.
pub(crate) struct Listener {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<Registry>,
    token: Token,
    local_addr: SocketAddr,
    state: Mutex<State>,
}

struct State {
    socket: mio::net::TcpListener,
    pending: Option<Continuation<Accepted>>,
    /// The last accept failed, the next attempt waits for readiness.
    failed: bool,
}

impl Listener {
    pub fn bind(registry: Arc<Registry>, addr: SocketAddr) -> Result<Self, Error> {
        event!(Level::DEBUG, ?addr, "binding");

        // Create the socket
        let socket = mio::net::TcpListener::bind(addr).context("failed to bind listener")?;
        let local_addr = socket.local_addr()?;

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let token = registry.insert(Arc::new(weak.clone()));

            let state = State {
                socket,
                pending: None,
                failed: false,
            };
            Inner {
                registry: registry.clone(),
                token,
                local_addr,
                state: Mutex::new(state),
            }
        });

        // Register the socket for ready events
        {
            let mut state = inner.lock();
            registry
                .register(&mut state.socket, inner.token, Interest::READABLE)
                .context("failed to register listener")?;
        }

        Ok(Self { inner })
    }

    pub fn accept(&self, dispatcher: &Dispatcher, done: Continuation<Accepted>) {
        let completion = {
            let mut state = self.inner.lock();
            if state.pending.is_some() {
                let error = io::Error::new(io::ErrorKind::Other, "accept already pending");
                Some(completion(done, Err(error)))
            } else {
                state.arm(done)
            }
        };

        if let Some(completion) = completion {
            dispatcher.post(completion);
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }
}

impl Inner {
    fn on_ready(&self, dispatcher: &Dispatcher, ready: Ready) {
        if !ready.readable {
            return;
        }

        let completion = {
            let mut state = self.lock();
            state.failed = false;
            state.progress()
        };
        if let Some(completion) = completion {
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

        // The pending accept can own this listener, drop it after unlocking
        let pending = inner.lock().pending.take();
        drop(pending);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        event!(Level::DEBUG, "closing listener");

        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Err(error) = self.registry.remove(&mut state.socket, self.token) {
            event!(Level::DEBUG, "failed to deregister listener: {}", error);
        }
    }
}

impl State {
    /// Store the pending accept, attempting it right away unless the last attempt failed.
    fn arm(&mut self, done: Continuation<Accepted>) -> Option<Completion> {
        self.pending = Some(done);

        if self.failed {
            event!(Level::TRACE, "accept deferred until readiness");
            return None;
        }

        self.progress()
    }

    fn progress(&mut self) -> Option<Completion> {
        self.progress_with(mio::net::TcpListener::accept)
    }

    fn progress_with<F>(&mut self, mut accept: F) -> Option<Completion>
    where
        F: FnMut(&mio::net::TcpListener) -> io::Result<Accepted>,
    {
        let done = self.pending.take()?;

        loop {
            match accept(&self.socket) {
                Ok(accepted) => {
                    event!(Level::DEBUG, remote_addr = ?accepted.1, "stream accepted");
                    return Some(completion(done, Ok(accepted)));
                }
                Err(error) if is_pending(&error) => {
                    self.pending = Some(done);
                    return None;
                }
                // The peer went away before we got to it, the next one may be fine
                Err(error)
                    if is_retry(&error) || error.kind() == io::ErrorKind::ConnectionAborted => {}
                Err(error) => {
                    self.failed = true;
                    return Some(completion(done, Err(error)));
                }
            }
        }
    }
}
