use std::{
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use anyhow::{Context as _, Error};
use hearth::{Dispatcher, Reactor};
use mio::{event::Source, Events, Interest, Poll, Token, Waker};
use thunderdome::{Arena, Index};
use tracing::{event, instrument, Level};

const WAKER_TOKEN: Token = Token(usize::MAX);

/// Receiver of readiness events for a registered source.
pub trait Wake: Send + Sync {
    /// Called on a dispatcher worker when the source becomes ready.
    fn wake(&self, dispatcher: &Dispatcher, ready: Ready);

    /// Drop the pending operations of the source without completing them.
    fn shutdown(&self);
}

pub type WakeHandler = Arc<dyn Wake>;

/// Shared mio context registry.
///
/// Sources register a wake handler, and get woken through it when mio reports readiness.
/// The registry is the `Reactor` of a dispatcher, one idle worker at a time waits in `poll`.
pub struct Registry {
    poll: Mutex<PollState>,
    registry: mio::Registry,
    waker: Waker,
    handlers: Mutex<Arena<WakeHandler>>,
}

struct PollState {
    poll: Poll,
    events: Events,
}

impl Registry {
    /// Create a new registry, with its own mio `Poll`.
    #[instrument("Registry::new", skip_all)]
    pub fn new() -> Result<Arc<Self>, Error> {
        let poll = Poll::new().context("failed to create poll")?;
        let registry = poll
            .registry()
            .try_clone()
            .context("failed to clone mio registry")?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN).context("failed to create waker")?;

        let state = PollState {
            poll,
            events: Events::with_capacity(256),
        };
        let this = Self {
            poll: Mutex::new(state),
            registry,
            waker,
            handlers: Mutex::new(Arena::new()),
        };
        Ok(Arc::new(this))
    }

    /// Store a wake handler, returning the token to register sources with.
    pub fn insert(&self, handler: WakeHandler) -> Token {
        let index = self.lock_handlers().insert(handler);
        Token(index.to_bits() as usize)
    }

    /// Register a source for edge-triggered readiness events on `token`.
    pub fn register<S>(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        self.registry.register(source, token, interest)
    }

    /// Deregister a source, and drop the wake handler of its token.
    pub fn remove<S>(&self, source: &mut S, token: Token) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        if let Some(index) = Index::from_bits(token.0 as u64) {
            self.lock_handlers().remove(index);
        }

        self.registry.deregister(source)
    }

    fn lock_handlers(&self) -> MutexGuard<Arena<WakeHandler>> {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Reactor for Registry {
    fn turn(&self, dispatcher: &Dispatcher) -> Result<(), Error> {
        let mut state = self.poll.lock().unwrap_or_else(PoisonError::into_inner);
        let PollState { poll, events } = &mut *state;

        match poll.poll(events, None) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(error) => return Err(error).context("failed to poll"),
        }

        // Route events to the correct destination
        let handlers = self.lock_handlers();
        for event in events.iter() {
            if event.token() == WAKER_TOKEN {
                continue;
            }

            let handler = Index::from_bits(event.token().0 as u64)
                .and_then(|index| handlers.get(index))
                .cloned();
            let Some(handler) = handler else {
                event!(Level::TRACE, "readiness for removed source");
                continue;
            };

            // Closed and errored sockets have to be woken too, so pending operations fail
            let ready = Ready {
                readable: event.is_readable() || event.is_read_closed() || event.is_error(),
                writable: event.is_writable() || event.is_write_closed() || event.is_error(),
            };

            event!(Level::TRACE, ?ready, "sending wake");
            dispatcher.post(move |dispatcher| handler.wake(dispatcher, ready));
        }

        Ok(())
    }

    fn interrupt(&self) -> Result<(), Error> {
        self.waker.wake().context("failed to wake poll")?;
        Ok(())
    }

    fn shutdown(&self) {
        // Handlers drop continuations that may deregister their source, so not under the lock
        let handlers: Vec<WakeHandler> = self
            .lock_handlers()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();

        event!(Level::DEBUG, sources = handlers.len(), "releasing sources");
        for handler in handlers {
            handler.shutdown();
        }
    }
}

/// Readiness of a registered source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    pub readable: bool,
    pub writable: bool,
}
