use std::{io, sync::Arc};

use hearth::{continuation, Dispatcher, Transport};
use tracing::{event, Level};

use crate::{connection::Connection, Routes};

/// Keeps exactly one accept pending on a transport, opening a connection for every accepted
/// stream.
pub struct Acceptor<T> {
    transport: T,
    routes: Arc<Routes>,
}

impl<T: Transport> Acceptor<T> {
    pub fn new(transport: T, routes: Arc<Routes>) -> Arc<Self> {
        Arc::new(Self { transport, routes })
    }

    pub fn start(self: Arc<Self>, dispatcher: &Dispatcher) {
        let this = self.clone();
        let done = continuation(move |dispatcher, result| this.on_accepted(dispatcher, result));

        self.transport.accept(dispatcher, done);
    }

    fn on_accepted(self: Arc<Self>, dispatcher: &Dispatcher, result: io::Result<T::Stream>) {
        // Re-arm before processing, accepting never waits on a connection
        self.clone().start(dispatcher);

        match result {
            Ok(stream) => Connection::open(stream, self.routes.clone()).start(dispatcher),
            Err(error) => event!(Level::WARN, ?error, "failed to accept connection"),
        }
    }
}
