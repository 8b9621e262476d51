mod listener;
mod stream;

use std::{io, net::SocketAddr, sync::Arc};

use anyhow::Error;
use hearth::{Continuation, Dispatcher, Transport};
use tracing::{event, instrument, Level};

pub(crate) use self::listener::{Accepted, Listener};
pub use self::stream::TcpStream;

use crate::{net::channel::Channel, Registry};

/// Plain TCP transport, accepting unencrypted streams.
pub struct TcpTransport {
    registry: Arc<Registry>,
    listener: Listener,
}

impl TcpTransport {
    /// Bind a listener on `addr`, driven by `registry`.
    #[instrument("TcpTransport::bind", skip_all)]
    pub fn bind(registry: Arc<Registry>, addr: SocketAddr) -> Result<Self, Error> {
        let listener = Listener::bind(registry.clone(), addr)?;
        event!(Level::INFO, addr = ?listener.local_addr(), "listening");

        Ok(Self { registry, listener })
    }
}

impl Transport for TcpTransport {
    type Stream = TcpStream;

    fn accept(&self, dispatcher: &Dispatcher, done: Continuation<TcpStream>) {
        let registry = self.registry.clone();

        self.listener.accept(
            dispatcher,
            Box::new(move |dispatcher: &Dispatcher, result: io::Result<Accepted>| {
                let result = result.and_then(|(socket, peer_addr)| {
                    TcpStream::open(registry, socket, peer_addr, Channel::Plain)
                });
                done(dispatcher, result);
            }),
        );
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.listener.local_addr())
    }
}
