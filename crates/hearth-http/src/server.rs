use std::{net::SocketAddr, sync::Arc};

use anyhow::Error;
use hearth::{Dispatcher, Transport};
use hearth_mio::{Registry, TcpTransport, TlsTransport};
use tracing::{event, instrument, Level};

use crate::{acceptor::Acceptor, RouteEntry, RouteError, Routes, ServerConfig};

/// Plain HTTP server over TCP.
pub type HttpServer = Server<TcpTransport>;

/// HTTPS server, TLS over TCP.
pub type HttpsServer = Server<TlsTransport>;

/// HTTP server, accepting connections on a transport and routing requests to handlers.
///
/// Routes are registered before the server starts, after which they can't change anymore.
pub struct Server<T> {
    dispatcher: Dispatcher,
    transport: T,
    routes: Routes,
    workers: usize,
}

impl<T: Transport> Server<T> {
    /// Create a server accepting on `transport`.
    ///
    /// The transport's completions must be delivered through `dispatcher`.
    pub fn new(dispatcher: Dispatcher, transport: T, workers: usize) -> Self {
        Self {
            dispatcher,
            transport,
            routes: Routes::default(),
            workers,
        }
    }

    /// Get the explicit route entry for `pattern`, registering it if it's new.
    ///
    /// The pattern is a regular expression that has to match the entire request path.
    pub fn resource(&mut self, pattern: &str) -> Result<&mut RouteEntry, RouteError> {
        self.routes.explicit.route(pattern)
    }

    /// Get the default route entry for `pattern`, registering it if it's new.
    ///
    /// Default routes are only consulted if no explicit route matches.
    pub fn default_resource(&mut self, pattern: &str) -> Result<&mut RouteEntry, RouteError> {
        self.routes.default.route(pattern)
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    /// Start accepting connections, without running any workers.
    ///
    /// Returns the dispatcher, which the caller drives with `run` or `run_until_idle`.
    #[instrument("Server::listen", skip_all)]
    pub fn listen(self) -> Dispatcher {
        event!(
            Level::INFO,
            addr = ?self.transport.local_addr(),
            explicit = self.routes.explicit.len(),
            default = self.routes.default.len(),
            "starting server"
        );

        let acceptor = Acceptor::new(self.transport, Arc::new(self.routes));
        acceptor.start(&self.dispatcher);

        self.dispatcher
    }

    /// Start accepting connections, and run the configured number of workers.
    ///
    /// Blocks until the dispatcher is stopped.
    pub fn start(self) -> Result<(), Error> {
        let workers = self.workers;
        let dispatcher = self.listen();

        dispatcher.run(workers)?;

        Ok(())
    }
}

impl Server<TcpTransport> {
    /// Bind a plain HTTP server as configured.
    pub fn bind(config: &ServerConfig) -> Result<Self, Error> {
        let registry = Registry::new()?;
        let dispatcher = Dispatcher::with_reactor(registry.clone());
        let transport = TcpTransport::bind(registry, config.socket_addr())?;

        Ok(Self::new(dispatcher, transport, config.workers))
    }
}

impl Server<TlsTransport> {
    /// Bind an HTTPS server as configured, using `tls` for the sessions.
    pub fn bind_tls(
        config: &ServerConfig,
        tls: Arc<rustls::ServerConfig>,
    ) -> Result<Self, Error> {
        let registry = Registry::new()?;
        let dispatcher = Dispatcher::with_reactor(registry.clone());
        let transport = TlsTransport::bind(registry, config.socket_addr(), tls)?;

        Ok(Self::new(dispatcher, transport, config.workers))
    }
}
