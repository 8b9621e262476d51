//! TLS transport, running a rustls server session over the TCP stream machinery.

use std::{fs::File, io, io::BufReader, net::SocketAddr, path::Path, sync::Arc};

use anyhow::{bail, Context as _, Error};
use hearth::{Continuation, Dispatcher, Transport};
use rustls::{Certificate, PrivateKey, ServerConfig, ServerConnection};
use rustls_pemfile::Item;
use tracing::{event, instrument, Level};

use crate::{
    net::{
        channel::Channel,
        tcp::{Accepted, Listener, TcpStream},
    },
    Registry,
};

/// TCP transport with a TLS session on every accepted connection.
///
/// The handshake runs as data flows through the stream, before the first request is read.
pub struct TlsTransport {
    registry: Arc<Registry>,
    listener: Listener,
    config: Arc<ServerConfig>,
}

impl TlsTransport {
    /// Bind a listener on `addr`, driven by `registry`, accepting TLS sessions using `config`.
    #[instrument("TlsTransport::bind", skip_all)]
    pub fn bind(
        registry: Arc<Registry>,
        addr: SocketAddr,
        config: Arc<ServerConfig>,
    ) -> Result<Self, Error> {
        let listener = Listener::bind(registry.clone(), addr)?;
        event!(Level::INFO, addr = ?listener.local_addr(), "listening for tls");

        Ok(Self {
            registry,
            listener,
            config,
        })
    }
}

impl Transport for TlsTransport {
    type Stream = TcpStream;

    fn accept(&self, dispatcher: &Dispatcher, done: Continuation<TcpStream>) {
        let registry = self.registry.clone();
        let config = self.config.clone();

        self.listener.accept(
            dispatcher,
            Box::new(move |dispatcher: &Dispatcher, result: io::Result<Accepted>| {
                let result = result.and_then(|(socket, peer_addr)| {
                    let session = ServerConnection::new(config)
                        .map_err(|error| io::Error::new(io::ErrorKind::Other, error))?;
                    let channel = Channel::Tls(Box::new(session));
                    TcpStream::open(registry, socket, peer_addr, channel)
                });
                done(dispatcher, result);
            }),
        );
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.listener.local_addr())
    }
}

/// Create a server configuration for a single certificate chain.
pub fn server_config(
    certificates: Vec<Certificate>,
    key: PrivateKey,
) -> Result<Arc<ServerConfig>, Error> {
    let config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certificates, key)
        .context("invalid certificate or key")?;

    Ok(Arc::new(config))
}

/// Load a server configuration from PEM encoded certificate chain and private key files.
#[instrument("tls::load_server_config", skip_all)]
pub fn load_server_config(
    certificates_path: &Path,
    key_path: &Path,
) -> Result<Arc<ServerConfig>, Error> {
    event!(Level::DEBUG, ?certificates_path, ?key_path, "loading tls config");

    let file = File::open(certificates_path).context("failed to open certificates")?;
    let certificates = rustls_pemfile::certs(&mut BufReader::new(file))
        .context("failed to parse certificates")?;
    if certificates.is_empty() {
        bail!("no certificates found in {}", certificates_path.display());
    }
    let certificates = certificates.into_iter().map(Certificate).collect();

    let file = File::open(key_path).context("failed to open private key")?;
    let key = read_private_key(&mut BufReader::new(file))?
        .with_context(|| format!("no private key found in {}", key_path.display()))?;

    server_config(certificates, key)
}

fn read_private_key(reader: &mut dyn io::BufRead) -> Result<Option<PrivateKey>, Error> {
    while let Some(item) = rustls_pemfile::read_one(reader).context("failed to parse key")? {
        match item {
            Item::PKCS8Key(key) | Item::RSAKey(key) | Item::ECKey(key) => {
                return Ok(Some(PrivateKey(key)));
            }
            _ => {}
        }
    }

    Ok(None)
}
