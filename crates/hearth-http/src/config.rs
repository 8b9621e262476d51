use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Port a server listens on if not configured otherwise.
pub const DEFAULT_PORT: u16 = 8820;

/// Construction time configuration of a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind to, all IPv4 interfaces by default.
    pub host: IpAddr,
    pub port: u16,
    /// Number of worker threads running the dispatcher, including the calling thread.
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::UNSPECIFIED.into(),
            port: DEFAULT_PORT,
            workers: 1,
        }
    }
}

impl ServerConfig {
    pub fn new(port: u16, workers: usize) -> Self {
        Self {
            port,
            workers,
            ..Default::default()
        }
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
