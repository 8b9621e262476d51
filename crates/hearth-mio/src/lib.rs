//! Mio reactor and TCP/TLS transports for hearth.
//!
//! A [`Registry`] owns the mio `Poll` and is installed into a `hearth::Dispatcher` as its
//! reactor. Sockets registered with it are driven by readiness events, which are dispatched as
//! completions on the dispatcher's workers.

pub mod net;
mod registry;

pub use self::{
    net::{
        tcp::{TcpStream, TcpTransport},
        tls::TlsTransport,
    },
    registry::{Ready, Registry, Wake, WakeHandler},
};
