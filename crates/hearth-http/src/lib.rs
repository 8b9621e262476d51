//! HTTP/1.x request pipeline for hearth.
//!
//! A [`Server`] accepts connections on a transport and serves requests on each connection one
//! after another. Every request is matched against the registered routes, and the matched
//! handler writes the raw response to a [`Response`].
//!
//! ```no_run
//! use std::io::Write;
//!
//! use hearth_http::{HttpServer, Request, Response, ServerConfig};
//!
//! # fn main() -> Result<(), anyhow::Error> {
//! let mut server = HttpServer::bind(&ServerConfig::default())?;
//!
//! server.resource("/hello/?")?.method("GET", |response: &mut Response, _: &Request| {
//!     let _ = response.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
//! });
//!
//! server.start()?;
//! # Ok(())
//! # }
//! ```

mod acceptor;
mod config;
mod connection;
mod error;
pub mod reader;
mod request;
mod response;
mod routing;
mod server;

pub use self::{
    config::{ServerConfig, DEFAULT_PORT},
    error::{ReadError, RouteError},
    request::Request,
    response::Response,
    routing::{Handler, ResolvedRoute, RouteEntry, RouteTable, Routes},
    server::{HttpServer, HttpsServer, Server},
};
