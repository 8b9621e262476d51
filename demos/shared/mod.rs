use std::{io::Write, net::IpAddr};

use anyhow::Error;
use clap::Args;
use hearth::Transport;
use hearth_http::{Request, Response, Server, ServerConfig, DEFAULT_PORT};
use tracing::{event, Level};

/// Options shared by all demo servers.
#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: IpAddr,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Number of worker threads.
    #[arg(long, default_value_t = 1)]
    pub workers: usize,
}

impl ServerArgs {
    pub fn config(&self) -> ServerConfig {
        ServerConfig::new(self.port, self.workers).with_host(self.host)
    }
}

/// Register the demo routes on a server.
pub fn add_routes<T: Transport>(server: &mut Server<T>) -> Result<(), Error> {
    server
        .resource("^/info/?$")?
        .method("GET", |response: &mut Response, request: &Request| {
            let body = format!(
                "method: {}\npath: {}\nversion: {}\nremote: {:?}\n",
                request.method, request.path, request.version, request.remote_addr
            );
            send(response, "200 OK", "text/plain", &body);
        });

    server
        .resource(r"^/match/([0-9]+)$")?
        .method("GET", |response: &mut Response, request: &Request| {
            let number = request.capture(1).unwrap_or_default();
            send(response, "200 OK", "text/plain", number);
        });

    server
        .resource("^/echo/?$")?
        .method("POST", |response: &mut Response, request: &Request| {
            let body = request.body.as_deref().unwrap_or_default();
            let body = String::from_utf8_lossy(body);
            send(response, "200 OK", "text/plain", &body);
        });

    server
        .default_resource("^/.*$")?
        .method("GET", |response: &mut Response, request: &Request| {
            event!(Level::INFO, path = %request.path, "serving default page");
            send(response, "200 OK", "text/html", PAGE);
        });

    Ok(())
}

fn send(response: &mut Response, status: &str, content_type: &str, body: &str) {
    let result = write!(
        response,
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );

    if let Err(error) = result {
        event!(Level::ERROR, ?error, "failed to write response");
    }
}

const PAGE: &str = "<!DOCTYPE html><html><body><h1>Hello, World!</h1></body></html>";
