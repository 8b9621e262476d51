use std::io;

use thiserror::Error;

/// Failed to read a request from a connection.
///
/// Any of these end the connection without a response.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("transport failed while reading")]
    Transport(#[from] io::Error),

    #[error("malformed request line {0:?}")]
    MalformedRequestLine(String),

    #[error("invalid content length {0:?}")]
    InvalidContentLength(String),

    #[error("{buffered} body bytes already buffered, but only {declared} declared")]
    BodyOverrun { declared: usize, buffered: usize },
}

/// Failed to register a route.
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("invalid route pattern {pattern:?}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
