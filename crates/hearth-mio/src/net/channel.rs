use std::io::{self, Read, Write};

use mio::net::TcpStream;
use rustls::ServerConnection;

use crate::net::is_pending;

/// Byte channel layered over a socket, either passing bytes through or running a TLS session.
pub(crate) enum Channel {
    Plain,
    Tls(Box<ServerConnection>),
}

impl Channel {
    /// Receive plaintext into `buf`, `Ok(0)` means the peer closed the stream.
    pub fn recv(&mut self, socket: &mut TcpStream, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Channel::Plain => socket.read(buf),
            Channel::Tls(session) => recv_tls(session, socket, buf),
        }
    }

    /// Send plaintext, returning how much of `data` was taken.
    pub fn send(&mut self, socket: &mut TcpStream, data: &[u8]) -> io::Result<usize> {
        match self {
            Channel::Plain => socket.write(data),
            Channel::Tls(session) => send_tls(session, socket, data),
        }
    }

    /// Write out anything the channel buffered, `Ok(false)` if the socket is full.
    pub fn flush(&mut self, socket: &mut TcpStream) -> io::Result<bool> {
        match self {
            Channel::Plain => Ok(true),
            Channel::Tls(session) => flush_tls(session, socket),
        }
    }

    /// Best-effort notify the peer that we're closing.
    pub fn close(&mut self, socket: &mut TcpStream) {
        if let Channel::Tls(session) = self {
            session.send_close_notify();
            let _ = flush_tls(session, socket);
        }
    }
}

fn recv_tls(
    session: &mut ServerConnection,
    socket: &mut TcpStream,
    buf: &mut [u8],
) -> io::Result<usize> {
    loop {
        match session.reader().read(buf) {
            Ok(read) => return Ok(read),
            Err(error) if is_pending(&error) => {}
            Err(error) => return Err(error),
        }

        // No plaintext available yet, pull more records off the socket
        if session.read_tls(socket)? == 0 {
            return Ok(0);
        }

        // Processing can produce handshake messages or alerts, those have to go out either way
        let result = session.process_new_packets();
        flush_tls(session, socket)?;
        result.map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
    }
}

fn send_tls(
    session: &mut ServerConnection,
    socket: &mut TcpStream,
    data: &[u8],
) -> io::Result<usize> {
    let mut sent = session.writer().write(data)?;
    let flushed = flush_tls(session, socket)?;

    // The session's send buffer was full, but the socket took all of it, so there's room now
    if sent == 0 && flushed {
        sent = session.writer().write(data)?;
        flush_tls(session, socket)?;
    }

    if sent == 0 {
        return Err(io::ErrorKind::WouldBlock.into());
    }

    Ok(sent)
}

fn flush_tls(session: &mut ServerConnection, socket: &mut TcpStream) -> io::Result<bool> {
    while session.wants_write() {
        match session.write_tls(socket) {
            Ok(_) => {}
            Err(error) if is_pending(&error) => return Ok(false),
            Err(error) => return Err(error),
        }
    }

    Ok(true)
}
