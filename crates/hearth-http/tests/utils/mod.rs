mod mock;

use std::{
    io::Write,
    net::SocketAddr,
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::{bail, Context as _, Error};
use hearth::{Dispatcher, Transport};
use hearth_http::{Request, Response, Server};
use rustls::{Certificate, PrivateKey};

pub use self::mock::{MockConnection, MockTransport};

pub type Recorder = Arc<Mutex<Vec<Request>>>;

pub fn given_mock_server() -> (Server<MockTransport>, MockTransport) {
    let transport = MockTransport::default();
    let server = Server::new(Dispatcher::new(), transport.clone(), 1);
    (server, transport)
}

pub fn given_recorder() -> Recorder {
    Arc::new(Mutex::new(Vec::new()))
}

/// Handler recording every request it receives, responding with `body`.
pub fn recording(
    recorder: &Recorder,
    body: &'static str,
) -> impl Fn(&mut Response, &Request) + Send + Sync + 'static {
    let recorder = recorder.clone();
    move |response: &mut Response, request: &Request| {
        recorder.lock().unwrap().push(request.clone());
        respond(response, body);
    }
}

pub fn respond(response: &mut Response, body: &str) {
    write!(response, "{}", ok_response(body)).unwrap();
}

pub fn ok_response(body: &str) -> String {
    format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}", body.len(), body)
}

/// Start the server, and run its completions on this thread until none are left.
pub fn when_served<T>(server: Server<T>)
where
    T: Transport,
{
    server.listen().run_until_idle();
}

pub fn then_recorded(recorder: &Recorder) -> Vec<Request> {
    recorder.lock().unwrap().clone()
}

/// Wait until every connection has been released by the server.
pub fn wait_closed(connections: &[MockConnection]) -> Result<(), Error> {
    let deadline = Instant::now() + Duration::from_secs(10);

    while !connections.iter().all(MockConnection::is_closed) {
        if Instant::now() > deadline {
            bail!("connections not closed in time");
        }
        thread::sleep(Duration::from_millis(5));
    }

    Ok(())
}

pub type Running = (Dispatcher, SocketAddr, JoinHandle<Result<(), Error>>);

/// Start a server bound to a real socket on a background thread.
pub fn given_started<T>(server: Server<T>) -> Result<Running, Error>
where
    T: Transport,
{
    let dispatcher = server.dispatcher().clone();
    let addr = server.local_addr().context("server has no local address")?;
    let worker = thread::spawn(move || server.start());

    Ok((dispatcher, addr, worker))
}

pub fn given_certificate() -> Result<(Vec<u8>, Certificate, PrivateKey), Error> {
    let generated = rcgen::generate_simple_self_signed(vec!["localhost".into()])?;
    let der = generated.serialize_der()?;
    let key = generated.serialize_private_key_der();

    Ok((der.clone(), Certificate(der), PrivateKey(key)))
}
