use std::{
    net::SocketAddr,
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
};

use anyhow::{Context as _, Error};
use bytes::BytesMut;
use hearth::{continuation, Dispatcher, RunError, Stream, Transport};
use hearth_mio::Registry;
use rustls::{Certificate, PrivateKey};

/// Start a dispatcher running on a background thread.
pub fn given_running_dispatcher(
    dispatcher: &Dispatcher,
) -> JoinHandle<Result<(), RunError>> {
    let dispatcher = dispatcher.clone();
    thread::spawn(move || dispatcher.run(2))
}

pub fn given_registry_dispatcher() -> Result<(Arc<Registry>, Dispatcher), Error> {
    let registry = Registry::new()?;
    let dispatcher = Dispatcher::with_reactor(registry.clone());
    Ok((registry, dispatcher))
}

pub fn given_certificate() -> Result<(Vec<u8>, Certificate, PrivateKey), Error> {
    let generated = rcgen::generate_simple_self_signed(vec!["localhost".into()])?;
    let der = generated.serialize_der()?;
    let key = generated.serialize_private_key_der();

    Ok((der.clone(), Certificate(der), PrivateKey(key)))
}

/// Accept one connection, read one line, and write it back.
///
/// The outcome of the read is reported on the returned channel.
pub fn given_line_echo<T>(
    dispatcher: &Dispatcher,
    transport: &Arc<T>,
) -> mpsc::Receiver<Result<Vec<u8>, String>>
where
    T: Transport,
{
    let (sender, receiver) = mpsc::channel();

    transport.accept(
        dispatcher,
        continuation(move |dispatcher, result: std::io::Result<T::Stream>| {
            let stream = match result {
                Ok(stream) => Arc::new(stream),
                Err(error) => {
                    let _ = sender.send(Err(error.to_string()));
                    return;
                }
            };

            let reader = stream.clone();
            reader.read_until(
                dispatcher,
                BytesMut::new(),
                b"\n",
                continuation(move |dispatcher, result: std::io::Result<(BytesMut, usize)>| {
                    let (buffer, len) = match result {
                        Ok(value) => value,
                        Err(error) => {
                            let _ = sender.send(Err(error.to_string()));
                            return;
                        }
                    };

                    let line = buffer.freeze().slice(..len);
                    let _ = sender.send(Ok(line.to_vec()));

                    let writer = stream.clone();
                    writer.write_all(
                        dispatcher,
                        line,
                        continuation(move |_, _| {
                            drop(stream);
                        }),
                    );
                }),
            );
        }),
    );

    receiver
}

pub fn local_addr<T>(transport: &T) -> Result<SocketAddr, Error>
where
    T: Transport,
{
    transport.local_addr().context("transport has no local address")
}
