use std::{
    collections::VecDeque,
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use bytes::{Bytes, BytesMut};
use hearth::{continuation, Continuation, Dispatcher, Stream, Transport};

/// In-memory transport handing out scripted streams, in the order they were connected.
///
/// Once out of streams, accepts stay pending forever.
#[derive(Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    accepted: Arc<AtomicUsize>,
    journal: Journal,
}

/// Every transport and stream operation issued by the server, in order.
type Journal = Arc<Mutex<Vec<&'static str>>>;

enum Scripted {
    Stream(MockStream),
    Fail,
}

impl MockTransport {
    /// Queue a connection that delivers `chunks` to the server, one chunk per transport read.
    pub fn connect(&self, chunks: &[&[u8]]) -> MockConnection {
        let shared = Arc::new(Shared::default());
        {
            let mut input = shared.input.lock().unwrap();
            input.extend(chunks.iter().map(|chunk| chunk.to_vec()));
        }

        let stream = MockStream {
            shared: shared.clone(),
            journal: self.journal.clone(),
        };
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Stream(stream));

        MockConnection { shared }
    }

    /// Queue an accept that fails, ahead of connections queued after it.
    pub fn fail_next_accept(&self) {
        self.script.lock().unwrap().push_back(Scripted::Fail);
    }

    pub fn journal(&self) -> Vec<&'static str> {
        self.journal.lock().unwrap().clone()
    }

    /// Number of streams handed out so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    type Stream = MockStream;

    fn accept(&self, dispatcher: &Dispatcher, done: Continuation<MockStream>) {
        self.journal.lock().unwrap().push("accept");
        let next = self.script.lock().unwrap().pop_front();

        match next {
            Some(Scripted::Stream(stream)) => {
                self.accepted.fetch_add(1, Ordering::SeqCst);
                dispatcher.complete(done, Ok(stream));
            }
            Some(Scripted::Fail) => {
                let error = io::Error::new(io::ErrorKind::Other, "too many open files");
                dispatcher.complete(done, Err(error));
            }
            None => {}
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

#[derive(Default)]
struct Shared {
    input: Mutex<VecDeque<Vec<u8>>>,
    output: Mutex<Vec<u8>>,
    writes: AtomicUsize,
    pending: AtomicBool,
    overlapped: AtomicBool,
    closed: AtomicBool,
}

/// Test side of a scripted connection.
#[derive(Clone)]
pub struct MockConnection {
    shared: Arc<Shared>,
}

impl MockConnection {
    /// Everything the server wrote, as text.
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.shared.output.lock().unwrap()).into_owned()
    }

    pub fn writes(&self) -> usize {
        self.shared.writes.load(Ordering::SeqCst)
    }

    /// Returns true if the server released its stream.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Returns true if an operation was ever issued while another still was pending.
    pub fn overlapped(&self) -> bool {
        self.shared.overlapped.load(Ordering::SeqCst)
    }
}

pub struct MockStream {
    shared: Arc<Shared>,
    journal: Journal,
}

impl MockStream {
    fn begin(&self, operation: &'static str) {
        self.journal.lock().unwrap().push(operation);
        if self.shared.pending.swap(true, Ordering::SeqCst) {
            self.shared.overlapped.store(true, Ordering::SeqCst);
        }
    }

    fn finish<T>(&self, dispatcher: &Dispatcher, done: Continuation<T>, result: io::Result<T>)
    where
        T: Send + 'static,
    {
        let shared = self.shared.clone();
        let done = continuation(move |dispatcher, result| {
            shared.pending.store(false, Ordering::SeqCst);
            done(dispatcher, result)
        });

        dispatcher.complete(done, result);
    }

    fn next_chunk(&self) -> Option<Vec<u8>> {
        self.shared.input.lock().unwrap().pop_front()
    }
}

impl Stream for MockStream {
    fn read_until(
        &self,
        dispatcher: &Dispatcher,
        mut buffer: BytesMut,
        delimiter: &'static [u8],
        done: Continuation<(BytesMut, usize)>,
    ) {
        self.begin("read");

        loop {
            if let Some(position) = find(&buffer, delimiter) {
                let len = position + delimiter.len();
                self.finish(dispatcher, done, Ok((buffer, len)));
                return;
            }

            let Some(chunk) = self.next_chunk() else {
                self.finish(dispatcher, done, Err(io::ErrorKind::UnexpectedEof.into()));
                return;
            };
            buffer.extend_from_slice(&chunk);
        }
    }

    fn read_exact(
        &self,
        dispatcher: &Dispatcher,
        mut buffer: BytesMut,
        count: usize,
        done: Continuation<BytesMut>,
    ) {
        self.begin("read");

        let mut remaining = count;
        while remaining > 0 {
            let Some(mut chunk) = self.next_chunk() else {
                self.finish(dispatcher, done, Err(io::ErrorKind::UnexpectedEof.into()));
                return;
            };

            // Leave what isn't asked for to the next read
            if chunk.len() > remaining {
                let rest = chunk.split_off(remaining);
                self.shared.input.lock().unwrap().push_front(rest);
            }

            remaining -= chunk.len();
            buffer.extend_from_slice(&chunk);
        }

        self.finish(dispatcher, done, Ok(buffer));
    }

    fn write_all(&self, dispatcher: &Dispatcher, data: Bytes, done: Continuation<()>) {
        self.begin("write");

        self.shared.output.lock().unwrap().extend_from_slice(&data);
        self.shared.writes.fetch_add(1, Ordering::SeqCst);

        self.finish(dispatcher, done, Ok(()));
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
