mod channel;
pub mod tcp;
pub mod tls;

use std::io::{self, ErrorKind};

use hearth::{Completion, Continuation, Dispatcher};

/// Outcome of trying to make progress on a non-blocking operation.
///
/// `None` means the socket ran out of data or buffer space, and the operation stays pending
/// until the next readiness event.
type Progress<T> = Option<io::Result<T>>;

fn completion<T>(done: Continuation<T>, result: io::Result<T>) -> Completion
where
    T: Send + 'static,
{
    Box::new(move |dispatcher: &Dispatcher| done(dispatcher, result))
}

fn is_retry(error: &io::Error) -> bool {
    error.kind() == ErrorKind::Interrupted
}

fn is_pending(error: &io::Error) -> bool {
    error.kind() == ErrorKind::WouldBlock
}
