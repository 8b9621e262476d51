#![deny(missing_docs)]

//! Completion dispatcher and transport capabilities for the hearth HTTP core.
//!
//! All asynchronous work in hearth finishes by posting a completion to a shared [`Dispatcher`].
//! One or more workers pull completions from the dispatcher's queue and run them. Readiness of
//! I/O sources is provided by a [`Reactor`], which a dispatcher drives from whichever worker
//! is idle.

mod dispatcher;
mod reactor;
mod transport;

pub use self::{
    dispatcher::{Completion, Dispatcher, RunError},
    reactor::Reactor,
    transport::{continuation, Continuation, Stream, Transport},
};
