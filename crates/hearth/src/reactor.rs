use anyhow::Error;

use crate::Dispatcher;

/// Source of readiness events, driven by the workers of a `Dispatcher`.
///
/// At most one worker at a time is inside `turn`.
pub trait Reactor: Send + Sync + 'static {
    /// Block until at least one source is ready, or until `interrupt` is called.
    ///
    /// Readiness is handed to the dispatcher as completions, using `Dispatcher::post`.
    fn turn(&self, dispatcher: &Dispatcher) -> Result<(), Error>;

    /// Make a blocked `turn` return as soon as possible.
    fn interrupt(&self) -> Result<(), Error>;

    /// Drop the pending operations of all sources, without completing them.
    ///
    /// Called after the workers of `Dispatcher::run` have returned.
    fn shutdown(&self) {}
}
