use std::{
    collections::VecDeque,
    io, mem,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, ThreadId},
};

use anyhow::Error;
use thiserror::Error;
use tracing::{event, instrument, Level};

use crate::{Continuation, Reactor};

/// Unit of work posted to a `Dispatcher`.
pub type Completion = Box<dyn FnOnce(&Dispatcher) + Send>;

/// Shared completion queue, executed concurrently by a pool of workers.
///
/// A `Dispatcher` is a handle, clones refer to the same queue.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
    reactor: Option<Arc<dyn Reactor>>,
}

#[derive(Default)]
struct State {
    queue: VecDeque<Completion>,
    /// Workers blocked on the condvar.
    idle: usize,
    /// Worker currently inside `Reactor::turn`.
    poller: Option<ThreadId>,
    stopped: bool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Create a dispatcher without a reactor.
    ///
    /// Workers of this dispatcher only run posted completions.
    pub fn new() -> Self {
        Self::create(None)
    }

    /// Create a dispatcher that drives `reactor` whenever a worker is out of completions.
    pub fn with_reactor(reactor: Arc<dyn Reactor>) -> Self {
        Self::create(Some(reactor))
    }

    fn create(reactor: Option<Arc<dyn Reactor>>) -> Self {
        let shared = Shared {
            state: Mutex::new(State::default()),
            wake: Condvar::new(),
            reactor,
        };

        Self {
            shared: Arc::new(shared),
        }
    }

    /// Add a completion to the end of the queue.
    pub fn post<F>(&self, completion: F)
    where
        F: FnOnce(&Dispatcher) + Send + 'static,
    {
        let mut state = self.lock();
        state.queue.push_back(Box::new(completion));

        // Prefer waking a sleeping worker, the reactor only has to be interrupted if nobody else
        // is available to pick this up
        if state.idle > 0 {
            self.shared.wake.notify_one();
        } else if matches!(state.poller, Some(poller) if poller != thread::current().id()) {
            self.interrupt();
        }
    }

    /// Post `done` with the outcome of an asynchronous operation.
    pub fn complete<T>(&self, done: Continuation<T>, result: io::Result<T>)
    where
        T: Send + 'static,
    {
        self.post(move |dispatcher| done(dispatcher, result));
    }

    /// Run completions on the calling thread plus `workers - 1` additional threads.
    ///
    /// Returns once `stop` has been called, or when the reactor fails.
    /// A `workers` count of zero is treated as one.
    ///
    /// Once all workers have returned, completions left in the queue are dropped without running,
    /// and the reactor releases the operations still pending on its sources.
    #[instrument("Dispatcher::run", skip_all)]
    pub fn run(&self, workers: usize) -> Result<(), RunError> {
        let result = self.run_workers(workers.max(1));
        self.release();
        result
    }

    fn run_workers(&self, workers: usize) -> Result<(), RunError> {
        event!(Level::DEBUG, workers, "starting workers");

        let mut handles = Vec::with_capacity(workers - 1);
        for index in 1..workers {
            let dispatcher = self.clone();
            let result = thread::Builder::new()
                .name(format!("hearth-worker-{}", index))
                .spawn(move || dispatcher.work());

            match result {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    self.stop();
                    join_workers(handles);
                    return Err(RunError::Spawn(error));
                }
            }
        }

        let result = self.work();
        let workers_result = join_workers(handles);

        result.and(workers_result)
    }

    /// Run queued completions on the calling thread until the queue is empty.
    ///
    /// This does not wait on the reactor, only completions that are already posted, or that
    /// get posted while running, are processed.
    pub fn run_until_idle(&self) {
        loop {
            let next = self.lock().queue.pop_front();
            let Some(completion) = next else { break };
            self.execute(completion);
        }
    }

    /// Make every worker return from `run`.
    ///
    /// Completions still in the queue are not run. A stopped dispatcher stays stopped.
    pub fn stop(&self) {
        event!(Level::DEBUG, "stopping dispatcher");

        let mut state = self.lock();
        state.stopped = true;
        self.shared.wake.notify_all();

        if state.poller.is_some() {
            self.interrupt();
        }
    }

    /// Returns true if `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    fn work(&self) -> Result<(), RunError> {
        let mut state = self.lock();

        loop {
            if state.stopped {
                return Ok(());
            }

            if let Some(completion) = state.queue.pop_front() {
                drop(state);
                self.execute(completion);
                state = self.lock();
                continue;
            }

            if let (Some(reactor), None) = (&self.shared.reactor, state.poller) {
                state.poller = Some(thread::current().id());
                drop(state);

                // Completions posted from inside the turn don't interrupt it, they are picked up
                // right after
                let result = reactor.turn(self);

                state = self.lock();
                state.poller = None;

                if let Err(error) = result {
                    event!(Level::ERROR, "reactor failed, stopping: {}", error);
                    state.stopped = true;
                    self.shared.wake.notify_all();
                    return Err(RunError::Reactor(error));
                }

                // Let a sleeping worker take over the reactor while we run what it produced
                if state.idle > 0 {
                    self.shared.wake.notify_one();
                }

                continue;
            }

            state.idle += 1;
            state = self
                .shared
                .wake
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            state.idle -= 1;
        }
    }

    /// Drop everything still waiting to run, breaking ownership cycles between sources and the
    /// continuations they hold.
    fn release(&self) {
        let queue = mem::take(&mut self.lock().queue);
        event!(Level::DEBUG, dropped = queue.len(), "releasing pending work");
        drop(queue);

        if let Some(reactor) = &self.shared.reactor {
            reactor.shutdown();
        }
    }

    fn execute(&self, completion: Completion) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| completion(self)));

        if result.is_err() {
            event!(Level::ERROR, "completion panicked, worker continues");
        }
    }

    fn interrupt(&self) {
        let Some(reactor) = &self.shared.reactor else {
            return;
        };

        if let Err(error) = reactor.interrupt() {
            event!(Level::ERROR, "failed to interrupt reactor: {}", error);
        }
    }

    fn lock(&self) -> MutexGuard<State> {
        // Completions never run while the lock is held, so the state can't be left half-updated
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn join_workers(handles: Vec<thread::JoinHandle<Result<(), RunError>>>) -> Result<(), RunError> {
    let mut result = Ok(());

    for handle in handles {
        let worker_result = handle.join().unwrap_or(Err(RunError::WorkerPanicked));
        if result.is_ok() {
            result = worker_result;
        }
    }

    result
}

/// Failed to run the dispatcher.
#[derive(Error, Debug)]
pub enum RunError {
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread")]
    Spawn(#[source] io::Error),

    /// A worker thread panicked outside of a completion.
    #[error("worker thread panicked")]
    WorkerPanicked,

    /// The reactor returned an error.
    #[error("reactor failed")]
    Reactor(#[source] Error),
}
