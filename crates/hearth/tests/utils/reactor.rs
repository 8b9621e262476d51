use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Condvar, Mutex,
};

use anyhow::{bail, Error};
use hearth::{Dispatcher, Reactor};

/// Reactor without sources, `turn` blocks until interrupted.
#[derive(Default)]
pub struct MockReactor {
    interrupted: Mutex<bool>,
    wake: Condvar,
    pub turns: AtomicUsize,
}

impl Reactor for MockReactor {
    fn turn(&self, _dispatcher: &Dispatcher) -> Result<(), Error> {
        self.turns.fetch_add(1, Ordering::SeqCst);

        let mut interrupted = self.interrupted.lock().unwrap();
        while !*interrupted {
            interrupted = self.wake.wait(interrupted).unwrap();
        }
        *interrupted = false;

        Ok(())
    }

    fn interrupt(&self) -> Result<(), Error> {
        *self.interrupted.lock().unwrap() = true;
        self.wake.notify_all();
        Ok(())
    }
}

pub struct FailingReactor;

impl Reactor for FailingReactor {
    fn turn(&self, _dispatcher: &Dispatcher) -> Result<(), Error> {
        bail!("mock intentional fail");
    }

    fn interrupt(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Reactor posting a completion that stops the dispatcher on every turn.
#[derive(Default)]
pub struct StoppingReactor {
    pub interrupts: AtomicUsize,
    pub shutdowns: AtomicUsize,
}

impl Reactor for StoppingReactor {
    fn turn(&self, dispatcher: &Dispatcher) -> Result<(), Error> {
        dispatcher.post(|dispatcher| dispatcher.stop());
        Ok(())
    }

    fn interrupt(&self) -> Result<(), Error> {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}
