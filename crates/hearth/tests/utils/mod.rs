mod reactor;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use hearth::Dispatcher;

pub use self::reactor::{FailingReactor, MockReactor, StoppingReactor};

pub fn given_recording_completions(
    dispatcher: &Dispatcher,
    count: usize,
) -> Arc<Mutex<Vec<usize>>> {
    let record = Arc::new(Mutex::new(Vec::new()));

    for index in 0..count {
        let record = record.clone();
        dispatcher.post(move |_| record.lock().unwrap().push(index));
    }

    record
}

pub fn given_counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

pub fn then_count_is(counter: &AtomicUsize, expected: usize) {
    assert_eq!(counter.load(Ordering::SeqCst), expected);
}
