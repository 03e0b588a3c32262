use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub(crate) type TimerCallback = Box<dyn FnOnce() + Send>;

struct PendingTimer {
    deadline: Instant,
    /// Insertion order, to break deadline ties deterministically.
    seq: u64,
    callback: TimerCallback,
}

impl PartialEq for PendingTimer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for PendingTimer {}

impl PartialOrd for PendingTimer {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingTimer {
    // Reversed so BinaryHeap pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (other.deadline, other.seq).cmp(&(self.deadline, self.seq))
    }
}

struct TimerState {
    queue: BinaryHeap<PendingTimer>,
    next_seq: u64,
    shutdown: bool,
}

struct TimerShared {
    state: Mutex<TimerState>,
    tick: Condvar,
}

/// Runs engine-requested deferred callbacks on one dedicated thread.
///
/// Timers cannot be cancelled individually; they are owned by the adapter
/// instance and die with it. [`TimerScheduler::shutdown`] discards
/// everything still pending, so a callback scheduled before teardown never
/// fires after it.
pub(crate) struct TimerScheduler {
    shared: Arc<TimerShared>,
    worker: Option<JoinHandle<()>>,
}

impl TimerScheduler {
    pub fn new() -> Self {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                queue: BinaryHeap::new(),
                next_seq: 0,
                shutdown: false,
            }),
            tick: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("cdm-timer".to_owned())
            .spawn(move || run(&worker_shared))
            .ok();
        if worker.is_none() {
            log::error!("failed to spawn timer thread, deferred callbacks will not fire");
        }

        Self { shared, worker }
    }

    /// Schedules `callback` to run no earlier than `delay` from now.
    /// Dropped silently after shutdown.
    pub fn schedule(&self, delay: Duration, callback: TimerCallback) {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if state.shutdown {
            return;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(PendingTimer {
            deadline: Instant::now() + delay,
            seq,
            callback,
        });
        drop(state);
        self.shared.tick.notify_one();
    }

    /// Discards all pending timers and stops accepting new ones.
    /// Idempotent.
    pub fn shutdown(&self) {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.shutdown = true;
        state.queue.clear();
        drop(state);
        self.shared.tick.notify_all();
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(worker) = self.worker.take() {
            // The last adapter reference can be dropped from inside a timer
            // callback, in which case the worker must not join itself.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

fn run(shared: &TimerShared) {
    let mut state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
    loop {
        if state.shutdown {
            return;
        }
        let now = Instant::now();
        match state.queue.peek().map(|timer| timer.deadline) {
            Some(deadline) if deadline <= now => {
                let timer = state.queue.pop();
                drop(state);
                if let Some(timer) = timer {
                    (timer.callback)();
                }
                state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
            }
            Some(deadline) => {
                let (guard, _) = shared
                    .tick
                    .wait_timeout(state, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                state = guard;
            }
            None => {
                state = shared
                    .tick
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }
}
