//! Concurrency helpers: a countdown latch with a bounded wait, and an interruptible pause.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// How a bounded wait ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    TimedOut,
    Interrupted,
}

struct LatchState {
    remaining: usize,
    failed: usize,
    interrupt_pending: bool,
}

/// Countdown latch for worker completion. Each worker counts down exactly once.
pub struct Completion {
    state: Mutex<LatchState>,
    cv: Condvar,
}

impl Completion {
    pub fn new(workers: usize) -> Self {
        Self {
            state: Mutex::new(LatchState { remaining: workers, failed: 0, interrupt_pending: false }),
            cv: Condvar::new(),
        }
    }

    pub fn count_down(&self, failed: bool) {
        let mut st = self.state.lock();
        st.remaining = st.remaining.saturating_sub(1);
        if failed {
            st.failed += 1;
        }
        if st.remaining == 0 {
            self.cv.notify_all();
        }
    }

    /// Wake the waiter early. If nobody is waiting yet, the next wait returns immediately.
    pub fn interrupt(&self) {
        let mut st = self.state.lock();
        st.interrupt_pending = true;
        self.cv.notify_all();
    }

    /// Block until every worker counted down, `timeout` elapses, or `interrupt` is called.
    pub fn wait_for(&self, timeout: Duration) -> WaitOutcome {
        let deadline = Instant::now().checked_add(timeout);
        let mut st = self.state.lock();
        loop {
            if st.remaining == 0 {
                return WaitOutcome::Completed;
            }
            if st.interrupt_pending {
                st.interrupt_pending = false;
                return WaitOutcome::Interrupted;
            }
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return WaitOutcome::TimedOut;
                    }
                    // Spurious wakeups and timeouts both re-check the state above.
                    let _ = self.cv.wait_until(&mut st, deadline);
                }
                None => self.cv.wait(&mut st),
            }
        }
    }

    /// (remaining, failed)
    pub fn counts(&self) -> (usize, usize) {
        let st = self.state.lock();
        (st.remaining, st.failed)
    }
}

/// How an interruptible pause ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pause {
    Elapsed,
    Interrupted,
}

/// Sleep that another thread can cut short. An interrupt raised while nobody is
/// sleeping stays pending and ends the next pause immediately.
#[derive(Default)]
pub struct Alarm {
    pending: Mutex<bool>,
    cv: Condvar,
}

impl Alarm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ring(&self) {
        let mut pending = self.pending.lock();
        *pending = true;
        self.cv.notify_all();
    }

    pub fn clear(&self) {
        *self.pending.lock() = false;
    }

    pub fn pause(&self, dur: Duration) -> Pause {
        let Some(deadline) = Instant::now().checked_add(dur) else {
            // Unrepresentable deadline: wait for a ring only.
            let mut pending = self.pending.lock();
            while !*pending {
                self.cv.wait(&mut pending);
            }
            *pending = false;
            return Pause::Interrupted;
        };
        let mut pending = self.pending.lock();
        loop {
            if *pending {
                *pending = false;
                return Pause::Interrupted;
            }
            if Instant::now() >= deadline {
                return Pause::Elapsed;
            }
            let _ = self.cv.wait_until(&mut pending, deadline);
        }
    }
}
