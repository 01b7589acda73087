//! Windowed admission gate shared by all workers of a run.
//!
//! Fixed-window, hard-reset throttle: up to `quota` admissions per window. The admission
//! that finds the quota spent sleeps out the rest of the window, then opens a new window
//! starting at that moment. This bounds the per-window total only; back-to-back bursts of
//! `quota` right after a reset are expected.

use crate::concurrency::{Alarm, Pause};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct GateState {
    count: u64,
    window_start: Instant,
    quota: u64,  // 0 = unlimited
    window: Duration,
}

/// Point-in-time copy of the gate's counters.
#[derive(Clone, Copy, Debug)]
pub struct GateSnapshot {
    pub count: u64,
    pub window_start: Instant,
    pub quota: u64,
    pub window: Duration,
}

/// Result of one admission attempt. Every attempt is eventually admitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Admitted without waiting.
    Immediate,
    /// Admitted after sleeping out the rest of the window.
    Throttled(Duration),
    /// The wait was cut short; admitted anyway.
    Interrupted,
}

pub struct RateGate {
    state: Mutex<GateState>,
    alarm: Arc<Alarm>,
}

impl RateGate {
    pub fn new(quota: u64, window: Duration) -> Self {
        Self::with_alarm(quota, window, Arc::new(Alarm::new()))
    }

    pub(crate) fn with_alarm(quota: u64, window: Duration, alarm: Arc<Alarm>) -> Self {
        Self {
            state: Mutex::new(GateState { count: 0, window_start: Instant::now(), quota, window }),
            alarm,
        }
    }

    /// Start a fresh window with new limits.
    pub fn reset(&self, quota: u64, window: Duration) {
        let mut st = self.state.lock();
        st.count = 0;
        st.window_start = Instant::now();
        st.quota = quota;
        st.window = window;
    }

    /// Block until the caller may start one execution.
    ///
    /// The gate stays locked while a caller sleeps, so throttled callers queue up behind it.
    pub fn admit(&self) -> Admission {
        let mut st = self.state.lock();
        let mut outcome = Admission::Immediate;

        if st.quota > 0 && st.count >= st.quota {
            let elapsed = st.window_start.elapsed();
            if let Some(remaining) = st.window.checked_sub(elapsed).filter(|d| !d.is_zero()) {
                outcome = match self.alarm.pause(remaining) {
                    Pause::Elapsed => Admission::Throttled(remaining),
                    Pause::Interrupted => {
                        tracing::warn!(
                            "throttle wait interrupted with {:?} left in window; admitting early",
                            remaining
                        );
                        Admission::Interrupted
                    }
                };
            }
            st.count = 0;
            st.window_start = Instant::now();
        }

        st.count += 1;
        outcome
    }

    /// Cut short the current throttle sleep (or the next one, if nobody is sleeping).
    pub fn interrupt(&self) {
        self.alarm.ring();
    }

    pub fn snapshot(&self) -> GateSnapshot {
        let st = self.state.lock();
        GateSnapshot { count: st.count, window_start: st.window_start, quota: st.quota, window: st.window }
    }
}
