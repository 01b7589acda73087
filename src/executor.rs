//! The executor: a fixed pool of workers draining one shared work source under the rate gate.
//!
//! Each worker loops {next chunk → gate → new task → run} until the source is exhausted or
//! a step fails. A failure ends only the worker that hit it; it is handed to the error sink
//! (if any) on that worker's thread and never reaches the caller of `execute()`.

use crate::capability::{ErrorSink, FnTaskFactory, TaskFactory, WorkSource};
use crate::chunk::Chunk;
use crate::concurrency::{Alarm, Completion, WaitOutcome};
use crate::config::ExecutorOptions;
use crate::gate::{Admission, GateSnapshot, RateGate};
use crate::progress::make_task_spinner;
use crate::util::{init_tracing_once, panic_message};
use anyhow::{anyhow, Context, Result};
use indicatif::ProgressBar;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What one `execute()` call observed by the time it returned.
///
/// When `timed_out` or `interrupted` is set, workers may still be running and the
/// counters are a lower bound.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionReport {
    pub pool_size: usize,
    pub workers_finished: usize,
    pub workers_failed: usize,
    pub tasks_executed: u64,
    pub throttle_pauses: u64,
    pub timed_out: bool,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl ExecutionReport {
    /// Every worker stopped before `execute()` returned.
    pub fn all_finished(&self) -> bool {
        self.workers_finished == self.pool_size
    }
}

/// Handle for cutting waits short from another thread.
#[derive(Clone)]
pub struct Interrupter {
    alarm: Arc<Alarm>,
    running: Arc<Mutex<Option<Arc<Completion>>>>,
}

impl Interrupter {
    /// Wake the thread blocked in `execute()`. Workers keep running.
    /// No effect when no run is in progress.
    pub fn interrupt_wait(&self) {
        if let Some(done) = self.running.lock().as_ref() {
            done.interrupt();
        }
    }

    /// Cut short the worker currently sleeping in the rate gate. It is admitted early.
    pub fn interrupt_throttle(&self) {
        self.alarm.ring();
    }
}

/// State shared by all workers of one run.
struct Shared<T> {
    source: Arc<dyn WorkSource<T>>,
    factory: Arc<dyn TaskFactory<T>>,
    sink: Option<Arc<dyn ErrorSink>>,
    gate: Arc<RateGate>,
    done: Arc<Completion>,
    executed: AtomicU64,
    throttled: AtomicU64,
    pb: Option<ProgressBar>,
}

/// Counts the worker down on every exit path, panics included.
struct ExitGuard<'a> {
    done: &'a Completion,
    failed: bool,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.done.count_down(self.failed);
    }
}

impl<T: 'static> Shared<T> {
    fn run_worker(&self, id: usize) {
        let mut guard = ExitGuard { done: &self.done, failed: true };
        let mut processed: u64 = 0;

        loop {
            match catch_unwind(AssertUnwindSafe(|| self.step(id))) {
                Ok(Ok(true)) => processed += 1,
                Ok(Ok(false)) => {
                    tracing::debug!("worker {} done: source exhausted after {} chunks", id, processed);
                    guard.failed = false;
                    return;
                }
                Ok(Err(e)) => {
                    tracing::debug!("worker {} stopping after {} chunks: {:#}", id, processed, e);
                    self.report(e);
                    return;
                }
                Err(payload) => {
                    let e = anyhow!("worker {} panicked: {}", id, panic_message(&*payload));
                    tracing::debug!("worker {} stopping after {} chunks: {}", id, processed, e);
                    self.report(e);
                    return;
                }
            }
        }
    }

    /// One iteration. `Ok(false)` once the source is exhausted.
    fn step(&self, id: usize) -> Result<bool> {
        let chunk: Chunk<T> = match self
            .source
            .next_chunk()
            .with_context(|| format!("worker {id}: reading next chunk"))?
        {
            Some(c) => c,
            None => return Ok(false),
        };

        if self.gate.admit() != Admission::Immediate {
            self.throttled.fetch_add(1, Ordering::Relaxed);
        }

        let mut task = self
            .factory
            .create()
            .with_context(|| format!("worker {id}: creating task"))?;
        task.run(chunk).with_context(|| format!("worker {id}: running task"))?;

        self.executed.fetch_add(1, Ordering::Relaxed);
        if let Some(pb) = &self.pb {
            pb.inc(1);
        }
        Ok(true)
    }

    fn report(&self, err: anyhow::Error) {
        match &self.sink {
            Some(sink) => sink.handle(err),
            None => tracing::debug!("no error sink configured; dropping: {:#}", err),
        }
    }
}

pub struct TaskExecutor<T> {
    opts: ExecutorOptions,
    source: Option<Arc<dyn WorkSource<T>>>,
    factory: Option<Arc<dyn TaskFactory<T>>>,
    sink: Option<Arc<dyn ErrorSink>>,
    gate: Arc<RateGate>,
    alarm: Arc<Alarm>,
    running: Arc<Mutex<Option<Arc<Completion>>>>,
}

impl<T: 'static> Default for TaskExecutor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> TaskExecutor<T> {
    pub fn new() -> Self {
        Self::with_options(ExecutorOptions::default())
    }

    pub fn with_options(opts: ExecutorOptions) -> Self {
        let alarm = Arc::new(Alarm::new());
        let gate = Arc::new(RateGate::with_alarm(opts.quota, opts.window(), alarm.clone()));
        Self {
            opts,
            source: None,
            factory: None,
            sink: None,
            gate,
            alarm,
            running: Arc::new(Mutex::new(None)),
        }
    }

    // -------- Builder methods --------
    pub fn pool_size(mut self, n: usize) -> Self { self.opts = self.opts.with_pool_size(n); self }
    pub fn quota(mut self, quota: u64) -> Self { self.opts = self.opts.with_quota(quota); self }
    pub fn window_ms(mut self, ms: u64) -> Self { self.opts = self.opts.with_window_ms(ms); self }
    pub fn rate(mut self, quota: u64, window_ms: u64) -> Self { self.opts = self.opts.with_rate(quota, window_ms); self }
    pub fn timeout_ms(mut self, ms: u64) -> Self { self.opts = self.opts.with_timeout_ms(ms); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn progress_label(mut self, label: impl Into<String>) -> Self { self.opts = self.opts.with_progress_label(label); self }
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self { self.opts = self.opts.with_thread_name(prefix); self }

    // -------- Capabilities --------
    /// Shared chunk source. The executor never releases it; keep a clone and call
    /// `release()` yourself once the run is over.
    pub fn source(mut self, source: Arc<dyn WorkSource<T>>) -> Self { self.source = Some(source); self }
    pub fn task_factory(mut self, factory: Arc<dyn TaskFactory<T>>) -> Self { self.factory = Some(factory); self }
    pub fn error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self { self.sink = Some(sink); self }

    /// Convenience: a fresh clone of `f` runs each chunk.
    pub fn task_fn<F>(self, f: F) -> Self
    where
        F: Fn(Chunk<T>) -> Result<()> + Clone + Send + Sync + 'static,
    {
        self.task_factory(Arc::new(FnTaskFactory::new(f)))
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.opts
    }

    /// Counters of the most recent run's gate (or the configured limits, before the first run).
    pub fn gate_snapshot(&self) -> GateSnapshot {
        self.gate.snapshot()
    }

    pub fn interrupter(&self) -> Interrupter {
        Interrupter { alarm: self.alarm.clone(), running: self.running.clone() }
    }

    /// Run `pool_size` workers over the source and block until all of them stop or the
    /// completion timeout elapses, whichever comes first.
    ///
    /// Workers are never cancelled: after a timeout or an interrupted wait they keep
    /// draining the source in the background. Worker failures go to the error sink and are
    /// never returned here; `Err` means the run could not be set up at all.
    pub fn execute(&mut self) -> Result<ExecutionReport> {
        let started = Instant::now();
        init_tracing_once();
        let source = self.source.clone().ok_or_else(|| anyhow!("work source is required"))?;
        let factory = self.factory.clone().ok_or_else(|| anyhow!("task factory is required"))?;
        let pool_size = self.opts.pool_size.max(1);

        // Each run throttles against its own gate; workers left over from a timed-out run
        // keep the previous one and cannot hold this run's lock or spend its quota.
        self.alarm.clear();
        self.gate = Arc::new(RateGate::with_alarm(
            self.opts.quota,
            self.opts.window(),
            self.alarm.clone(),
        ));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(pool_size)
            .thread_name({
                let prefix = self.opts.thread_name.clone();
                move |i| format!("{prefix}-{i}")
            })
            .panic_handler(|payload| {
                tracing::error!("worker thread panicked outside a step: {}", panic_message(&*payload));
            })
            .build()
            .context("build worker thread pool")?;

        let done = Arc::new(Completion::new(pool_size));
        let pb = if self.opts.progress {
            Some(make_task_spinner(self.opts.progress_label.as_deref()))
        } else {
            None
        };
        let shared = Arc::new(Shared {
            source,
            factory,
            sink: self.sink.clone(),
            gate: self.gate.clone(),
            done: done.clone(),
            executed: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
            pb: pb.clone(),
        });

        tracing::info!(
            "Starting {} workers (quota {} per {} ms, timeout {} ms)",
            pool_size,
            self.opts.quota,
            self.opts.window_ms,
            self.opts.timeout_ms
        );
        *self.running.lock() = Some(done.clone());

        for id in 0..pool_size {
            let shared = shared.clone();
            pool.spawn(move || shared.run_worker(id));
        }
        // No further submissions; spawned workers keep their threads until they return.
        drop(pool);

        let budget = self.opts.timeout().saturating_sub(started.elapsed());
        let outcome = done.wait_for(budget);
        *self.running.lock() = None;

        let (remaining, failed) = done.counts();
        let report = ExecutionReport {
            pool_size,
            workers_finished: pool_size - remaining,
            workers_failed: failed,
            tasks_executed: shared.executed.load(Ordering::Relaxed),
            throttle_pauses: shared.throttled.load(Ordering::Relaxed),
            timed_out: outcome == WaitOutcome::TimedOut,
            interrupted: outcome == WaitOutcome::Interrupted,
            elapsed: started.elapsed(),
        };

        match outcome {
            WaitOutcome::Completed => {
                tracing::info!(
                    "All {} workers finished: {} tasks executed, {} workers failed, {:?} elapsed",
                    pool_size,
                    report.tasks_executed,
                    report.workers_failed,
                    report.elapsed
                );
                if let Some(pb) = &pb {
                    pb.finish_with_message("done");
                }
            }
            WaitOutcome::TimedOut => {
                tracing::warn!(
                    "Timed out after {} ms with {} of {} workers still running",
                    self.opts.timeout_ms,
                    remaining,
                    pool_size
                );
                if let Some(pb) = &pb {
                    pb.abandon_with_message("timed out");
                }
            }
            WaitOutcome::Interrupted => {
                tracing::warn!("Wait interrupted with {} of {} workers still running", remaining, pool_size);
                if let Some(pb) = &pb {
                    pb.abandon_with_message("interrupted");
                }
            }
        }

        Ok(report)
    }
}
