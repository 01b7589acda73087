#[path = "common/mod.rs"]
mod common;

use anyhow::anyhow;
use chunkexec::{Chunk, Task, TaskExecutor, TaskFactory};
use common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct CountingFactory {
    created: Arc<AtomicUsize>,
}

impl TaskFactory<u64> for CountingFactory {
    fn create(&self) -> anyhow::Result<Box<dyn Task<u64>>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(|_c: Chunk<u64>| Ok::<(), anyhow::Error>(())))
    }
}

/// Four workers over a source that always fails.
/// Outcome: the sink hears from each worker once, no task is ever created, and
/// `execute()` returns promptly despite a long timeout.
#[test]
fn broken_source_reports_once_per_worker() {
    let source = Arc::new(BrokenSource::new());
    let sink = Arc::new(RecordingSink::default());
    let created = Arc::new(AtomicUsize::new(0));

    let mut ex = TaskExecutor::<u64>::new()
        .pool_size(4)
        .timeout_ms(60_000)
        .source(source.clone())
        .task_factory(Arc::new(CountingFactory { created: created.clone() }))
        .error_sink(sink.clone());

    let report = ex.execute().unwrap();

    assert_eq!(sink.count(), 4);
    assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    assert_eq!(created.load(Ordering::SeqCst), 0);
    assert_eq!(report.workers_failed, 4);
    assert!(report.all_finished());
    assert!(report.elapsed < Duration::from_secs(5));
    assert!(sink.messages().iter().all(|m| m.contains("disk on fire")));
}

/// A failing task ends only its own worker; the others drain the rest of the source.
#[test]
fn task_failure_is_isolated_to_its_worker() {
    let source = Arc::new(NumberSource::new(100));
    let sink = Arc::new(RecordingSink::default());
    let done = Arc::new(AtomicUsize::new(0));
    let d = done.clone();

    let mut ex = TaskExecutor::<u64>::new()
        .pool_size(4)
        .source(source.clone())
        .error_sink(sink.clone())
        .task_fn(move |chunk: Chunk<u64>| {
            if *chunk.data() == 7 {
                return Err(anyhow!("bad chunk {}", chunk.data()));
            }
            d.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

    let report = ex.execute().unwrap();

    assert_eq!(sink.count(), 1);
    assert!(sink.messages()[0].contains("bad chunk 7"));
    assert!(sink.messages()[0].contains("running task"));
    assert_eq!(report.workers_failed, 1);
    assert!(report.all_finished());
    assert_eq!(done.load(Ordering::SeqCst), 99);
    assert_eq!(report.tasks_executed, 99);
    assert_eq!(source.remaining(), 0);
}

/// Factory failures are routed to the sink and end the worker.
#[test]
fn factory_failure_goes_to_sink() {
    struct Refusing;
    impl TaskFactory<u64> for Refusing {
        fn create(&self) -> anyhow::Result<Box<dyn Task<u64>>> {
            Err(anyhow!("no tasks today"))
        }
    }

    let source = Arc::new(NumberSource::new(10));
    let sink = Arc::new(RecordingSink::default());
    let mut ex = TaskExecutor::<u64>::new()
        .pool_size(2)
        .source(source.clone())
        .task_factory(Arc::new(Refusing))
        .error_sink(sink.clone());

    let report = ex.execute().unwrap();
    assert_eq!(sink.count(), 2);
    assert!(sink.messages().iter().all(|m| m.contains("creating task")));
    assert_eq!(report.tasks_executed, 0);
    // Each worker consumed one chunk before failing; the rest stay in the source.
    assert_eq!(source.remaining(), 8);
}

/// A panicking task is contained like an error: the sink is told and the run completes.
#[test]
fn panicking_task_is_contained() {
    let sink = Arc::new(RecordingSink::default());
    let mut ex = TaskExecutor::<u64>::new()
        .pool_size(2)
        .timeout_ms(10_000)
        .source(Arc::new(NumberSource::new(20)))
        .error_sink(sink.clone())
        .task_fn(|chunk: Chunk<u64>| {
            if *chunk.data() == 3 {
                panic!("chunk three is cursed");
            }
            Ok(())
        });

    let report = ex.execute().unwrap();
    assert!(report.all_finished());
    assert!(!report.timed_out);
    assert_eq!(report.workers_failed, 1);
    assert_eq!(report.tasks_executed, 19);
    assert_eq!(sink.count(), 1);
    assert!(sink.messages()[0].contains("chunk three is cursed"));
}

/// Without a sink failures vanish: the caller only sees fewer processed chunks.
#[test]
fn failures_without_sink_are_silent() {
    let mut ex = TaskExecutor::<u64>::new()
        .pool_size(1)
        .source(Arc::new(NumberSource::new(10)))
        .task_fn(|chunk: Chunk<u64>| {
            if *chunk.data() == 4 {
                Err(anyhow!("stop here"))
            } else {
                Ok(())
            }
        });

    let report = ex.execute().unwrap();
    assert_eq!(report.tasks_executed, 4);
    assert_eq!(report.workers_failed, 1);
}
