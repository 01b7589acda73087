use anyhow::Result;
use chunkexec::{init_tracing_once, Chunk, LineSource, SequentialSource, TaskExecutor, WorkSource};
use std::path::PathBuf;
use std::sync::Arc;

const DATA_FILE: &str = "./data.txt";

fn main() -> Result<()> {
    init_tracing_once();
    let path = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DATA_FILE));

    let source = Arc::new(LineSource::open(&path, 256 * 1024)?.shared());

    let mut executor = TaskExecutor::<String>::new()
        .rate(300, 1000)
        .timeout_ms(50_000)
        .progress(false)
        .source(source.clone())
        .task_fn(|chunk: Chunk<String>| {
            let name = std::thread::current().name().unwrap_or("worker").to_string();
            println!("{}: {}", name, chunk.data());
            Ok(())
        })
        .error_sink(Arc::new(|e: anyhow::Error| tracing::error!("chunk failed: {:#}", e)));

    let report = executor.execute()?;
    WorkSource::<String>::release(source.as_ref())?;

    println!(
        "Executed {} tasks on {} workers in {:?} ({} throttle pauses, {} failed workers)",
        report.tasks_executed, report.pool_size, report.elapsed, report.throttle_pauses, report.workers_failed
    );

    Ok(())
}
