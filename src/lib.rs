mod chunk;
mod capability;
mod config;
mod gate;

mod concurrency;
mod executor;
mod progress;
mod util;

mod sources;

pub use crate::chunk::Chunk;
pub use crate::capability::{ErrorSink, FnTaskFactory, SequentialSource, Serialized, Task, TaskFactory, WorkSource};
pub use crate::config::{ExecutorOptions, DEFAULT_POOL_SIZE, DEFAULT_TIMEOUT_MS};
pub use crate::gate::{Admission, GateSnapshot, RateGate};
pub use crate::executor::{ExecutionReport, Interrupter, TaskExecutor};

// Expose multiprogress and the task spinner.
pub use crate::progress::{set_global_multiprogress, make_task_spinner};

// Expose tracing init so binaries can share the same filter setup.
pub use crate::util::init_tracing_once;

// export ready-made sources (line, NDJSON, iterator)
pub use crate::sources::{IterSource, JsonLineSource, LineSource};
