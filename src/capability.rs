//! Pluggable capabilities consumed by the executor: work source, task, task factory, error sink.
//! Implement these for your own types, or pass closures (blanket impls below).

use crate::chunk::Chunk;
use anyhow::Result;
use parking_lot::Mutex;
use std::marker::PhantomData;

/// Producer of chunks shared by every worker of a run.
///
/// `next_chunk` is called directly and concurrently from all worker threads; the executor
/// adds no locking of its own. Implementations must be safe under that access pattern,
/// either naturally or by serializing internally. Sources that are not should be wrapped in
/// [`Serialized`].
pub trait WorkSource<T>: Send + Sync {
    /// Next chunk, or `Ok(None)` once the source is exhausted.
    fn next_chunk(&self) -> Result<Option<Chunk<T>>>;

    /// Optional cleanup. Never called by the executor; whoever built the source releases it.
    fn release(&self) -> Result<()> {
        Ok(())
    }
}

/// A source that needs exclusive access to produce the next chunk (e.g. a buffered reader).
pub trait SequentialSource<T>: Send {
    fn next_chunk(&mut self) -> Result<Option<Chunk<T>>>;

    fn release(&mut self) -> Result<()> {
        Ok(())
    }

    /// Wrap in [`Serialized`] so all workers can share it.
    fn shared(self) -> Serialized<Self>
    where
        Self: Sized,
    {
        Serialized::new(self)
    }
}

/// Opt-in decorator: serializes a [`SequentialSource`] behind a mutex so it can be shared.
pub struct Serialized<S> {
    inner: Mutex<S>,
}

impl<S> Serialized<S> {
    pub fn new(inner: S) -> Self {
        Self { inner: Mutex::new(inner) }
    }

    pub fn into_inner(self) -> S {
        self.inner.into_inner()
    }
}

impl<T, S> WorkSource<T> for Serialized<S>
where
    S: SequentialSource<T>,
{
    fn next_chunk(&self) -> Result<Option<Chunk<T>>> {
        self.inner.lock().next_chunk()
    }

    fn release(&self) -> Result<()> {
        self.inner.lock().release()
    }
}

/// Per-chunk unit of execution. A fresh instance is created for every chunk and used once.
pub trait Task<T> {
    fn run(&mut self, chunk: Chunk<T>) -> Result<()>;
}

impl<T, F> Task<T> for F
where
    F: FnMut(Chunk<T>) -> Result<()>,
{
    fn run(&mut self, chunk: Chunk<T>) -> Result<()> {
        self(chunk)
    }
}

/// Produces a task for each chunk. Called concurrently from all workers.
pub trait TaskFactory<T>: Send + Sync {
    fn create(&self) -> Result<Box<dyn Task<T>>>;
}

impl<T, F> TaskFactory<T> for F
where
    F: Fn() -> Result<Box<dyn Task<T>>> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn Task<T>>> {
        self()
    }
}

/// Factory that clones one closure into a fresh task per chunk.
pub struct FnTaskFactory<T, F> {
    f: F,
    _chunk: PhantomData<fn(T)>,
}

impl<T, F> FnTaskFactory<T, F>
where
    F: Fn(Chunk<T>) -> Result<()> + Clone + Send + Sync + 'static,
    T: 'static,
{
    pub fn new(f: F) -> Self {
        Self { f, _chunk: PhantomData }
    }
}

impl<T, F> TaskFactory<T> for FnTaskFactory<T, F>
where
    F: Fn(Chunk<T>) -> Result<()> + Clone + Send + Sync + 'static,
    T: 'static,
{
    fn create(&self) -> Result<Box<dyn Task<T>>> {
        Ok(Box::new(self.f.clone()))
    }
}

/// Receives failures from source reads, task creation and task execution.
/// Invoked on the failing worker's thread; must not panic.
pub trait ErrorSink: Send + Sync {
    fn handle(&self, err: anyhow::Error);
}

impl<F> ErrorSink for F
where
    F: Fn(anyhow::Error) + Send + Sync,
{
    fn handle(&self, err: anyhow::Error) {
        self(err)
    }
}
