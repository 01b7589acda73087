#![allow(dead_code)]

use anyhow::{anyhow, Result};
use chunkexec::{Chunk, ErrorSink, WorkSource};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Thread-safe in-memory source over `0..n`, serialized internally.
pub struct NumberSource {
    queue: Mutex<VecDeque<u64>>,
    pub calls: AtomicUsize,
}

impl NumberSource {
    pub fn new(n: u64) -> Self {
        Self { queue: Mutex::new((0..n).collect()), calls: AtomicUsize::new(0) }
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().len()
    }
}

impl WorkSource<u64> for NumberSource {
    fn next_chunk(&self) -> Result<Option<Chunk<u64>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.queue.lock().pop_front().map(Chunk::new))
    }
}

/// Source whose every read fails.
pub struct BrokenSource {
    pub calls: AtomicUsize,
}

impl BrokenSource {
    pub fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }
}

impl WorkSource<u64> for BrokenSource {
    fn next_chunk(&self) -> Result<Option<Chunk<u64>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("disk on fire"))
    }
}

/// Error sink that keeps every failure (rendered with its context chain).
#[derive(Default)]
pub struct RecordingSink {
    pub errors: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn count(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

impl ErrorSink for RecordingSink {
    fn handle(&self, err: anyhow::Error) {
        self.errors.lock().push(format!("{:#}", err));
    }
}

/// Admission timestamps recorded from inside tasks.
#[derive(Default)]
pub struct Timeline {
    pub stamps: Mutex<Vec<Instant>>,
}

impl Timeline {
    pub fn mark(&self) {
        self.stamps.lock().push(Instant::now());
    }

    pub fn sorted(&self) -> Vec<Instant> {
        let mut v = self.stamps.lock().clone();
        v.sort();
        v
    }
}

/// Any `quota + 1` consecutive admissions span at least one window, less `slack` for
/// scheduling noise between admission and the recorded stamp.
pub fn assert_per_window_quota(sorted: &[Instant], quota: usize, window: Duration, slack: Duration) {
    for (i, pair) in sorted.windows(quota + 1).enumerate() {
        let span = pair[quota].duration_since(pair[0]);
        assert!(
            span + slack >= window,
            "admissions {}..={} fit in {:?}, window is {:?}",
            i,
            i + quota,
            span,
            window
        );
    }
}

/// Write `lines` to `dir/name`, one per line.
pub fn write_lines(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    let mut f = File::create(&path).unwrap();
    for l in lines {
        writeln!(&mut f, "{}", l).unwrap();
    }
    path
}

/// Write a compressed `.zst` file containing the provided lines.
pub fn write_zst_lines(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    let f = File::create(&path).unwrap();
    let mut enc = zstd::stream::write::Encoder::new(f, 3).unwrap();
    for l in lines {
        writeln!(&mut enc, "{}", l).unwrap();
    }
    enc.finish().unwrap();
    path
}
