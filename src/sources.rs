//! Ready-made sequential sources: text lines (plain or `.zst`), NDJSON values, and iterators.
//! Wrap them with `.shared()` before handing them to the executor.

use crate::capability::SequentialSource;
use crate::chunk::Chunk;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use zstd::stream::read::Decoder;

/// One chunk per line. Trailing `\r?\n` is stripped; empty lines are yielded as empty strings.
pub struct LineSource {
    reader: Option<Box<dyn BufRead + Send>>,
    origin: Option<PathBuf>,
    buf: String,
    line_no: u64,
}

impl LineSource {
    pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> Self {
        Self { reader: Some(Box::new(reader)), origin: None, buf: String::with_capacity(4 * 1024), line_no: 0 }
    }

    /// Open a text file; `.zst` files are decompressed on the fly.
    pub fn open(path: &Path, read_buf_bytes: usize) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let cap = read_buf_bytes.max(8 * 1024);
        let reader: Box<dyn BufRead + Send> = if path.extension().map_or(false, |e| e == "zst") {
            let mut decoder = Decoder::new(file).with_context(|| format!("zstd init {}", path.display()))?;
            // Accept frames written with long-distance matching.
            decoder.window_log_max(31)?;
            Box::new(BufReader::with_capacity(cap, decoder))
        } else {
            Box::new(BufReader::with_capacity(cap, file))
        };
        Ok(Self { reader: Some(reader), origin: Some(path.to_path_buf()), buf: String::with_capacity(4 * 1024), line_no: 0 })
    }

    /// Number of lines read so far.
    pub fn lines_read(&self) -> u64 {
        self.line_no
    }

    fn describe(&self) -> String {
        match &self.origin {
            Some(p) => format!("{}:{}", p.display(), self.line_no + 1),
            None => format!("line {}", self.line_no + 1),
        }
    }

    /// Read the next line into the internal buffer. `false` on EOF or after release.
    fn read_next(&mut self) -> Result<bool> {
        let Some(reader) = self.reader.as_mut() else { return Ok(false) };
        self.buf.clear();
        let n = match reader.read_line(&mut self.buf) {
            Ok(n) => n,
            Err(e) => return Err(e).with_context(|| format!("read {}", self.describe())),
        };
        if n == 0 {
            return Ok(false);
        }
        if self.buf.ends_with('\n') {
            self.buf.pop();
            if self.buf.ends_with('\r') { self.buf.pop(); }
        }
        self.line_no += 1;
        Ok(true)
    }
}

impl SequentialSource<String> for LineSource {
    fn next_chunk(&mut self) -> Result<Option<Chunk<String>>> {
        if !self.read_next()? {
            return Ok(None);
        }
        Ok(Some(Chunk::new(self.buf.clone())))
    }

    /// Drops the underlying reader; later reads report exhaustion.
    fn release(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}

/// NDJSON: one `serde_json::Value` per non-blank line. A malformed line is a read failure.
pub struct JsonLineSource {
    lines: LineSource,
}

impl JsonLineSource {
    pub fn new(lines: LineSource) -> Self {
        Self { lines }
    }

    pub fn open(path: &Path, read_buf_bytes: usize) -> Result<Self> {
        Ok(Self::new(LineSource::open(path, read_buf_bytes)?))
    }
}

impl SequentialSource<Value> for JsonLineSource {
    fn next_chunk(&mut self) -> Result<Option<Chunk<Value>>> {
        loop {
            if !self.lines.read_next()? {
                return Ok(None);
            }
            let line = self.lines.buf.trim();
            if line.is_empty() {
                continue;
            }
            let val: Value = serde_json::from_str(line)
                .with_context(|| format!("parse JSON at line {}", self.lines.line_no))?;
            return Ok(Some(Chunk::new(val)));
        }
    }

    fn release(&mut self) -> Result<()> {
        self.lines.release()
    }
}

/// Any iterator as a chunk source.
pub struct IterSource<I> {
    iter: Option<I>,
}

impl<I> IterSource<I> {
    pub fn new(iter: I) -> Self {
        Self { iter: Some(iter) }
    }
}

impl<I> SequentialSource<I::Item> for IterSource<I>
where
    I: Iterator + Send,
{
    fn next_chunk(&mut self) -> Result<Option<Chunk<I::Item>>> {
        Ok(self.iter.as_mut().and_then(Iterator::next).map(Chunk::new))
    }

    fn release(&mut self) -> Result<()> {
        self.iter = None;
        Ok(())
    }
}
