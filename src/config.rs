use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Executor options with defaults and builder chaining.
/// Treated as immutable for the duration of one `execute()` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorOptions {
    pub pool_size: usize,                // number of concurrent workers
    pub quota: u64,                      // admissions per window, 0 = unlimited
    pub window_ms: u64,                  // admission window span
    pub timeout_ms: u64,                 // max wait in execute(); 0 = don't wait
    pub progress: bool,                  // show a spinner counting executed tasks
    pub progress_label: Option<String>,  // optional spinner message
    pub thread_name: String,             // worker thread name prefix
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            quota: 0,
            window_ms: 0,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            progress: false,
            progress_label: None,
            thread_name: "chunk-worker".to_string(),
        }
    }
}

impl ExecutorOptions {
    pub fn with_pool_size(mut self, n: usize) -> Self {
        self.pool_size = n.max(1);
        self
    }
    pub fn with_quota(mut self, quota: u64) -> Self {
        self.quota = quota;
        self
    }
    pub fn with_window_ms(mut self, ms: u64) -> Self {
        self.window_ms = ms;
        self
    }
    /// Shorthand for `with_quota(quota).with_window_ms(window_ms)`.
    pub fn with_rate(self, quota: u64, window_ms: u64) -> Self {
        self.with_quota(quota).with_window_ms(window_ms)
    }
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_progress_label(mut self, label: impl Into<String>) -> Self {
        self.progress_label = Some(label.into());
        self
    }
    pub fn with_thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    #[inline]
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parse options from JSON; missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let opts: Self = serde_json::from_str(s).context("parse executor options")?;
        Ok(opts.normalized())
    }

    /// Override fields from the environment:
    /// - CHUNKEXEC_POOL_SIZE
    /// - CHUNKEXEC_QUOTA
    /// - CHUNKEXEC_WINDOW_MS
    /// - CHUNKEXEC_TIMEOUT_MS
    /// Unparseable values are reported and ignored.
    pub fn merge_env(mut self) -> Self {
        if let Some(n) = env_number::<usize>("CHUNKEXEC_POOL_SIZE") {
            self.pool_size = n;
        }
        if let Some(n) = env_number::<u64>("CHUNKEXEC_QUOTA") {
            self.quota = n;
        }
        if let Some(n) = env_number::<u64>("CHUNKEXEC_WINDOW_MS") {
            self.window_ms = n;
        }
        if let Some(n) = env_number::<u64>("CHUNKEXEC_TIMEOUT_MS") {
            self.timeout_ms = n;
        }
        self.normalized()
    }

    fn normalized(mut self) -> Self {
        self.pool_size = self.pool_size.max(1);
        self
    }
}

fn env_number<N: std::str::FromStr>(key: &str) -> Option<N> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<N>() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!("{} is set but is not a valid number: {:?}", key, raw);
            None
        }
    }
}
