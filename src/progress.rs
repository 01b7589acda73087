//! Progress reporting: an optional spinner counting executed tasks.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Optional global MultiProgress that allows multiple bars to render concurrently.
/// If unset, spinners draw to the default terminal target.
static GLOBAL_MP: OnceLock<Arc<MultiProgress>> = OnceLock::new();

/// Install a global MultiProgress used by all subsequently created spinners.
/// Safe to call once; additional calls are ignored.
pub fn set_global_multiprogress(mp: Arc<MultiProgress>) {
    let _ = GLOBAL_MP.set(mp);
}

fn new_spinner() -> ProgressBar {
    if let Some(mp) = GLOBAL_MP.get() {
        mp.add(ProgressBar::new_spinner())
    } else {
        ProgressBar::new_spinner()
    }
}

/// Spinner showing tasks executed so far and throughput. The total is unknown up front.
pub fn make_task_spinner(label: Option<&str>) -> ProgressBar {
    let pb = new_spinner();
    let style = ProgressStyle::with_template(
        "{spinner:.green} {msg} {pos} tasks  it/s: {per_sec}  elapsed: {elapsed_precise}"
    )
    .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    if let Some(msg) = label {
        pb.set_message(msg.to_string());
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
