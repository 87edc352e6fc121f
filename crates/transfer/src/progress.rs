use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::warn;

/// Callback invoked with upload progress in percent (`0.0..=100.0`).
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// `done / total` as a percentage. A plan with no chunks reports 0.
pub fn percent_complete(done: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    f64::from(done.min(total)) / f64::from(total) * 100.0
}

/// Invokes `callback` if present.
///
/// A panicking callback is logged and otherwise ignored; it never aborts
/// the upload that reported the progress.
pub fn notify_progress(callback: Option<&ProgressCallback>, percent: f64) {
    let Some(cb) = callback else {
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| cb(percent))).is_err() {
        warn!(percent, "progress callback panicked");
    }
}
