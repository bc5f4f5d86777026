//! Progress reporting.
//!
//! Uploads report progress as percentage *increments*: the values passed
//! to [`ProgressSink::report`] over a complete upload sum to 100.

use std::sync::Mutex;

/// Receives progress increments (in percent of the whole operation).
pub trait ProgressSink: Send + Sync {
    fn report(&self, increment: f64);
}

/// Discards all reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _increment: f64) {}
}

/// Callback invoked with `(increment, percent)` after every report.
pub type ProgressCallback = Box<dyn Fn(f64, f64) + Send + Sync>;

/// Accumulates increments into an overall percentage and notifies callbacks.
pub struct ProgressTracker {
    inner: Mutex<TrackerInner>,
}

struct TrackerInner {
    percent: f64,
    callbacks: Vec<ProgressCallback>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TrackerInner {
                percent: 0.0,
                callbacks: Vec::new(),
            }),
        }
    }

    /// Registers a progress callback.
    pub fn on_progress(&self, callback: ProgressCallback) {
        self.inner.lock().unwrap().callbacks.push(callback);
    }

    /// Returns the accumulated percentage, capped at 100.
    pub fn percent(&self) -> f64 {
        self.inner.lock().unwrap().percent
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ProgressTracker {
    fn report(&self, increment: f64) {
        let mut inner = self.inner.lock().unwrap();
        // Float error can push the running sum a hair past 100.
        inner.percent = (inner.percent + increment).min(100.0);
        let percent = inner.percent;
        for cb in &inner.callbacks {
            cb(increment, percent);
        }
    }
}

/// Forwards increments to another sink multiplied by a fixed factor.
///
/// Used when several uploads share one sink: each gets `1 / n` of it.
pub struct ScaledProgress<'a> {
    inner: &'a dyn ProgressSink,
    factor: f64,
}

impl<'a> ScaledProgress<'a> {
    pub fn new(inner: &'a dyn ProgressSink, factor: f64) -> Self {
        Self { inner, factor }
    }
}

impl ProgressSink for ScaledProgress<'_> {
    fn report(&self, increment: f64) {
        self.inner.report(increment * self.factor);
    }
}
