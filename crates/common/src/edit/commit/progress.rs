use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives the fraction of commit work done, in `0.0..=1.0`
///
/// Values never decrease during one commit.
pub trait ProgressSink {
    fn report(&mut self, fraction: f64);
}

impl<F: FnMut(f64)> ProgressSink for F {
    fn report(&mut self, fraction: f64) {
        self(fraction)
    }
}

/// Sink that drops every report
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _fraction: f64) {}
}

/// Shared flag asking a running commit to stop at the next node
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Turns work units into monotonic progress reports
pub(crate) struct ProgressTracker<'a> {
    total: u64,
    done: u64,
    last: f64,
    sink: &'a mut dyn ProgressSink,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(total: u64, sink: &'a mut dyn ProgressSink) -> Self {
        Self {
            total,
            done: 0,
            last: 0.0,
            sink,
        }
    }

    pub(crate) fn set_total(&mut self, total: u64) {
        self.total = total;
    }

    pub(crate) fn advance(&mut self, units: u64) {
        if units == 0 {
            return;
        }
        self.done = self.done.saturating_add(units);
        let fraction = if self.total == 0 {
            1.0
        } else {
            (self.done as f64 / self.total as f64).min(1.0)
        };
        self.emit(fraction);
    }

    pub(crate) fn finish(&mut self) {
        self.emit(1.0);
    }

    fn emit(&mut self, fraction: f64) {
        if fraction > self.last {
            self.last = fraction;
            self.sink.report(fraction);
        }
    }
}
