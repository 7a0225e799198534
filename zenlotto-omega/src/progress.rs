use std::sync::Mutex;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

/// Receives coarse progress updates from long-running stages.
pub trait ProgressSink: Sync {
    fn report(&self, percent: u8, status: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(u8, &str) + Sync,
{
    fn report(&self, percent: u8, status: &str) {
        self(percent, status)
    }
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _percent: u8, _status: &str) {}
}

/// Forwards only when the percentage advanced by `step`, `interval` elapsed,
/// or the work is complete.
pub struct Throttled<'a> {
    inner: &'a dyn ProgressSink,
    step: u8,
    interval: Duration,
    last: Mutex<Option<(u8, Instant)>>,
}

impl<'a> Throttled<'a> {
    pub fn new(inner: &'a dyn ProgressSink, step: u8, interval: Duration) -> Self {
        Self {
            inner,
            step,
            interval,
            last: Mutex::new(None),
        }
    }
}

impl ProgressSink for Throttled<'_> {
    fn report(&self, percent: u8, status: &str) {
        let percent = percent.min(100);
        let now = Instant::now();
        let forward = {
            let mut last = match self.last.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let due = match *last {
                None => true,
                Some((prev, at)) => {
                    percent == 100
                        || percent >= prev.saturating_add(self.step)
                        || now.duration_since(at) >= self.interval
                }
            };
            if due {
                *last = Some((percent, now));
            }
            due
        };
        if forward {
            self.inner.report(percent, status);
        }
    }
}

/// Terminal progress bar on a 0-100 scale.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}",
            )
            .unwrap()
            .progress_chars("=> "),
        );
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn report(&self, percent: u8, status: &str) {
        self.bar.set_position(percent as u64);
        self.bar.set_message(status.to_string());
    }
}
