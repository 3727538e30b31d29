//! Rate-limited queue depth warnings.
//!
//! A queue growing past its threshold means the consumer (the polling caller
//! for events, the send thread for outbound payloads) is not keeping up.
//! Logging on every item would make that worse, so at most one warning is
//! emitted per interval. Nothing is ever dropped or throttled.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;

pub struct QueueWatch {
    name: &'static str,
    threshold: usize,
    interval: Duration,
    last_warning: Mutex<Option<Instant>>,
}

impl QueueWatch {
    pub fn new(name: &'static str, threshold: usize, interval: Duration) -> Self {
        Self {
            name,
            threshold,
            interval,
            last_warning: Mutex::new(None),
        }
    }

    /// Check a queue depth. Returns `true` if a warning was logged.
    pub fn check(&self, depth: usize) -> bool {
        if depth <= self.threshold {
            return false;
        }

        let mut last = self
            .last_warning
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if last.is_some_and(|at| now.duration_since(at) < self.interval) {
            return false;
        }
        *last = Some(now);
        drop(last);

        warn!(
            queue = self.name,
            depth,
            threshold = self.threshold,
            "Queue is getting big, the consumer is not keeping up"
        );
        true
    }
}
