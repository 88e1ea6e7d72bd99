//! Per-key rate limiting for noisy debug logs.
//!
//! Stale document-view reports and dropped completions can arrive in bursts
//! (dozens per second while a view scrolls).  [`RateLimitedLog`] emits the
//! first line per key, swallows repeats inside the window and reports how
//! many were swallowed with the next line that gets through.

use std::collections::HashMap;
use std::time::{Duration, Instant};

const MAX_KEYS: usize = 200;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    last_emit: Instant,
    suppressed: u32,
}

#[derive(Debug)]
pub struct RateLimitedLog {
    scope: &'static str,
    window: Duration,
    buckets: HashMap<&'static str, Bucket>,
}

impl RateLimitedLog {
    pub fn new(scope: &'static str, window: Duration) -> Self {
        Self {
            scope,
            window,
            buckets: HashMap::new(),
        }
    }

    /// Log `message()` at debug level unless `key` was logged less than one
    /// window ago.  Returns whether a line was emitted.
    pub fn debug(&mut self, key: &'static str, now: Instant, message: impl FnOnce() -> String) -> bool {
        if let Some(bucket) = self.buckets.get_mut(key) {
            if now.saturating_duration_since(bucket.last_emit) < self.window {
                bucket.suppressed += 1;
                return false;
            }
            let suppressed = std::mem::take(&mut bucket.suppressed);
            bucket.last_emit = now;
            if suppressed > 0 {
                log::debug!("{}: {} (+{suppressed} similar suppressed)", self.scope, message());
            } else {
                log::debug!("{}: {}", self.scope, message());
            }
            return true;
        }

        if self.buckets.len() >= MAX_KEYS {
            self.buckets.clear();
        }
        self.buckets.insert(
            key,
            Bucket {
                last_emit: now,
                suppressed: 0,
            },
        );
        log::debug!("{}: {}", self.scope, message());
        true
    }

    /// Repeats swallowed for `key` since its last emitted line.
    pub fn suppressed(&self, key: &str) -> u32 {
        self.buckets.get(key).map_or(0, |b| b.suppressed)
    }
}
