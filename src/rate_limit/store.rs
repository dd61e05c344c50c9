//! Sliding Window Store
//!
//! Timestamps of admitted requests, kept per scope.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Request timestamps inside one trailing window
///
/// Invariant after `prune(now, window)`: every entry is `> now - window`.
#[derive(Debug, Clone, Default)]
pub struct SlidingWindow {
    hits: VecDeque<Instant>,
}

impl SlidingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop timestamps that have left the window
    pub fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.hits.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn record(&mut self, now: Instant) {
        self.hits.push_back(now);
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Time until the oldest entry expires, rounded up to whole seconds
    pub fn retry_after_secs(&self, now: Instant, window: Duration) -> u64 {
        match self.hits.front() {
            Some(&oldest) => {
                let remaining = window.saturating_sub(now.saturating_duration_since(oldest));
                let secs = remaining.as_secs();
                if remaining.subsec_nanos() > 0 {
                    secs + 1
                } else {
                    secs.max(1)
                }
            }
            None => 0,
        }
    }
}

/// All windows tracked by the limiter
#[derive(Debug, Default)]
pub struct WindowStore {
    pub global: SlidingWindow,
    pub per_ip: HashMap<String, SlidingWindow>,
    pub per_key: HashMap<String, SlidingWindow>,
    last_sweep: Option<Instant>,
}

impl WindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prune every window and forget scopes that became empty
    pub fn prune_all(&mut self, now: Instant, window: Duration) {
        self.global.prune(now, window);
        prune_map(&mut self.per_ip, now, window);
        prune_map(&mut self.per_key, now, window);
    }

    /// Forget idle per-IP and per-key scopes at most once per window
    ///
    /// Runs on the admission path, so the maps stay bounded by the callers
    /// seen in roughly the last two windows. Returns whether a sweep ran.
    pub fn sweep_idle(&mut self, now: Instant, window: Duration) -> bool {
        let due = match self.last_sweep {
            Some(last) => now.saturating_duration_since(last) >= window,
            None => true,
        };
        if due {
            prune_map(&mut self.per_ip, now, window);
            prune_map(&mut self.per_key, now, window);
            self.last_sweep = Some(now);
        }
        due
    }

    pub fn clear(&mut self) {
        self.global = SlidingWindow::new();
        self.per_ip.clear();
        self.per_key.clear();
        self.last_sweep = None;
    }
}

fn prune_map(map: &mut HashMap<String, SlidingWindow>, now: Instant, window: Duration) {
    map.retain(|_, w| {
        w.prune(now, window);
        !w.is_empty()
    });
}
