//! Fixed-window rate limiting for on-demand ingestion.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Per-identity fixed-window counter: at most `quota` acquisitions per
/// `window`, counted from the first acquisition in the window.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    quota: u32,
    window: Duration,
    counters: HashMap<String, WindowState>,
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    started: Instant,
    used: u32,
}

impl FixedWindowLimiter {
    pub fn new(quota: u32, window: Duration) -> Self {
        FixedWindowLimiter {
            quota,
            window,
            counters: HashMap::new(),
        }
    }

    /// Consume one unit of `identity`'s quota. Returns `false` when the
    /// quota for the current window is exhausted.
    pub fn try_acquire(&mut self, identity: &str, now: Instant) -> bool {
        self.prune(now);

        let state = self
            .counters
            .entry(identity.to_string())
            .or_insert(WindowState { started: now, used: 0 });

        if now.duration_since(state.started) >= self.window {
            state.started = now;
            state.used = 0;
        }

        if state.used >= self.quota {
            return false;
        }
        state.used += 1;
        true
    }

    // Expired windows carry no state worth keeping; drop them so idle
    // identities do not accumulate.
    fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.counters.retain(|_, s| now.duration_since(s.started) < window);
    }
}
