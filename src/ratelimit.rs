//! Per-key sliding-window admission control.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

/// Sliding-window rate limiter with one bucket per key (usually a user id).
///
/// Buckets that drain empty are dropped: on lookup for their own key, and by
/// a sweep that `check` runs at most once per window.
pub struct SlidingWindowRateLimiter {
    limit: u32,
    window: Duration,
    state: Mutex<State>,
}

struct State {
    buckets: HashMap<String, VecDeque<Instant>>,
    last_sweep: Instant,
}

impl State {
    fn sweep(&mut self, now: Instant, window: Duration) {
        self.buckets.retain(|_, timestamps| {
            prune(timestamps, now, window);
            !timestamps.is_empty()
        });
        self.last_sweep = now;
    }
}

impl SlidingWindowRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            state: Mutex::new(State {
                buckets: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_calls, Duration::from_secs(config.window_secs))
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns true if the call is admitted (and records it), false if the
    /// key is over its limit. A rejected call leaves no trace.
    /// A limit of 0 means unlimited (always allows).
    pub fn check(&self, key: &str) -> bool {
        if self.limit == 0 {
            return true;
        }

        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if now.duration_since(state.last_sweep) >= self.window {
            state.sweep(now, self.window);
        }
        let timestamps = state.buckets.entry(key.to_string()).or_default();
        prune(timestamps, now, self.window);

        if timestamps.len() >= self.limit as usize {
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Calls still available to `key` in the current window.
    pub fn remaining(&self, key: &str) -> u32 {
        if self.limit == 0 {
            return u32::MAX;
        }
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let used = match state.buckets.get_mut(key) {
            Some(timestamps) => {
                prune(timestamps, now, self.window);
                timestamps.len() as u32
            }
            None => 0,
        };
        if used == 0 {
            state.buckets.remove(key);
        }
        self.limit.saturating_sub(used)
    }

    /// Forget the history of one key.
    pub fn reset(&self, key: &str) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .buckets
            .remove(key);
    }

    /// Remove keys with no active timestamps now.
    pub fn sweep(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.sweep(Instant::now(), self.window);
    }

    /// Number of tracked keys.
    pub fn key_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .buckets
            .len()
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while timestamps
        .front()
        .is_some_and(|&t| now.duration_since(t) >= window)
    {
        timestamps.pop_front();
    }
}
