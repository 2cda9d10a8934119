//! Usage statistics.
//!
//! Lock-free counters fed by the agent loop: token usage from provider
//! responses plus request and tool-call counts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::providers::Usage;

/// Monotonic usage counters with an explicit [`UsageStats::reset`].
#[derive(Debug)]
pub struct UsageStats {
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    total_tokens: AtomicU64,
    requests: AtomicU64,
    tool_calls: AtomicU64,
    started: Instant,
}

/// Point-in-time copy of [`UsageStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub requests: u64,
    pub tool_calls: u64,
}

impl UsageStats {
    pub fn new() -> Self {
        Self {
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
            total_tokens: AtomicU64::new(0),
            requests: AtomicU64::new(0),
            tool_calls: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Record one provider response. A missing usage block still counts
    /// as a request.
    pub fn record(&self, usage: Option<&Usage>) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if let Some(u) = usage {
            self.prompt_tokens
                .fetch_add(u64::from(u.prompt_tokens), Ordering::Relaxed);
            self.completion_tokens
                .fetch_add(u64::from(u.completion_tokens), Ordering::Relaxed);
            self.total_tokens
                .fetch_add(u64::from(u.total_tokens), Ordering::Relaxed);
        }
    }

    /// Record one executed tool call.
    pub fn record_tool(&self) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            tool_calls: self.tool_calls.load(Ordering::Relaxed),
        }
    }

    /// One-line report.
    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "Tokens: {} (prompt {}, completion {}) | Requests: {} | Tool calls: {} | Uptime: {}s",
            s.total_tokens,
            s.prompt_tokens,
            s.completion_tokens,
            s.requests,
            s.tool_calls,
            self.started.elapsed().as_secs()
        )
    }

    pub fn reset(&self) {
        self.prompt_tokens.store(0, Ordering::Relaxed);
        self.completion_tokens.store(0, Ordering::Relaxed);
        self.total_tokens.store(0, Ordering::Relaxed);
        self.requests.store(0, Ordering::Relaxed);
        self.tool_calls.store(0, Ordering::Relaxed);
    }
}

impl Default for UsageStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_usage() {
        let stats = UsageStats::new();
        stats.record(Some(&Usage::new(10, 5)));
        stats.record(Some(&Usage::new(3, 2)));
        stats.record(None);
        stats.record_tool();

        let s = stats.snapshot();
        assert_eq!(s.prompt_tokens, 13);
        assert_eq!(s.completion_tokens, 7);
        assert_eq!(s.total_tokens, 20);
        assert_eq!(s.requests, 3);
        assert_eq!(s.tool_calls, 1);
    }

    #[test]
    fn test_summary_and_reset() {
        let stats = UsageStats::new();
        stats.record(Some(&Usage::new(100, 50)));
        assert!(stats.summary().starts_with("Tokens: 150 (prompt 100, completion 50) | Requests: 1"));

        stats.reset();
        assert_eq!(stats.snapshot(), UsageSnapshot::default());
    }
}
