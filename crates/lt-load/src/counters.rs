//! Shared measurement counters.

use lt_types::LoadTotals;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lock-free counters updated by every request stream.
#[derive(Debug, Default)]
pub struct LoadCounters {
    sent: AtomicU64,
    finished: AtomicU64,
    failed: AtomicU64,
    tokens: AtomicU64,
}

impl LoadCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// A request came back with a usable token count.
    pub fn record_succeeded(&self, tokens: u64) {
        self.tokens.fetch_add(tokens, Ordering::Relaxed);
        self.finished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.finished.fetch_add(1, Ordering::Relaxed);
    }

    /// Requests sent that have neither succeeded nor failed yet.
    pub fn in_flight(&self) -> u64 {
        let finished = self.finished.load(Ordering::Relaxed);
        self.sent.load(Ordering::Relaxed).saturating_sub(finished)
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> LoadTotals {
        LoadTotals {
            tokens_generated: self.tokens.load(Ordering::Relaxed),
            requests_sent: self.sent.load(Ordering::Relaxed),
            requests_failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of a completed load run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadReport {
    /// First dispatch to last response.
    pub wall_time: Duration,
    pub totals: LoadTotals,
}
