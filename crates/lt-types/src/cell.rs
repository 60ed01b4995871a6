//! Measured outcome of one grid cell.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::point::ParameterPoint;

/// Terminal state of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    Completed,
    StartupFailed,
    TimedOut,
}

impl CellStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellStatus::Completed => "completed",
            CellStatus::StartupFailed => "startup_failed",
            CellStatus::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for CellStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw counters for one load phase, complete or partial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadTotals {
    pub tokens_generated: u64,
    pub requests_sent: u64,
    pub requests_failed: u64,
}

/// One measured cell. Created exactly once per attempted point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellResult {
    pub params: ParameterPoint,
    pub throughput_tps: f64,
    pub tokens_generated: u64,
    pub requests_sent: u64,
    pub requests_failed: u64,
    pub wall_time_secs: f64,
    pub error_rate: f64,
    pub status: CellStatus,
}

impl CellResult {
    /// Build a result from load counters; throughput and error rate are
    /// derived here and nowhere else.
    pub fn measured(
        params: ParameterPoint,
        status: CellStatus,
        totals: LoadTotals,
        wall_time: Duration,
    ) -> Self {
        let wall_time_secs = wall_time.as_secs_f64();
        let throughput_tps = if wall_time_secs > 0.0 {
            totals.tokens_generated as f64 / wall_time_secs
        } else {
            0.0
        };
        let error_rate = if totals.requests_sent > 0 {
            totals.requests_failed as f64 / totals.requests_sent as f64
        } else {
            0.0
        };

        Self {
            params,
            throughput_tps,
            tokens_generated: totals.tokens_generated,
            requests_sent: totals.requests_sent,
            requests_failed: totals.requests_failed,
            wall_time_secs,
            error_rate,
            status,
        }
    }

    /// Degenerate result for a cell whose servers never became ready.
    pub fn startup_failed(params: ParameterPoint) -> Self {
        Self::measured(
            params,
            CellStatus::StartupFailed,
            LoadTotals::default(),
            Duration::ZERO,
        )
    }

    pub fn wall_time(&self) -> Duration {
        Duration::from_secs_f64(self.wall_time_secs.max(0.0))
    }

    /// Eligible for best: completed and within the error budget.
    pub fn qualifies(&self, error_rate_threshold: f64) -> bool {
        self.status == CellStatus::Completed && self.error_rate <= error_rate_threshold
    }
}
