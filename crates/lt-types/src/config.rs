//! Sweep configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{LtError, LtResult};
use crate::point::AxisValues;

/// Immutable description of one sweep, built and validated before any
/// component runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Model identifier or path handed to every server instance.
    pub model_id: String,

    /// Candidate values for each of the four axes.
    pub axis_values: AxisValues,

    /// Hard deadline for one cell, covering startup and load.
    #[serde(default = "default_per_cell_timeout_secs")]
    pub per_cell_timeout_secs: u64,

    /// Number of HTTP requests issued per cell, across all streams.
    #[serde(default = "default_request_count")]
    pub request_count_per_cell: u64,

    /// Cells whose error rate exceeds this are never picked as best.
    #[serde(default = "default_error_rate_threshold")]
    pub error_rate_threshold: f64,
}

fn default_per_cell_timeout_secs() -> u64 {
    300
}

fn default_request_count() -> u64 {
    64
}

fn default_error_rate_threshold() -> f64 {
    0.05
}

impl SweepConfig {
    pub fn new(model_id: impl Into<String>, axis_values: AxisValues) -> Self {
        Self {
            model_id: model_id.into(),
            axis_values,
            per_cell_timeout_secs: default_per_cell_timeout_secs(),
            request_count_per_cell: default_request_count(),
            error_rate_threshold: default_error_rate_threshold(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_cell_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_request_count(mut self, n: u64) -> Self {
        self.request_count_per_cell = n;
        self
    }

    pub fn with_error_rate_threshold(mut self, threshold: f64) -> Self {
        self.error_rate_threshold = threshold;
        self
    }

    pub fn per_cell_timeout(&self) -> Duration {
        Duration::from_secs(self.per_cell_timeout_secs)
    }

    /// Total number of cells the grid will produce.
    pub fn grid_size(&self) -> usize {
        self.axis_values.grid_size().unwrap_or(usize::MAX)
    }

    /// Reject anything that would make the sweep meaningless.
    pub fn validate(&self) -> LtResult<()> {
        if self.model_id.trim().is_empty() {
            return Err(crate::config_error!("model_id must not be empty"));
        }
        if self.per_cell_timeout_secs == 0 {
            return Err(crate::config_error!("per_cell_timeout_secs must be positive"));
        }
        if self.request_count_per_cell == 0 {
            return Err(crate::config_error!(
                "request_count_per_cell must be at least 1"
            ));
        }
        if !(0.0..=1.0).contains(&self.error_rate_threshold) {
            return Err(crate::config_error!(
                "error_rate_threshold must be within [0, 1], got {}",
                self.error_rate_threshold
            ));
        }
        self.axis_values.validate().map_err(LtError::from)?;
        Ok(())
    }
}
