//! Lifecycle events published to external observers.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cell::{CellResult, CellStatus};
use crate::point::{AxisValues, ParameterPoint};
use crate::summary::{SweepId, SweepSummary};

pub const EVENT_SOURCE: &str = "llama-throughput-lab";
pub const EVENT_VERSION: &str = "v1";

/// Events emitted at sweep boundaries and after every cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    SweepStarted {
        sweep_id: SweepId,
        model_id: String,
        axis_values: AxisValues,
        started_at: DateTime<Utc>,
    },
    CellCompleted {
        sweep_id: SweepId,
        params: ParameterPoint,
        throughput_tps: f64,
        tokens_generated: u64,
        requests_failed: u64,
        status: CellStatus,
    },
    SweepCompleted {
        sweep_id: SweepId,
        best_params: Option<ParameterPoint>,
        best_throughput_tps: Option<f64>,
        result_location: String,
        completed_at: DateTime<Utc>,
        total_cells: usize,
        cancelled: bool,
    },
}

impl LifecycleEvent {
    pub fn started(summary: &SweepSummary) -> Self {
        Self::SweepStarted {
            sweep_id: summary.sweep_id,
            model_id: summary.config.model_id.clone(),
            axis_values: summary.config.axis_values.clone(),
            started_at: summary.started_at,
        }
    }

    pub fn cell(sweep_id: SweepId, cell: &CellResult) -> Self {
        Self::CellCompleted {
            sweep_id,
            params: cell.params,
            throughput_tps: cell.throughput_tps,
            tokens_generated: cell.tokens_generated,
            requests_failed: cell.requests_failed,
            status: cell.status,
        }
    }

    pub fn completed(summary: &SweepSummary, result_location: impl Into<String>) -> Self {
        let best = summary.best();
        Self::SweepCompleted {
            sweep_id: summary.sweep_id,
            best_params: best.map(|c| c.params),
            best_throughput_tps: best.map(|c| c.throughput_tps),
            result_location: result_location.into(),
            completed_at: summary.completed_at.unwrap_or_else(Utc::now),
            total_cells: summary.cells().len(),
            cancelled: summary.cancelled,
        }
    }

    /// Message-bus subject for this event.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::SweepStarted { .. } => "llama.benchmark.started.v1",
            Self::CellCompleted { .. } => "llama.benchmark.cell.v1",
            Self::SweepCompleted { .. } => "llama.benchmark.completed.v1",
        }
    }
}

/// Wire envelope wrapped around every published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub topic: String,
    pub ts: String,
    pub version: String,
    pub source: String,
    pub payload: LifecycleEvent,
}

impl EventEnvelope {
    pub fn wrap(event: LifecycleEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: event.topic().to_string(),
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            version: EVENT_VERSION.to_string(),
            source: EVENT_SOURCE.to_string(),
            payload: event,
        }
    }
}
