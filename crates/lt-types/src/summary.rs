//! Sweep summary: the ordered cells plus the derived best configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use crate::cell::CellResult;
use crate::config::SweepConfig;

/// Unique sweep identifier.
pub type SweepId = Uuid;

/// Accumulated results of one sweep.
///
/// Cells are append-only and kept in grid order. `best` is an index into
/// `cells` and is recomputed after every append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub sweep_id: SweepId,
    pub config: SweepConfig,
    cells: Vec<CellResult>,
    best: Option<usize>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled: bool,
    pub result_location: Option<String>,
}

impl SweepSummary {
    pub fn new(config: SweepConfig) -> Self {
        Self {
            sweep_id: Uuid::new_v4(),
            config,
            cells: Vec::new(),
            best: None,
            started_at: Utc::now(),
            completed_at: None,
            cancelled: false,
            result_location: None,
        }
    }

    /// Append a cell and refresh `best`.
    pub fn push(&mut self, cell: CellResult) {
        self.cells.push(cell);
        self.best = select_best(&self.cells, self.config.error_rate_threshold);
    }

    pub fn cells(&self) -> &[CellResult] {
        &self.cells
    }

    pub fn best(&self) -> Option<&CellResult> {
        self.best.and_then(|idx| self.cells.get(idx))
    }

    pub fn best_index(&self) -> Option<usize> {
        self.best
    }

    pub fn mark_completed(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
        self.completed_at = Some(Utc::now());
    }

    /// Cells ordered for display: qualifying cells first, each group ranked
    /// with the same ordering used to pick `best`.
    pub fn ranked(&self) -> Vec<&CellResult> {
        let threshold = self.config.error_rate_threshold;
        let mut indexed: Vec<(usize, &CellResult)> = self.cells.iter().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| {
            b.qualifies(threshold)
                .cmp(&a.qualifies(threshold))
                .then_with(|| rank_order(a, b))
                .then_with(|| ia.cmp(ib))
        });
        indexed.into_iter().map(|(_, cell)| cell).collect()
    }
}

/// Ordering where `Less` means "better": higher throughput, then fewer
/// instances, then lower concurrency.
fn rank_order(a: &CellResult, b: &CellResult) -> Ordering {
    b.throughput_tps
        .partial_cmp(&a.throughput_tps)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.params.instances.cmp(&b.params.instances))
        .then_with(|| a.params.concurrency.cmp(&b.params.concurrency))
}

/// Index of the best qualifying cell, earliest in grid order on a full tie.
pub fn select_best(cells: &[CellResult], error_rate_threshold: f64) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, cell) in cells.iter().enumerate() {
        if !cell.qualifies(error_rate_threshold) {
            continue;
        }
        best = match best {
            Some(current) if rank_order(cell, &cells[current]) != Ordering::Less => Some(current),
            _ => Some(idx),
        };
    }
    best
}
