//! Accumulates cells in grid order and tracks the best one.

use lt_types::{CellResult, SweepConfig, SweepSummary};
use tracing::info;

/// Sole writer of a [`SweepSummary`] while a sweep runs.
#[derive(Debug)]
pub struct ResultAggregator {
    summary: SweepSummary,
}

impl ResultAggregator {
    pub fn new(config: SweepConfig) -> Self {
        Self {
            summary: SweepSummary::new(config),
        }
    }

    /// Append a cell. Returns true when it became the new best.
    pub fn record(&mut self, cell: CellResult) -> bool {
        let before = self.summary.best_index();
        self.summary.push(cell);
        let after = self.summary.best_index();

        let improved = after.is_some() && after != before;
        if improved {
            if let Some(best) = self.summary.best() {
                info!(point = %best.params, tps = best.throughput_tps, "new best configuration");
            }
        }
        improved
    }

    pub fn summary(&self) -> &SweepSummary {
        &self.summary
    }

    pub fn best(&self) -> Option<&CellResult> {
        self.summary.best()
    }

    pub fn len(&self) -> usize {
        self.summary.cells().len()
    }

    pub fn is_empty(&self) -> bool {
        self.summary.cells().is_empty()
    }

    pub fn mark_completed(&mut self) {
        self.summary.mark_completed();
    }

    pub fn mark_cancelled(&mut self) {
        self.summary.mark_cancelled();
    }

    pub fn set_result_location(&mut self, location: impl Into<String>) {
        self.summary.result_location = Some(location.into());
    }

    pub fn into_summary(self) -> SweepSummary {
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lt_types::{AxisValues, CellStatus, LoadTotals, ParameterPoint};
    use std::time::Duration;

    fn cell(point: ParameterPoint, tokens: u64, failed: u64) -> CellResult {
        CellResult::measured(
            point,
            CellStatus::Completed,
            LoadTotals {
                tokens_generated: tokens,
                requests_sent: 10,
                requests_failed: failed,
            },
            Duration::from_secs(1),
        )
    }

    fn aggregator() -> ResultAggregator {
        ResultAggregator::new(
            SweepConfig::new("m", AxisValues::new(vec![1, 2], vec![1], vec![8], vec![1, 4]))
                .with_error_rate_threshold(0.1),
        )
    }

    #[test]
    fn best_follows_qualifying_throughput() {
        let mut agg = aggregator();
        assert!(agg.best().is_none());

        assert!(agg.record(cell(ParameterPoint::new(1, 1, 8, 1), 100, 0)));
        assert!(agg.record(cell(ParameterPoint::new(1, 1, 8, 4), 300, 0)));
        // Faster but 20% failed: excluded.
        assert!(!agg.record(cell(ParameterPoint::new(2, 1, 8, 1), 900, 2)));
        assert!(!agg.record(CellResult::startup_failed(ParameterPoint::new(2, 1, 8, 4))));

        assert_eq!(agg.len(), 4);
        assert_eq!(agg.best().map(|c| c.params), Some(ParameterPoint::new(1, 1, 8, 4)));
    }

    #[test]
    fn cells_keep_insertion_order() {
        let mut agg = aggregator();
        let points = [
            ParameterPoint::new(1, 1, 8, 1),
            ParameterPoint::new(1, 1, 8, 4),
            ParameterPoint::new(2, 1, 8, 1),
        ];
        for (i, point) in points.iter().enumerate() {
            agg.record(cell(*point, 100 * (3 - i as u64), 0));
        }

        let recorded: Vec<_> = agg.summary().cells().iter().map(|c| c.params).collect();
        assert_eq!(recorded, points);
        assert_eq!(agg.best().map(|c| c.params), Some(points[0]));
    }

    #[test]
    fn no_qualifying_cell_leaves_best_absent() {
        let mut agg = aggregator();
        agg.record(cell(ParameterPoint::new(1, 1, 8, 1), 100, 5));
        agg.record(CellResult::startup_failed(ParameterPoint::new(1, 1, 8, 4)));
        agg.mark_completed();

        let summary = agg.into_summary();
        assert!(summary.best().is_none());
        assert!(summary.completed_at.is_some());
        assert!(!summary.cancelled);
    }
}
