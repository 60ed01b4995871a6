//! Prometheus gauges and counters fed by the sweep runner.

use lt_types::{CellResult, CellStatus, SweepSummary};
use prometheus::{Encoder, Gauge, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};

/// Label value for the `sweep_type` dimension. Every sweep here walks the
/// full four-axis grid.
pub const SWEEP_TYPE: &str = "grid";

/// Metrics for one process, on a private registry.
///
/// Cloning is cheap and every clone updates the same series.
#[derive(Clone)]
pub struct SweepMetrics {
    registry: Registry,
    throughput_tps: GaugeVec,
    sweeps_total: IntCounterVec,
    errors_total: IntCounterVec,
    last_sweep_timestamp: Gauge,
    best_throughput_tps: GaugeVec,
}

impl SweepMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let throughput_tps = GaugeVec::new(
            Opts::new(
                "llama_benchmark_throughput_tps",
                "Tokens per second for the most recent measurement",
            ),
            &["model", "sweep_type", "config"],
        )?;
        let sweeps_total = IntCounterVec::new(
            Opts::new("llama_benchmark_sweeps_total", "Total number of completed sweeps"),
            &["sweep_type"],
        )?;
        let errors_total = IntCounterVec::new(
            Opts::new("llama_benchmark_errors_total", "Total benchmark errors"),
            &["sweep_type"],
        )?;
        let last_sweep_timestamp = Gauge::new(
            "llama_benchmark_last_sweep_timestamp",
            "Unix timestamp of most recent completed sweep",
        )?;
        let best_throughput_tps = GaugeVec::new(
            Opts::new(
                "llama_benchmark_best_throughput_tps",
                "Best throughput achieved across all sweeps",
            ),
            &["model", "sweep_type"],
        )?;

        registry.register(Box::new(throughput_tps.clone()))?;
        registry.register(Box::new(sweeps_total.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;
        registry.register(Box::new(last_sweep_timestamp.clone()))?;
        registry.register(Box::new(best_throughput_tps.clone()))?;

        Ok(Self {
            registry,
            throughput_tps,
            sweeps_total,
            errors_total,
            last_sweep_timestamp,
            best_throughput_tps,
        })
    }

    /// Record one finished cell. Failed requests count as errors, and so
    /// does a cell whose servers never came up.
    pub fn record_cell(&self, model: &str, cell: &CellResult) {
        let config = cell.params.to_string();
        self.throughput_tps
            .with_label_values(&[model, SWEEP_TYPE, config.as_str()])
            .set(cell.throughput_tps);

        let errors = match cell.status {
            CellStatus::StartupFailed => 1,
            _ => cell.requests_failed,
        };
        if errors > 0 {
            self.errors_total.with_label_values(&[SWEEP_TYPE]).inc_by(errors);
        }
    }

    /// Record the end of a sweep. A cancelled sweep does not count as
    /// completed, but its best cell still competes for the best gauge.
    pub fn record_sweep(&self, summary: &SweepSummary) {
        if let Some(best) = summary.best() {
            let gauge = self
                .best_throughput_tps
                .with_label_values(&[summary.config.model_id.as_str(), SWEEP_TYPE]);
            if best.throughput_tps > gauge.get() {
                gauge.set(best.throughput_tps);
            }
        }

        if summary.cancelled {
            return;
        }
        self.sweeps_total.with_label_values(&[SWEEP_TYPE]).inc();
        if let Some(at) = summary.completed_at {
            self.last_sweep_timestamp.set(at.timestamp() as f64);
        }
    }

    /// Text exposition of every series.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// `Content-Type` of [`SweepMetrics::render`]'s output.
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lt_types::{AxisValues, LoadTotals, ParameterPoint, SweepConfig};
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

    #[test]
    fn cells_set_throughput_and_count_errors() {
        let metrics = SweepMetrics::new().unwrap();
        metrics.record_cell("qwen", &cell(ParameterPoint::new(1, 1, 8, 4), 400, 2));
        metrics.record_cell("qwen", &CellResult::startup_failed(ParameterPoint::new(2, 1, 8, 4)));

        let text = metrics.render().unwrap();
        assert!(text.contains(
            r#"llama_benchmark_throughput_tps{config="(1,1,8,4)",model="qwen",sweep_type="grid"} 400"#
        ));
        assert!(text.contains(
            r#"llama_benchmark_throughput_tps{config="(2,1,8,4)",model="qwen",sweep_type="grid"} 0"#
        ));
        assert!(text.contains(r#"llama_benchmark_errors_total{sweep_type="grid"} 3"#));
    }

    #[test]
    fn completed_sweep_updates_totals_and_best() {
        let metrics = SweepMetrics::new().unwrap();
        let config = SweepConfig::new("qwen", AxisValues::new(vec![1], vec![1], vec![8], vec![4]));
        let mut summary = SweepSummary::new(config);
        summary.push(cell(ParameterPoint::new(1, 1, 8, 4), 250, 0));
        summary.mark_completed();

        metrics.record_sweep(&summary);
        metrics.record_sweep(&summary);

        let text = metrics.render().unwrap();
        assert!(text.contains(r#"llama_benchmark_sweeps_total{sweep_type="grid"} 2"#));
        assert!(text.contains(
            r#"llama_benchmark_best_throughput_tps{model="qwen",sweep_type="grid"} 250"#
        ));
        assert!(!text.contains("llama_benchmark_last_sweep_timestamp 0\n"));
    }

    #[test]
    fn cancelled_sweep_is_not_counted() {
        let metrics = SweepMetrics::new().unwrap();
        let config = SweepConfig::new("qwen", AxisValues::new(vec![1], vec![1], vec![8], vec![4]));
        let mut summary = SweepSummary::new(config);
        summary.mark_cancelled();

        metrics.record_sweep(&summary);

        let text = metrics.render().unwrap();
        assert!(!text.contains("llama_benchmark_sweeps_total{"));
        assert!(text.contains("llama_benchmark_last_sweep_timestamp 0"));
    }
}
