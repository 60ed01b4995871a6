//! Sequential sweep over the whole grid.

use lt_server::{AcceleratorToken, ServerPool};
use lt_sinks::{CsvRecordStore, EventSink, NoopEventSink, NoopStorageSink, StorageSink};
use lt_types::{LifecycleEvent, LtResult, SweepConfig, SweepSummary};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

use crate::aggregator::ResultAggregator;
use crate::executor::CellExecutor;
use crate::grid::ParameterGrid;
use crate::metrics::SweepMetrics;

/// Cooperative stop signal, checked between cells.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Walks the grid one cell at a time, persisting and publishing as it goes.
///
/// Only invalid configuration and failed writes to the local record abort a
/// sweep. Everything else is captured per cell.
pub struct SweepRunner<P> {
    config: SweepConfig,
    executor: CellExecutor<P>,
    record_path: PathBuf,
    events: Arc<dyn EventSink>,
    storage: Arc<dyn StorageSink>,
    cancel: CancelFlag,
    metrics: Option<SweepMetrics>,
}

impl<P: ServerPool> SweepRunner<P> {
    pub fn new(config: SweepConfig, executor: CellExecutor<P>, record_path: impl Into<PathBuf>) -> Self {
        Self {
            config,
            executor,
            record_path: record_path.into(),
            events: Arc::new(NoopEventSink),
            storage: Arc::new(NoopStorageSink),
            cancel: CancelFlag::new(),
            metrics: None,
        }
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_storage_sink(mut self, storage: Arc<dyn StorageSink>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_metrics(mut self, metrics: SweepMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    pub fn executor(&self) -> &CellExecutor<P> {
        &self.executor
    }

    /// Run every cell in grid order. Holding `token` for the whole call keeps
    /// any other sweep off the accelerator.
    pub async fn run(&self, token: &mut AcceleratorToken) -> LtResult<SweepSummary> {
        self.config.validate()?;
        let grid = ParameterGrid::new(&self.config.axis_values)?;
        let mut store = CsvRecordStore::create(&self.record_path)?;

        let mut aggregator = ResultAggregator::new(self.config.clone());
        let sweep_id = aggregator.summary().sweep_id;
        info!(
            %sweep_id,
            model = %self.config.model_id,
            cells = grid.len(),
            record = %self.record_path.display(),
            "sweep started"
        );
        self.events.publish(&LifecycleEvent::started(aggregator.summary()));

        for (index, point) in grid.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(%sweep_id, done = index, remaining = grid.len() - index, "sweep cancelled");
                aggregator.mark_cancelled();
                break;
            }

            let cell = self.executor.execute(token, point).await;

            if let Err(e) = store.append(&cell) {
                error!(%sweep_id, %point, error = %e, "record write failed, aborting sweep");
                self.events.flush().await;
                return Err(e.into());
            }
            self.storage.append(&cell);
            self.events.publish(&LifecycleEvent::cell(sweep_id, &cell));
            if let Some(metrics) = &self.metrics {
                metrics.record_cell(&self.config.model_id, &cell);
            }
            aggregator.record(cell);
        }

        if !aggregator.summary().cancelled {
            aggregator.mark_completed();
        }

        let location = match self.storage.seal(store.path()).await {
            Some(archived) => archived,
            None => store.path().display().to_string(),
        };
        aggregator.set_result_location(location.clone());
        self.events
            .publish(&LifecycleEvent::completed(aggregator.summary(), location));
        self.events.flush().await;

        let summary = aggregator.into_summary();
        if let Some(metrics) = &self.metrics {
            metrics.record_sweep(&summary);
        }
        match summary.best() {
            Some(best) => info!(
                %sweep_id,
                cells = summary.cells().len(),
                best = %best.params,
                tps = best.throughput_tps,
                "sweep completed"
            ),
            None => info!(
                %sweep_id,
                cells = summary.cells().len(),
                "sweep completed without a qualifying configuration"
            ),
        }
        Ok(summary)
    }
}
