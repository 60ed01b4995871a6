//! Runs one grid cell: start servers, drive load, tear down, measure.

use lt_load::{LoadCounters, LoadDriver, LoadPlan};
use lt_server::{AcceleratorToken, ServerLaunchConfig, ServerPool};
use lt_types::{CellResult, CellStatus, LoadTotals, ParameterPoint, SweepConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// Per-cell execution knobs, taken from the sweep and launch configs.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorSettings {
    pub model: String,
    pub request_count: u64,
    /// Covers both server startup and the load phase.
    pub per_cell_timeout: Duration,
    pub startup_attempts: u32,
}

impl ExecutorSettings {
    pub fn from_config(config: &SweepConfig) -> Self {
        Self {
            model: config.model_id.clone(),
            request_count: config.request_count_per_cell,
            per_cell_timeout: config.per_cell_timeout(),
            startup_attempts: 1,
        }
    }

    pub fn with_launch(mut self, launch: &ServerLaunchConfig) -> Self {
        self.startup_attempts = launch.startup_attempts;
        self
    }

    pub fn with_startup_attempts(mut self, attempts: u32) -> Self {
        self.startup_attempts = attempts;
        self
    }
}

/// Drives a cell through `Pending → Starting → Running` to one of
/// `Completed`, `StartupFailed` or `TimedOut`.
///
/// [`CellExecutor::execute`] never fails: every problem below the cell level
/// ends up in the returned [`CellResult`]. Any pool it acquired has been
/// released by the time it returns.
pub struct CellExecutor<P> {
    pool: P,
    driver: Arc<dyn LoadDriver>,
    settings: ExecutorSettings,
}

impl<P: ServerPool> CellExecutor<P> {
    pub fn new(pool: P, driver: Arc<dyn LoadDriver>, settings: ExecutorSettings) -> Self {
        Self {
            pool,
            driver,
            settings,
        }
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub async fn execute(&self, token: &mut AcceleratorToken, point: ParameterPoint) -> CellResult {
        let deadline = Instant::now() + self.settings.per_cell_timeout;
        debug!(%point, pool = self.pool.name(), "cell starting");

        // A failed or abandoned acquire tears down its own partial work.
        let attempts = self.settings.startup_attempts.max(1);
        let mut attempt = 0;
        let acquired = loop {
            attempt += 1;
            let acquire = self.pool.acquire(&mut *token, &point, &self.settings.model);
            match timeout_at(deadline, acquire).await {
                Ok(Ok(handle)) => break Some(handle),
                Ok(Err(e)) if attempt < attempts => {
                    warn!(%point, attempt, error = %e, "server pool failed to start, retrying");
                }
                Ok(Err(e)) => {
                    warn!(%point, attempt, error = %e, "server pool failed to start");
                    break None;
                }
                Err(_) => {
                    warn!(%point, attempt, "cell deadline elapsed during startup");
                    break None;
                }
            }
        };
        let Some(mut handle) = acquired else {
            return CellResult::startup_failed(point);
        };

        let plan = LoadPlan::for_point(&self.settings.model, &point, self.settings.request_count);
        let counters = Arc::new(LoadCounters::new());
        let driver = Arc::clone(&self.driver);
        let endpoints = handle.endpoints();
        let task_counters = Arc::clone(&counters);

        let load_started = Instant::now();
        let mut load = tokio::spawn(async move { driver.drive(endpoints, plan, task_counters).await });

        let result = match timeout_at(deadline, &mut load).await {
            Ok(Ok(Ok(report))) => {
                CellResult::measured(point, CellStatus::Completed, report.totals, report.wall_time)
            }
            Ok(Ok(Err(e))) => {
                warn!(%point, driver = self.driver.name(), error = %e, "load driver failed");
                self.faulted(point, &counters, load_started.elapsed())
            }
            Ok(Err(e)) => {
                warn!(%point, driver = self.driver.name(), error = %e, "load driver aborted");
                self.faulted(point, &counters, load_started.elapsed())
            }
            Err(_) => {
                load.abort();
                let _ = load.await;
                let totals = abandoned(&counters);
                warn!(
                    %point,
                    sent = totals.requests_sent,
                    failed = totals.requests_failed,
                    "cell deadline elapsed during load"
                );
                CellResult::measured(point, CellStatus::TimedOut, totals, load_started.elapsed())
            }
        };

        self.pool.release(&mut handle).await;

        info!(
            %point,
            status = %result.status,
            tps = result.throughput_tps,
            sent = result.requests_sent,
            failed = result.requests_failed,
            "cell finished"
        );
        result
    }

    /// The driver stopped early: whatever it never sent counts as sent and
    /// failed.
    fn faulted(&self, point: ParameterPoint, counters: &LoadCounters, wall_time: Duration) -> CellResult {
        let mut totals = abandoned(counters);
        let unsent = self.settings.request_count.saturating_sub(totals.requests_sent);
        totals.requests_sent += unsent;
        totals.requests_failed += unsent;
        CellResult::measured(point, CellStatus::Completed, totals, wall_time)
    }
}

/// Counters after the load task was stopped. Requests still awaiting a
/// response when it stopped never will get one, so they count as failed.
fn abandoned(counters: &LoadCounters) -> LoadTotals {
    let mut totals = counters.snapshot();
    totals.requests_failed += counters.in_flight();
    totals
}
