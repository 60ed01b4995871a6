//! # lt-sweep
//!
//! Orchestrates a throughput sweep: every point of the parameter grid is run
//! as one cell, strictly one after another, and the results are aggregated
//! into a [`lt_types::SweepSummary`] with the best configuration picked out.
//!
//! ```text
//! ParameterGrid ──► CellExecutor ──► ResultAggregator
//!                    │    │                 │
//!               ServerPool LoadDriver   CsvRecordStore, sinks, SweepMetrics
//! ```

mod aggregator;
mod config;
mod executor;
mod grid;
mod metrics;
mod runner;
mod status;

#[cfg(test)]
mod fakes;

pub use aggregator::ResultAggregator;
pub use config::{OutputConfig, RunConfig, SinkConfig};
pub use executor::{CellExecutor, ExecutorSettings};
pub use grid::{GridIter, ParameterGrid};
pub use metrics::{SweepMetrics, SWEEP_TYPE};
pub use runner::{CancelFlag, SweepRunner};
pub use status::serve_status;
