//! # lt-load
//!
//! Drives concurrent completion requests against a ready set of inference
//! servers and counts tokens, requests and failures.
//!
//! Counters live in a shared [`LoadCounters`] so that a caller who cancels a
//! run part-way still sees what was measured up to that point.

mod counters;
mod driver;
mod payload;
mod plan;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use counters::{LoadCounters, LoadReport};
pub use driver::{HttpLoadDriver, LoadDriver, LoadError, LoadResult};
pub use payload::{completion_body, count_tokens};
pub use plan::{CompletionApi, LoadPlan, LoadSettings};
