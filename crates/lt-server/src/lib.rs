//! # lt-server
//!
//! Starts, health-checks and tears down the inference-server processes
//! required by one parameter point.
//!
//! The [`ServerPool`] trait is the seam between the cell executor and the
//! host: [`ProcessPool`] spawns real processes, tests substitute fakes. Both
//! operate on an [`AcceleratorToken`] borrowed mutably for the lifetime of a
//! [`PoolHandle`], so at most one pool can hold the accelerator at a time.

mod accelerator;
mod launch;
mod pool;
mod ports;
mod process;

pub use accelerator::AcceleratorToken;
pub use launch::ServerLaunchConfig;
pub use pool::{PoolError, PoolHandle, PoolResult, ServerInstance, ServerPool};
pub use ports::{PortAllocator, PortLease};
pub use process::ProcessPool;
