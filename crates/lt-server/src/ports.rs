//! Port leasing for server instances.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::net::TcpListener;
use std::sync::Arc;
use tracing::debug;

use crate::pool::{PoolError, PoolResult};

#[derive(Debug)]
struct AllocatorInner {
    first: u16,
    last: u16,
    leased: Mutex<BTreeSet<u16>>,
}

/// Hands out ports from a fixed range; a port returns to the range when its
/// [`PortLease`] is dropped.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    inner: Arc<AllocatorInner>,
}

impl PortAllocator {
    pub fn new(first: u16, last: u16) -> Self {
        let (first, last) = if first <= last { (first, last) } else { (last, first) };
        Self {
            inner: Arc::new(AllocatorInner {
                first,
                last,
                leased: Mutex::new(BTreeSet::new()),
            }),
        }
    }

    /// Lease `count` ports that are free in the range and bindable on `host`.
    ///
    /// All-or-nothing: on failure no ports remain leased.
    pub fn lease(&self, count: usize, host: &str) -> PoolResult<Vec<PortLease>> {
        let picked = {
            let mut leased = self.inner.leased.lock();
            let mut picked = Vec::with_capacity(count);

            for port in self.inner.first..=self.inner.last {
                if picked.len() == count {
                    break;
                }
                if leased.contains(&port) {
                    continue;
                }
                if TcpListener::bind((host, port)).is_err() {
                    debug!(port, "port busy on host, skipping");
                    continue;
                }
                picked.push(port);
            }

            if picked.len() < count {
                return Err(PoolError::PortsExhausted {
                    requested: count,
                    available: picked.len(),
                });
            }
            leased.extend(picked.iter().copied());
            picked
        };

        Ok(picked
            .into_iter()
            .map(|port| PortLease {
                port,
                allocator: Arc::clone(&self.inner),
            })
            .collect())
    }

    /// Ports currently out on lease.
    pub fn leased(&self) -> Vec<u16> {
        self.inner.leased.lock().iter().copied().collect()
    }
}

/// A port held by one server instance.
#[derive(Debug)]
pub struct PortLease {
    port: u16,
    allocator: Arc<AllocatorInner>,
}

impl PortLease {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.allocator.leased.lock().remove(&self.port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leases_distinct_ports_and_returns_them_on_drop() {
        let allocator = PortAllocator::new(39100, 39120);
        let leases = allocator.lease(3, "127.0.0.1").unwrap();

        let mut ports: Vec<u16> = leases.iter().map(|l| l.port()).collect();
        ports.dedup();
        assert_eq!(ports.len(), 3);
        assert_eq!(allocator.leased().len(), 3);

        drop(leases);
        assert!(allocator.leased().is_empty());
    }

    #[test]
    fn exhausted_range_leaves_nothing_leased() {
        let allocator = PortAllocator::new(39130, 39131);
        let err = allocator.lease(5, "127.0.0.1").unwrap_err();
        assert!(matches!(err, PoolError::PortsExhausted { requested: 5, .. }));
        assert!(allocator.leased().is_empty());
    }

    #[test]
    fn skips_ports_bound_by_someone_else() {
        let squatter = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let taken = squatter.local_addr().unwrap().port();

        let allocator = PortAllocator::new(taken, taken);
        assert!(allocator.lease(1, "127.0.0.1").is_err());
    }
}
