//! Server pool abstraction and the handle it returns.

use async_trait::async_trait;
use lt_types::ParameterPoint;
use std::time::Duration;
use tokio::process::Child;
use tracing::{debug, warn};

use crate::accelerator::AcceleratorToken;
use crate::ports::PortLease;

/// Errors surfaced while bringing a pool up. All of them mean the cell is
/// recorded as `StartupFailed`.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("port range exhausted: requested {requested}, available {available}")]
    PortsExhausted { requested: usize, available: usize },
    #[error("failed to spawn instance {instance}: {message}")]
    Spawn { instance: usize, message: String },
    #[error("instance {instance} on port {port} exited before ready: {status}")]
    Exited {
        instance: usize,
        port: u16,
        status: String,
    },
    #[error("instance {instance} on port {port} not ready after {waited_ms} ms")]
    NotReady {
        instance: usize,
        port: u16,
        waited_ms: u128,
    },
    #[error("pool startup failed: {message}")]
    Internal { message: String },
}

/// Result alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// One running (or externally provided) server instance.
#[derive(Debug)]
pub struct ServerInstance {
    index: usize,
    endpoint: String,
    port: Option<PortLease>,
    process: Option<Child>,
}

impl ServerInstance {
    /// An instance this crate did not spawn, e.g. a test double.
    pub fn external(index: usize, endpoint: impl Into<String>) -> Self {
        Self {
            index,
            endpoint: endpoint.into(),
            port: None,
            process: None,
        }
    }

    pub(crate) fn spawned(index: usize, endpoint: String, port: PortLease, child: Child) -> Self {
        Self {
            index,
            endpoint,
            port: Some(port),
            process: Some(child),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn port(&self) -> Option<u16> {
        self.port.as_ref().map(PortLease::port)
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(Child::id)
    }

    pub(crate) fn process_mut(&mut self) -> Option<&mut Child> {
        self.process.as_mut()
    }

    /// Kill the process (if any), reap it within `grace`, then give the port
    /// back.
    pub(crate) async fn terminate(mut self, grace: Duration) {
        if let Some(mut child) = self.process.take() {
            if let Err(e) = child.start_kill() {
                debug!(instance = self.index, error = %e, "kill skipped, process already gone");
            }
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(instance = self.index, %status, "server instance stopped")
                }
                Ok(Err(e)) => warn!(instance = self.index, error = %e, "failed to reap server"),
                Err(_) => warn!(
                    instance = self.index,
                    grace_ms = grace.as_millis() as u64,
                    "server not reaped within grace period"
                ),
            }
        }
        drop(self.port.take());
    }
}

/// A set of ready instances serving one parameter point.
///
/// Holds the accelerator for as long as it lives. Dropping a handle without
/// releasing it still kills spawned processes (`kill_on_drop`) and frees
/// ports, but callers are expected to go through [`ServerPool::release`].
#[derive(Debug)]
pub struct PoolHandle<'a> {
    token: &'a mut AcceleratorToken,
    point: ParameterPoint,
    instances: Vec<ServerInstance>,
    released: bool,
}

impl<'a> PoolHandle<'a> {
    pub fn new(
        token: &'a mut AcceleratorToken,
        point: ParameterPoint,
        instances: Vec<ServerInstance>,
    ) -> Self {
        token.record_lease();
        Self {
            token,
            point,
            instances,
            released: false,
        }
    }

    pub fn point(&self) -> &ParameterPoint {
        &self.point
    }

    pub fn device(&self) -> Option<&str> {
        self.token.device()
    }

    pub fn instances(&self) -> &[ServerInstance] {
        &self.instances
    }

    /// Base URLs of all instances, in instance order.
    pub fn endpoints(&self) -> Vec<String> {
        self.instances
            .iter()
            .map(|i| i.endpoint().to_string())
            .collect()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Terminate every owned process and free its port. Idempotent.
    pub async fn shutdown(&mut self, grace: Duration) {
        if self.released {
            return;
        }
        for instance in self.instances.drain(..) {
            instance.terminate(grace).await;
        }
        self.released = true;
    }
}

/// Lifecycle seam for the servers backing one cell.
#[async_trait]
pub trait ServerPool: Send + Sync {
    /// Bring up `point.instances` servers and return once all are ready.
    ///
    /// On error nothing started by this call may be left running.
    async fn acquire<'a>(
        &self,
        token: &'a mut AcceleratorToken,
        point: &ParameterPoint,
        model: &str,
    ) -> PoolResult<PoolHandle<'a>>;

    /// Tear down everything the handle owns. Safe to call more than once.
    async fn release(&self, handle: &mut PoolHandle<'_>);

    /// Human-readable pool name.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handle_records_lease_and_shutdown_is_idempotent() {
        let mut token = AcceleratorToken::new(Some("0".into()));
        {
            let mut handle = PoolHandle::new(
                &mut token,
                ParameterPoint::new(2, 1, 8, 1),
                vec![
                    ServerInstance::external(0, "http://127.0.0.1:1"),
                    ServerInstance::external(1, "http://127.0.0.1:2"),
                ],
            );
            assert_eq!(handle.device(), Some("0"));
            assert_eq!(
                handle.endpoints(),
                vec!["http://127.0.0.1:1", "http://127.0.0.1:2"]
            );

            handle.shutdown(Duration::from_millis(10)).await;
            assert!(handle.is_released());
            assert!(handle.instances().is_empty());

            handle.shutdown(Duration::from_millis(10)).await;
            assert!(handle.is_released());
        }
        assert_eq!(token.leases(), 1);
    }

    #[test]
    fn pool_error_messages_name_the_instance() {
        let err = PoolError::NotReady {
            instance: 1,
            port: 8081,
            waited_ms: 1500,
        };
        assert!(err.to_string().contains("8081"));
        assert!(err.to_string().contains("1500"));
    }
}
