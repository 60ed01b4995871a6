//! Process-backed server pool.

use async_trait::async_trait;
use lt_types::ParameterPoint;
use rand::Rng;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::accelerator::AcceleratorToken;
use crate::launch::ServerLaunchConfig;
use crate::pool::{PoolError, PoolHandle, PoolResult, ServerInstance, ServerPool};
use crate::ports::{PortAllocator, PortLease};

/// Spawns one inference-server process per instance and waits for each to
/// answer its readiness probe.
#[derive(Debug)]
pub struct ProcessPool {
    config: ServerLaunchConfig,
    ports: PortAllocator,
    client: reqwest::Client,
}

impl ProcessPool {
    pub fn new(config: ServerLaunchConfig) -> Self {
        let ports = PortAllocator::new(config.port_range.0, config.port_range.1);
        Self {
            config,
            ports,
            client: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &ServerLaunchConfig {
        &self.config
    }

    pub fn ports(&self) -> &PortAllocator {
        &self.ports
    }

    fn spawn_instance(
        &self,
        device: Option<&str>,
        model: &str,
        point: &ParameterPoint,
        index: usize,
        lease: PortLease,
    ) -> PoolResult<ServerInstance> {
        let port = lease.port();
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(self.config.render_args(model, point, index, port))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(device) = device {
            cmd.env("CUDA_VISIBLE_DEVICES", device);
        }

        match &self.config.log_dir {
            Some(dir) => {
                let log_err = |e: std::io::Error| PoolError::Spawn {
                    instance: index,
                    message: format!("log file in {}: {e}", dir.display()),
                };
                let stdout = std::fs::File::create(dir.join(format!("server-{port}.log")))
                    .map_err(log_err)?;
                let stderr = stdout.try_clone().map_err(log_err)?;
                cmd.stdout(Stdio::from(stdout)).stderr(Stdio::from(stderr));
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        let child = cmd.spawn().map_err(|e| PoolError::Spawn {
            instance: index,
            message: format!("{}: {e}", self.config.binary.display()),
        })?;

        debug!(instance = index, port, pid = ?child.id(), "server instance spawned");
        Ok(ServerInstance::spawned(
            index,
            self.config.endpoint(port),
            lease,
            child,
        ))
    }

    /// Poll the readiness endpoint with capped exponential back-off until it
    /// answers 2xx, the process exits, or `deadline` passes.
    async fn wait_until_ready(
        &self,
        instance: &mut ServerInstance,
        started: Instant,
        deadline: Instant,
    ) -> PoolResult<()> {
        let url = format!("{}{}", instance.endpoint(), self.config.readiness_path);
        let port = instance.port().unwrap_or_default();
        let mut delay = self.config.poll_initial();

        loop {
            if let Some(child) = instance.process_mut() {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        return Err(PoolError::Exited {
                            instance: instance.index(),
                            port,
                            status: status.to_string(),
                        })
                    }
                    Ok(None) => {}
                    Err(e) => {
                        return Err(PoolError::Internal {
                            message: format!("wait on instance {}: {e}", instance.index()),
                        })
                    }
                }
            }

            match self
                .client
                .get(&url)
                .timeout(self.config.probe_timeout())
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                // llama.cpp answers 503 while the model is still loading
                Ok(resp) => debug!(port, status = %resp.status(), "server not ready yet"),
                Err(e) => debug!(port, error = %e, "readiness probe failed"),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(PoolError::NotReady {
                    instance: instance.index(),
                    port,
                    waited_ms: now.duration_since(started).as_millis(),
                });
            }

            let spread = delay.as_millis() as u64 / 4;
            let jitter = Duration::from_millis(rand::rng().random_range(0..=spread));
            tokio::time::sleep((delay + jitter).min(deadline - now)).await;
            delay = (delay * 2).min(self.config.poll_max());
        }
    }

    async fn teardown(&self, instances: Vec<ServerInstance>) {
        for instance in instances {
            instance.terminate(self.config.shutdown_grace()).await;
        }
    }
}

#[async_trait]
impl ServerPool for ProcessPool {
    async fn acquire<'a>(
        &self,
        token: &'a mut AcceleratorToken,
        point: &ParameterPoint,
        model: &str,
    ) -> PoolResult<PoolHandle<'a>> {
        let count = point.instances as usize;
        let leases = self.ports.lease(count, &self.config.host)?;
        let device = token.device().map(str::to_string);

        let mut instances = Vec::with_capacity(count);
        for (index, lease) in leases.into_iter().enumerate() {
            match self.spawn_instance(device.as_deref(), model, point, index, lease) {
                Ok(instance) => instances.push(instance),
                Err(e) => {
                    self.teardown(instances).await;
                    return Err(e);
                }
            }
        }

        let started = Instant::now();
        let deadline = started + self.config.startup_timeout();
        let mut failure = None;
        for instance in instances.iter_mut() {
            if let Err(e) = self.wait_until_ready(instance, started, deadline).await {
                failure = Some(e);
                break;
            }
        }
        if let Some(e) = failure {
            warn!(%point, error = %e, "server pool failed to become ready");
            self.teardown(instances).await;
            return Err(e);
        }

        info!(
            %point,
            instances = count,
            ready_ms = started.elapsed().as_millis() as u64,
            "server pool ready"
        );
        Ok(PoolHandle::new(token, *point, instances))
    }

    async fn release(&self, handle: &mut PoolHandle<'_>) {
        if handle.is_released() {
            return;
        }
        let point = *handle.point();
        handle.shutdown(self.config.shutdown_grace()).await;
        info!(%point, "server pool released");
    }

    fn name(&self) -> &str {
        "process"
    }
}
