//! How inference-server processes are launched and probed.

use lt_types::ParameterPoint;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Launch policy for one server process.
///
/// Topology: every instance of a point is one process on its own port, and
/// `parallel` becomes that process's serving slot count through the
/// `{parallel}` placeholder. Placeholders understood in `args`:
/// `{model}`, `{host}`, `{port}`, `{parallel}`, `{batch}`, `{instance}`,
/// `{instances}`, `{concurrency}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerLaunchConfig {
    /// Server executable (e.g. `llama-server`).
    pub binary: PathBuf,
    /// Argument template.
    pub args: Vec<String>,
    /// Interface the servers bind and the driver connects to.
    pub host: String,
    /// Inclusive port range leased to instances.
    pub port_range: (u16, u16),
    /// Readiness endpoint, polled until it answers 2xx.
    pub readiness_path: String,
    /// Upper bound on waiting for all instances to report ready.
    pub startup_timeout_secs: u64,
    /// Pool start attempts per cell before it is recorded as failed.
    pub startup_attempts: u32,
    /// First readiness back-off delay.
    pub poll_initial_ms: u64,
    /// Back-off ceiling.
    pub poll_max_ms: u64,
    /// Per-probe HTTP timeout.
    pub probe_timeout_ms: u64,
    /// Time allowed for a killed process to be reaped.
    pub shutdown_grace_ms: u64,
    /// When set, each instance's stdout/stderr go to `server-{port}.log` here.
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerLaunchConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("llama-server"),
            args: [
                "-m", "{model}", "--host", "{host}", "--port", "{port}", "--parallel",
                "{parallel}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            host: "127.0.0.1".to_string(),
            port_range: (8080, 8180),
            readiness_path: "/health".to_string(),
            startup_timeout_secs: 120,
            startup_attempts: 1,
            poll_initial_ms: 100,
            poll_max_ms: 2_000,
            probe_timeout_ms: 1_000,
            shutdown_grace_ms: 5_000,
            log_dir: None,
        }
    }
}

impl ServerLaunchConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn poll_initial(&self) -> Duration {
        Duration::from_millis(self.poll_initial_ms.max(1))
    }

    pub fn poll_max(&self) -> Duration {
        Duration::from_millis(self.poll_max_ms.max(self.poll_initial_ms).max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Base URL clients use to reach the instance on `port`.
    pub fn endpoint(&self, port: u16) -> String {
        format!("http://{}:{}", self.host, port)
    }

    /// Expand the argument template for one instance.
    pub fn render_args(
        &self,
        model: &str,
        point: &ParameterPoint,
        instance: usize,
        port: u16,
    ) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{model}", model)
                    .replace("{host}", &self.host)
                    .replace("{port}", &port.to_string())
                    .replace("{parallel}", &point.parallel.to_string())
                    .replace("{batch}", &point.batch.to_string())
                    .replace("{instance}", &instance.to_string())
                    .replace("{instances}", &point.instances.to_string())
                    .replace("{concurrency}", &point.concurrency.to_string())
            })
            .collect()
    }
}
