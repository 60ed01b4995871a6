//! Run configuration: one JSON file plus a few environment overrides.

use chrono::{DateTime, Utc};
use lt_load::LoadSettings;
use lt_server::ServerLaunchConfig;
use lt_sinks::record_file_name;
use lt_types::{config_error, LtResult, SweepConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the local record goes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub results_dir: PathBuf,
    /// Address serving `/healthz` and `/metrics`, e.g. `0.0.0.0:8201`.
    pub health_addr: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            health_addr: None,
        }
    }
}

/// Optional external sinks. Absent endpoints select no-op sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub events_url: Option<String>,
    pub event_queue_capacity: usize,
    pub presign_url: Option<String>,
    pub presign_secret: Option<String>,
    pub bucket: String,
    pub key_prefix: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            events_url: None,
            event_queue_capacity: 64,
            presign_url: None,
            presign_secret: None,
            bucket: "outputs".to_string(),
            key_prefix: "llama-throughput-lab/".to_string(),
        }
    }
}

impl SinkConfig {
    /// Presign endpoint and secret, only when both are set.
    pub fn presign(&self) -> Option<(&str, &str)> {
        match (self.presign_url.as_deref(), self.presign_secret.as_deref()) {
            (Some(url), Some(secret)) if !url.is_empty() && !secret.is_empty() => Some((url, secret)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub sweep: SweepConfig,
    #[serde(default)]
    pub server: ServerLaunchConfig,
    #[serde(default)]
    pub load: LoadSettings,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub sinks: SinkConfig,
    /// Accelerator the sweep is pinned to, exported as `CUDA_VISIBLE_DEVICES`.
    #[serde(default)]
    pub device: Option<String>,
}

impl RunConfig {
    pub const ENV_MODEL: &'static str = "LT_MODEL";
    pub const ENV_RESULTS_DIR: &'static str = "LT_RESULTS_DIR";
    pub const ENV_EVENTS_URL: &'static str = "LT_EVENTS_URL";
    pub const ENV_PRESIGN_URL: &'static str = "LT_PRESIGN_URL";
    pub const ENV_PRESIGN_SECRET: &'static str = "LT_PRESIGN_SECRET";
    pub const ENV_HEALTH_ADDR: &'static str = "LT_HEALTH_ADDR";
    pub const ENV_DEVICE: &'static str = "LT_DEVICE";

    pub fn from_json(json: &str) -> LtResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> LtResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| config_error!("cannot read {}: {}", path.display(), e))?;
        Self::from_json(&json)
    }

    /// Apply `LT_*` overrides from `lookup` (normally `std::env::var`).
    /// Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = get(Self::ENV_MODEL) {
            self.sweep.model_id = model;
        }
        if let Some(dir) = get(Self::ENV_RESULTS_DIR) {
            self.output.results_dir = PathBuf::from(dir);
        }
        if let Some(url) = get(Self::ENV_EVENTS_URL) {
            self.sinks.events_url = Some(url);
        }
        if let Some(url) = get(Self::ENV_PRESIGN_URL) {
            self.sinks.presign_url = Some(url);
        }
        if let Some(secret) = get(Self::ENV_PRESIGN_SECRET) {
            self.sinks.presign_secret = Some(secret);
        }
        if let Some(addr) = get(Self::ENV_HEALTH_ADDR) {
            self.output.health_addr = Some(addr);
        }
        if let Some(device) = get(Self::ENV_DEVICE) {
            self.device = Some(device);
        }
    }

    pub fn validate(&self) -> LtResult<()> {
        self.sweep.validate()?;

        let (first, last) = self.server.port_range;
        if first == 0 || first > last {
            return Err(config_error!("port_range must be a non-empty range of non-zero ports"));
        }
        let ports = usize::from(last - first) + 1;
        if let Some(max) = self.sweep.axis_values.instances.iter().max() {
            if *max > ports as i64 {
                return Err(config_error!(
                    "port_range holds {} ports but up to {} instances are requested",
                    ports,
                    max
                ));
            }
        }
        if self.server.binary.as_os_str().is_empty() {
            return Err(config_error!("server binary must be set"));
        }
        if self.sinks.event_queue_capacity == 0 {
            return Err(config_error!("event_queue_capacity must be positive"));
        }
        Ok(())
    }

    /// Local record path for a sweep starting at `at`.
    pub fn record_path(&self, at: DateTime<Utc>) -> PathBuf {
        self.output
            .results_dir
            .join(record_file_name(&self.sweep.model_id, at))
    }
}
