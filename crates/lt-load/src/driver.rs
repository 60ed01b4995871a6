//! Load driver seam and the HTTP implementation.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::counters::{LoadCounters, LoadReport};
use crate::payload::{completion_body, count_tokens};
use crate::plan::{LoadPlan, LoadSettings};

/// Errors that stop a load run from happening at all. Individual request
/// failures are never errors; they only bump the failure counter.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("no endpoints to drive")]
    NoEndpoints,
    #[error("invalid load plan: {message}")]
    InvalidPlan { message: String },
}

/// Result alias for load runs.
pub type LoadResult<T> = Result<T, LoadError>;

/// Issues a cell's requests and measures the outcome.
#[async_trait]
pub trait LoadDriver: Send + Sync {
    /// Run `plan` against `endpoints`, updating `counters` as requests
    /// complete. Cancellation (dropping the future) must leave `counters`
    /// holding whatever was measured so far.
    async fn drive(
        &self,
        endpoints: Vec<String>,
        plan: LoadPlan,
        counters: Arc<LoadCounters>,
    ) -> LoadResult<LoadReport>;

    /// Human-readable driver name.
    fn name(&self) -> &str;
}

/// Sends completion requests over HTTP, one tokio task per stream.
#[derive(Debug, Clone)]
pub struct HttpLoadDriver {
    client: reqwest::Client,
    settings: LoadSettings,
}

impl HttpLoadDriver {
    pub fn new(settings: LoadSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &LoadSettings {
        &self.settings
    }
}

#[async_trait]
impl LoadDriver for HttpLoadDriver {
    async fn drive(
        &self,
        endpoints: Vec<String>,
        plan: LoadPlan,
        counters: Arc<LoadCounters>,
    ) -> LoadResult<LoadReport> {
        if endpoints.is_empty() {
            return Err(LoadError::NoEndpoints);
        }
        if plan.concurrency == 0 || plan.batch == 0 {
            return Err(LoadError::InvalidPlan {
                message: format!(
                    "batch {} and concurrency {} must be positive",
                    plan.batch, plan.concurrency
                ),
            });
        }

        let body = Arc::new(completion_body(&self.settings, &plan));
        let timeout = self.settings.request_timeout();
        let mut streams = JoinSet::new();

        let started = Instant::now();
        for (stream, quota) in plan.stream_quotas().into_iter().enumerate() {
            if quota == 0 {
                continue;
            }
            let url = format!(
                "{}{}",
                endpoints[stream % endpoints.len()],
                self.settings.completion_path
            );
            let client = self.client.clone();
            let body = Arc::clone(&body);
            let counters = Arc::clone(&counters);

            streams.spawn(async move {
                for _ in 0..quota {
                    send_one(&client, &url, &body, timeout, &counters).await;
                }
            });
        }

        while let Some(joined) = streams.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "request stream aborted");
            }
        }
        let wall_time = started.elapsed();
        let totals = counters.snapshot();

        info!(
            streams = plan.concurrency,
            batch = plan.batch,
            sent = totals.requests_sent,
            failed = totals.requests_failed,
            tokens = totals.tokens_generated,
            wall_ms = wall_time.as_millis() as u64,
            "load run finished"
        );

        Ok(LoadReport { wall_time, totals })
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// One request: a transport error, non-2xx status, undecodable body or a
/// body without a token count all count as a failure.
async fn send_one(
    client: &reqwest::Client,
    url: &str,
    body: &Value,
    timeout: Duration,
    counters: &LoadCounters,
) {
    counters.record_sent();

    let response = match client.post(url).timeout(timeout).json(body).send().await {
        Ok(resp) => resp,
        Err(e) => {
            debug!(url, error = %e, "request failed");
            counters.record_failed();
            return;
        }
    };

    if !response.status().is_success() {
        debug!(url, status = %response.status(), "request rejected");
        counters.record_failed();
        return;
    }

    match response.json::<Value>().await.ok().as_ref().and_then(count_tokens) {
        Some(tokens) => counters.record_succeeded(tokens),
        None => {
            debug!(url, "malformed completion payload");
            counters.record_failed();
        }
    }
}
