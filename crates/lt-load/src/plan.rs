//! What a load run looks like: request shape and how work is split across
//! streams.

use lt_types::ParameterPoint;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request dialect spoken by the server under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionApi {
    /// llama.cpp native `/completion` (`n_predict`, `tokens_predicted`).
    LlamaCpp,
    /// OpenAI-compatible `/v1/completions` (`max_tokens`, `usage`).
    OpenAi,
}

/// Request shape shared by every cell of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadSettings {
    pub api: CompletionApi,
    pub completion_path: String,
    pub prompt: String,
    /// Tokens requested per completion.
    pub n_predict: u32,
    /// Per-request timeout; an expired request counts as failed.
    pub request_timeout_ms: u64,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            api: CompletionApi::LlamaCpp,
            completion_path: "/completion".to_string(),
            prompt: "Write a short essay about the history of computing.".to_string(),
            n_predict: 128,
            request_timeout_ms: 60_000,
        }
    }
}

impl LoadSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }
}

/// Work for one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadPlan {
    pub model: String,
    /// Prompts per HTTP request.
    pub batch: u32,
    /// Simultaneous request streams.
    pub concurrency: u32,
    /// Total HTTP requests across all streams.
    pub request_count: u64,
}

impl LoadPlan {
    pub fn for_point(model: impl Into<String>, point: &ParameterPoint, request_count: u64) -> Self {
        Self {
            model: model.into(),
            batch: point.batch,
            concurrency: point.concurrency,
            request_count,
        }
    }

    /// Requests per stream: the remainder goes to the lowest-numbered
    /// streams, so quotas differ by at most one.
    pub fn stream_quotas(&self) -> Vec<u64> {
        let streams = self.concurrency.max(1) as u64;
        let base = self.request_count / streams;
        let extra = self.request_count % streams;
        (0..streams).map(|i| base + u64::from(i < extra)).collect()
    }
}
