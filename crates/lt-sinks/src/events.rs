//! Lifecycle event publication.

use async_trait::async_trait;
use lt_types::{EventEnvelope, LifecycleEvent};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::SinkDispatchError;

/// Best-effort publisher. `publish` never blocks on the network and never
/// reports failure to the caller.
#[async_trait]
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &LifecycleEvent);

    /// Deliver whatever is still queued, within a bounded wait.
    async fn flush(&self);

    fn name(&self) -> &str;
}

/// Selected when no event endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    fn publish(&self, event: &LifecycleEvent) {
        debug!(topic = event.topic(), "event dropped (no sink configured)");
    }

    async fn flush(&self) {}

    fn name(&self) -> &str {
        "noop"
    }
}

/// POSTs event envelopes as JSON from a background task.
pub struct HttpEventSink {
    url: String,
    sender: Mutex<Option<mpsc::Sender<EventEnvelope>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    flush_timeout: Duration,
}

impl HttpEventSink {
    pub const DEFAULT_CAPACITY: usize = 64;
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Must be called inside a tokio runtime; spawns the delivery task.
    pub fn new(url: impl Into<String>, capacity: usize) -> Self {
        let url = url.into();
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(deliver(reqwest::Client::new(), url.clone(), receiver));

        Self {
            url,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            flush_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_flush_timeout(mut self, flush_timeout: Duration) -> Self {
        self.flush_timeout = flush_timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn enqueue(&self, envelope: EventEnvelope) -> Result<(), SinkDispatchError> {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(SinkDispatchError::Closed)?;
        sender.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkDispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SinkDispatchError::Closed,
        })
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    fn publish(&self, event: &LifecycleEvent) {
        let envelope = EventEnvelope::wrap(event.clone());
        let topic = envelope.topic.clone();
        if let Err(e) = self.enqueue(envelope) {
            warn!(%topic, error = %e, "event not published");
        }
    }

    async fn flush(&self) {
        // Dropping the sender lets the worker drain and exit.
        drop(self.sender.lock().take());
        let worker = self.worker.lock().take();

        if let Some(mut worker) = worker {
            if tokio::time::timeout(self.flush_timeout, &mut worker).await.is_err() {
                warn!(url = %self.url, "event delivery did not drain in time");
                worker.abort();
            }
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

async fn deliver(
    client: reqwest::Client,
    url: String,
    mut receiver: mpsc::Receiver<EventEnvelope>,
) {
    while let Some(envelope) = receiver.recv().await {
        match post(&client, &url, &envelope).await {
            Ok(()) => debug!(topic = %envelope.topic, "event delivered"),
            Err(e) => warn!(topic = %envelope.topic, error = %e, "event delivery failed"),
        }
    }
}

async fn post(
    client: &reqwest::Client,
    url: &str,
    envelope: &EventEnvelope,
) -> Result<(), SinkDispatchError> {
    client
        .post(url)
        .timeout(HttpEventSink::REQUEST_TIMEOUT)
        .json(envelope)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lt_types::{AxisValues, CellResult, ParameterPoint, SweepConfig, SweepSummary};
    use serde_json::Value;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accepts POSTs and keeps their bodies.
    async fn collector() -> (String, Arc<Mutex<Vec<Value>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/events", listener.local_addr().unwrap());
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&bodies);

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut raw = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    raw.extend_from_slice(&buf[..n]);
                    if let Some(body) = complete_body(&raw) {
                        if let Ok(value) = serde_json::from_slice(body) {
                            sink.lock().push(value);
                        }
                        break;
                    }
                }
                let _ = stream
                    .write_all(b"HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n")
                    .await;
            }
        });

        (url, bodies)
    }

    fn complete_body(raw: &[u8]) -> Option<&[u8]> {
        let split = raw.windows(4).position(|w| w == b"\r\n\r\n")? + 4;
        let head = String::from_utf8_lossy(&raw[..split]).to_ascii_lowercase();
        let len = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())?;
        (raw.len() >= split + len).then(|| &raw[split..split + len])
    }

    fn summary() -> SweepSummary {
        SweepSummary::new(SweepConfig::new(
            "model.gguf",
            AxisValues::new(vec![1], vec![1], vec![1], vec![1]),
        ))
    }

    #[tokio::test]
    async fn delivers_envelopes_in_order() {
        let (url, bodies) = collector().await;
        let sink = HttpEventSink::new(url, 8);
        let summary = summary();

        sink.publish(&LifecycleEvent::started(&summary));
        sink.publish(&LifecycleEvent::cell(
            summary.sweep_id,
            &CellResult::startup_failed(ParameterPoint::new(1, 1, 1, 1)),
        ));
        sink.flush().await;

        let bodies = bodies.lock();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0]["topic"], "llama.benchmark.started.v1");
        assert_eq!(bodies[0]["source"], "llama-throughput-lab");
        assert_eq!(bodies[1]["topic"], "llama.benchmark.cell.v1");
        assert_eq!(bodies[1]["payload"]["status"], "startup_failed");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_swallowed() {
        let sink = HttpEventSink::new("http://127.0.0.1:1/events", 4);
        sink.publish(&LifecycleEvent::started(&summary()));
        sink.flush().await;

        // Publishing after flush is dropped quietly.
        sink.publish(&LifecycleEvent::started(&summary()));
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        // Single-threaded runtime: the worker cannot drain until we yield.
        let sink = HttpEventSink::new("http://127.0.0.1:1/events", 1);
        let event = LifecycleEvent::started(&summary());

        let dropped = (0..8)
            .filter(|_| {
                matches!(
                    sink.enqueue(EventEnvelope::wrap(event.clone())),
                    Err(SinkDispatchError::QueueFull)
                )
            })
            .count();
        assert_eq!(dropped, 7);

        sink.publish(&event);
        sink.flush().await;
    }

    #[tokio::test]
    async fn noop_sink_accepts_everything() {
        let sink = NoopEventSink;
        sink.publish(&LifecycleEvent::started(&summary()));
        sink.flush().await;
        assert_eq!(sink.name(), "noop");
    }
}
