//! In-process stand-in for an inference server, for tests.
//!
//! Speaks just enough HTTP/1.1 to answer `GET /health` and `POST` completion
//! requests. Every response closes the connection.

use serde_json::{json, Value};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// How the mock answers completion requests.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    /// Tokens reported per prompt in a request.
    pub tokens_per_completion: u64,
    /// Every n-th completion gets a 500.
    pub fail_every: Option<u64>,
    /// Answer completions with a body that carries no token count.
    pub malformed: bool,
    /// Sleep before answering a completion.
    pub delay: Duration,
}

impl MockBehavior {
    pub fn fixed_tokens(tokens_per_completion: u64) -> Self {
        Self {
            tokens_per_completion,
            fail_every: None,
            malformed: false,
            delay: Duration::ZERO,
        }
    }
}

/// A listening mock server. Stops accepting when dropped.
pub struct MockInferenceServer {
    endpoint: String,
    completions: Arc<AtomicU64>,
    accept: JoinHandle<()>,
}

impl MockInferenceServer {
    pub async fn start(behavior: MockBehavior) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let endpoint = format!("http://{}", listener.local_addr()?);
        let completions = Arc::new(AtomicU64::new(0));

        let behavior = Arc::new(behavior);
        let counter = Arc::clone(&completions);
        let accept = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let behavior = Arc::clone(&behavior);
                let counter = Arc::clone(&counter);
                tokio::spawn(async move {
                    let _ = handle_connection(stream, &behavior, &counter).await;
                });
            }
        });

        Ok(Self {
            endpoint,
            completions,
            accept,
        })
    }

    /// Base URL, e.g. `http://127.0.0.1:40123`.
    pub fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    /// Completion requests received so far.
    pub fn completions(&self) -> u64 {
        self.completions.load(Ordering::SeqCst)
    }
}

impl Drop for MockInferenceServer {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    behavior: &MockBehavior,
    completions: &AtomicU64,
) -> io::Result<()> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let method = request_line.split_whitespace().next().unwrap_or("").to_string();

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;

    let (status, payload) = if method == "POST" {
        let seq = completions.fetch_add(1, Ordering::SeqCst) + 1;
        if !behavior.delay.is_zero() {
            tokio::time::sleep(behavior.delay).await;
        }
        completion_response(behavior, seq, &body)
    } else {
        ("200 OK", json!({"status": "ok"}).to_string())
    };

    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    );
    let mut stream = reader.into_inner();
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn completion_response(behavior: &MockBehavior, seq: u64, body: &[u8]) -> (&'static str, String) {
    if behavior.fail_every.is_some_and(|n| n > 0 && seq % n == 0) {
        return (
            "500 Internal Server Error",
            json!({"error": "injected failure"}).to_string(),
        );
    }
    if behavior.malformed {
        return ("200 OK", json!({"content": "tokens unknown"}).to_string());
    }

    let prompts = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|req| req.get("prompt").and_then(Value::as_array).map(Vec::len))
        .unwrap_or(1) as u64;

    (
        "200 OK",
        json!({
            "content": "ok",
            "tokens_predicted": behavior.tokens_per_completion * prompts,
        })
        .to_string(),
    )
}
