//! `/healthz` and `/metrics` on one listener, independent of sweep state.

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::metrics::SweepMetrics;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Serve until the task is dropped. `/metrics` answers 404 when no metrics
/// are attached.
pub async fn serve_status(listener: TcpListener, metrics: Option<SweepMetrics>) {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "status accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        let metrics = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = answer(socket, metrics.as_ref()).await {
                debug!(%peer, error = %e, "status request failed");
            }
        });
    }
}

async fn answer(mut socket: TcpStream, metrics: Option<&SweepMetrics>) -> std::io::Result<()> {
    let mut buffer = [0u8; 4096];
    let read = socket.read(&mut buffer).await?;
    let request = String::from_utf8_lossy(&buffer[..read]);
    let mut request_line = request.lines().next().unwrap_or("").split_whitespace();
    let method = request_line.next().unwrap_or("");
    let path = request_line.next().unwrap_or("");
    let path = path.split('?').next().unwrap_or(path);

    let (status, content_type, body) = route(method, path, metrics);
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );

    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

fn route(method: &str, path: &str, metrics: Option<&SweepMetrics>) -> (&'static str, &'static str, String) {
    const JSON: &str = "application/json";

    if method != "GET" {
        return ("405 Method Not Allowed", JSON, r#"{"error":"method not allowed"}"#.to_string());
    }
    match (path, metrics) {
        ("/healthz", _) => ("200 OK", JSON, r#"{"ok":true}"#.to_string()),
        ("/metrics", Some(metrics)) => match metrics.render() {
            Ok(text) => ("200 OK", metrics.content_type(), text),
            Err(e) => {
                warn!(error = %e, "metrics encoding failed");
                ("500 Internal Server Error", JSON, r#"{"error":"metrics unavailable"}"#.to_string())
            }
        },
        _ => ("404 Not Found", JSON, r#"{"error":"not found"}"#.to_string()),
    }
}
