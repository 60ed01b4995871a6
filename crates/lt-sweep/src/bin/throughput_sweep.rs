use anyhow::Context;
use chrono::Utc;
use lt_load::HttpLoadDriver;
use lt_server::{AcceleratorToken, ProcessPool};
use lt_sinks::{
    EventSink, HttpEventSink, NoopEventSink, NoopStorageSink, PresignStorageSink, StorageSink,
};
use lt_sweep::{
    serve_status, CancelFlag, CellExecutor, ExecutorSettings, RunConfig, SweepMetrics, SweepRunner,
};
use lt_types::SweepSummary;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("LT_CONFIG").ok())
        .unwrap_or_else(|| "throughput-sweep.json".to_string());

    let mut config = RunConfig::load(&config_path)
        .with_context(|| format!("loading run config from {config_path}"))?;
    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate().context("validating run config")?;

    let metrics = SweepMetrics::new().context("registering sweep metrics")?;
    if let Some(addr) = config.output.health_addr.clone() {
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding status responder on {addr}"))?;
        info!(%addr, "serving /healthz and /metrics");
        tokio::spawn(serve_status(listener, Some(metrics.clone())));
    }

    let events: Arc<dyn EventSink> = match &config.sinks.events_url {
        Some(url) => Arc::new(HttpEventSink::new(url.clone(), config.sinks.event_queue_capacity)),
        None => Arc::new(NoopEventSink),
    };
    let storage: Arc<dyn StorageSink> = match config.sinks.presign() {
        Some((url, secret)) => Arc::new(PresignStorageSink::new(
            url,
            secret,
            config.sinks.bucket.clone(),
            config.sinks.key_prefix.clone(),
        )),
        None => Arc::new(NoopStorageSink),
    };
    info!(events = events.name(), storage = storage.name(), "sinks selected");

    let executor = CellExecutor::new(
        ProcessPool::new(config.server.clone()),
        Arc::new(HttpLoadDriver::new(config.load.clone())),
        ExecutorSettings::from_config(&config.sweep).with_launch(&config.server),
    );

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current cell");
            on_interrupt.cancel();
        }
    });

    let runner = SweepRunner::new(config.sweep.clone(), executor, config.record_path(Utc::now()))
        .with_event_sink(events)
        .with_storage_sink(storage)
        .with_cancel_flag(cancel)
        .with_metrics(metrics);

    let mut token = AcceleratorToken::new(config.device.clone());
    let summary = runner.run(&mut token).await?;

    print_report(&summary);
    Ok(())
}

fn print_report(summary: &SweepSummary) {
    let best = summary.best().map(|c| c.params);

    println!(
        "\n  {:>9} {:>8} {:>5} {:>11} {:>12} {:>8} {:>8} {:>7} {:>8}  status",
        "instances", "parallel", "batch", "concurrency", "tokens/s", "tokens", "requests", "failed", "wall s"
    );
    for cell in summary.ranked() {
        let marker = if Some(cell.params) == best { '*' } else { ' ' };
        println!(
            "{} {:>9} {:>8} {:>5} {:>11} {:>12.1} {:>8} {:>8} {:>7} {:>8.2}  {}",
            marker,
            cell.params.instances,
            cell.params.parallel,
            cell.params.batch,
            cell.params.concurrency,
            cell.throughput_tps,
            cell.tokens_generated,
            cell.requests_sent,
            cell.requests_failed,
            cell.wall_time_secs,
            cell.status,
        );
    }

    println!();
    match summary.best() {
        Some(cell) => println!(
            "Best: instances={} parallel={} batch={} concurrency={} at {:.1} tokens/s",
            cell.params.instances,
            cell.params.parallel,
            cell.params.batch,
            cell.params.concurrency,
            cell.throughput_tps
        ),
        None => println!(
            "No configuration completed within the {:.0}% error budget",
            summary.config.error_rate_threshold * 100.0
        ),
    }
    if summary.cancelled {
        println!("Sweep was cancelled after {} cells", summary.cells().len());
    }
    if let Some(location) = &summary.result_location {
        println!("Results: {location}");
    }
}
