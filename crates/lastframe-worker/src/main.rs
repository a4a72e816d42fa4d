//! Last-frame monitor binary.
//!
//! Attaches to an existing WebDriver session, watches the configured
//! container and stores the final frame of every new video.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lastframe_browser::{WebDriverBridge, WebDriverConfig};
use lastframe_worker::backends::{open_ledger, open_sink};
use lastframe_worker::metrics::init_metrics;
use lastframe_worker::{MonitorConfig, MonitorSession, WorkerResult};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting lastframe");

    if let Err(e) = run().await {
        error!("Monitor failed: {}", e);
        std::process::exit(if e.is_fatal() { 2 } else { 1 });
    }

    info!("Monitor shutdown complete");
}

fn init_tracing() {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lastframe=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run() -> WorkerResult<()> {
    let config = MonitorConfig::from_env()?;
    info!("Monitor config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        init_metrics(addr)?;
        info!("Metrics listening on {}", addr);
    }

    let ledger = open_ledger(&config.ledger, &config.scope).await?;
    let sink = open_sink(&config.output).await?;

    let mut driver = WebDriverConfig::from_env()?;
    let extractor = &config.pipeline.extractor;
    driver.cover_waits(extractor.ready_timeout.max(extractor.seek_timeout));
    let bridge = Arc::new(WebDriverBridge::attach(&driver).await?);

    let mut session = MonitorSession::new(
        config.pipeline.clone(),
        bridge.clone(),
        bridge,
        ledger,
        sink,
    );
    let summary = session.activate(&config.container).await?;
    info!(
        session_id = %session.id(),
        enqueued = summary.enqueued,
        already_processed = summary.already_processed,
        "Monitoring"
    );

    let cancel = session.cancel_token();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        cancel.cancel();
    });

    session.wait().await?;
    session.shutdown().await
}
