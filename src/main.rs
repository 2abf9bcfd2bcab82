use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use image_resizer::{
    config::Config,
    imaging::RustTransformer,
    observability::AppObservability,
    orchestrator::Orchestrator,
    storage,
    web::{AppState, WebServer},
};

#[derive(Parser)]
#[command(name = "image-resizer")]
#[command(version)]
#[command(about = "On-demand image resizing with a tiered local/object-store cache")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level (overrides `logging.verbose`)
    #[arg(short = 'v', long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_from_file(&cli.config)?;
    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }

    let default_level = if config.logging.verbose { "debug" } else { "info" };
    let level = cli.log_level.unwrap_or_else(|| default_level.to_string());
    let log_filter = if level == "trace" {
        format!("image_resizer={level},sandboxed_file_store={level},tower_http=trace")
    } else {
        format!("image_resizer={level},sandboxed_file_store={level}")
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Image Resizer v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", cli.config);

    let storage = storage::from_config(&config.storage).await?;
    let observability = AppObservability::new("image-resizer");
    let tracker = TaskTracker::new();

    let orchestrator = Orchestrator::from_config(
        &config,
        storage,
        Arc::new(RustTransformer::new()),
        tracker.clone(),
        observability.clone(),
    )
    .await?;

    let web_server = WebServer::new(&config, AppState::new(&config, orchestrator))?;
    info!(
        "Starting web server on {}:{}",
        web_server.host(),
        web_server.port()
    );

    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
    let server = tokio::spawn(web_server.serve_with_cancellation(ready_tx, None));
    match ready_rx.await {
        Ok(Ok(())) => info!("Web server listening"),
        Ok(Err(e)) => error!("Web server failed to start: {}", e),
        Err(_) => error!("Web server exited before reporting readiness"),
    }
    let served = server.await?;

    // Let in-flight cache population finish before exiting
    tracker.close();
    info!("Waiting for {} cache population task(s)", tracker.len());
    tracker.wait().await;
    observability.shutdown();

    served
}
