use anyhow::Result;
use clap::Parser;
use restic_exporter::{
    client::ResticClient,
    collector::Collector,
    config::{LogFormat, Settings},
    scheduler::{PublishedMetrics, Scheduler},
    server::start_server,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// restic Exporter - Prometheus metrics exporter for restic backup repositories
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", env = "RESTIC_EXPORTER_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration
    let settings = Settings::load(args.config.as_deref())?;

    // Initialize logging
    init_logging(&settings.exporter.log_level, settings.exporter.log_format)?;

    info!("Starting restic Exporter");
    info!("Repository: {}", settings.restic.repository);
    info!("Listen address: {}", settings.exporter.listen_address);
    info!(
        "Refresh interval: {}s",
        settings.collector.refresh_interval_seconds
    );

    // Create restic client
    let client = ResticClient::from_config(&settings.restic)?;
    info!("restic client initialized");

    // Create collector and scheduler
    let collector = Collector::from_config(client, &settings.collector);
    let published = Arc::new(PublishedMetrics::new());
    let scheduler = Scheduler::new(
        collector,
        Arc::clone(&published),
        settings.collector.refresh_interval(),
        settings.collector.exit_on_error,
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    };

    tokio::select! {
        result = start_server(&settings.exporter.listen_address, published) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e.into());
            }
        }
        result = scheduler.run(shutdown) => {
            if let Err(e) = result {
                info!("Exit on error is set, stopping");
                return Err(e.into());
            }
            info!("Shutdown complete");
        }
    }

    Ok(())
}

/// Initialize structured logging with tracing.
fn init_logging(log_level: &str, format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
    }

    Ok(())
}
