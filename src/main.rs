use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use floodgate::config::FloodgateConfig;
use floodgate::ratelimit::SlidingWindowLimiter;
use floodgate::server::HttpServer;

/// Sliding-window request admission in front of an HTTP service.
#[derive(Parser, Debug)]
#[command(name = "floodgate", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting Floodgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = FloodgateConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.server.http_addr = addr;
    }
    let limits = config.rate_limiting.limit_config()?;
    info!(
        http_addr = %config.server.http_addr,
        limit = limits.requests_per_window(),
        window = ?limits.window_size(),
        "Configuration loaded"
    );

    // Initialize the rate limiter and its eviction sweep
    let (rate_limiter, eviction) = SlidingWindowLimiter::start(limits);
    info!("Rate limiter initialized");

    let server = HttpServer::new(config.server.http_addr, rate_limiter)
        .with_low_water_mark(config.rate_limiting.low_water_mark);

    // Run the server with graceful shutdown on Ctrl+C
    let served = server.serve_with_shutdown(shutdown_signal()).await;

    eviction.stop().await;
    served?;

    info!("Floodgate stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
