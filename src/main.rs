//! treegate -- namespace metadata gateway.
//!
//! SIGTERM/SIGINT handlers only stop accepting connections and wait for
//! in-flight requests, bounded by `server.shutdown_timeout`.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use treegate::config::{Config, LoggingConfig};
use treegate::identity::memory::MemoryIdentityService;
use treegate::metadata::memory::MemoryMetadataStore;
use treegate::placement::StaticPlacement;

/// Command-line arguments for the treegate server.
#[derive(Parser, Debug)]
#[command(
    name = "treegate",
    version,
    about = "Metadata gateway for a hierarchical object namespace"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "treegate.example.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

/// Initialize tracing from `RUST_LOG`, falling back to the configured level.
fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config: Config = treegate::config::load_config(&cli.config)?;
    init_logging(&config.logging);
    info!("Loaded configuration from {}", cli.config);

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        treegate::metrics::init_metrics();
        treegate::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let metadata = Arc::new(MemoryMetadataStore::new(&config.metadata.shard));
    info!(shard = %config.metadata.shard, "In-memory metadata store initialized");

    let identity = Arc::new(MemoryIdentityService::from_config(&config.identity));
    info!(
        accounts = config.identity.accounts.len(),
        "In-memory identity service initialized"
    );

    if config.placement.nodes.is_empty() {
        warn!("No storage nodes configured; only empty objects can be written");
    }
    let placement = Arc::new(StaticPlacement::from_config(&config.placement));

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let state = Arc::new(treegate::AppState {
        config,
        metadata,
        identity,
        placement,
    });

    let app = treegate::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("treegate listening on {}", bind_addr);

    // Graceful shutdown: on SIGTERM/SIGINT, stop accepting new connections
    // and wait for in-flight requests, at most `shutdown_timeout`.
    let (signalled_tx, mut signalled_rx) = tokio::sync::watch::channel(false);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signalled_tx.send(true);
        })
        .into_future();
    tokio::select! {
        result = server => result?,
        _ = async {
            let _ = signalled_rx.changed().await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            warn!("Shutdown timeout elapsed with requests still in flight");
        }
    }

    info!("treegate shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
