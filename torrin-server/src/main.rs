use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use torrin_engine::{SweeperConfig, UploadServiceBuilder};
use torrin_server::api::{self, AppState};
use torrin_server::{factory, ServerError, TorrinConfig};

/// Torrin upload HTTP server.
#[derive(Parser, Debug)]
#[command(name = "torrin-server", about = "Resumable chunked-upload server")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "torrin.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber from RUST_LOG or default to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration from the TOML file, or use defaults when absent.
    let config: TorrinConfig = if Path::new(&cli.config).exists() {
        let contents = std::fs::read_to_string(&cli.config)?;
        toml::from_str(&contents)?
    } else {
        info!(path = %cli.config, "config file not found, using defaults");
        toml::from_str("")?
    };

    let store = factory::create_store(&config.store)?;
    let driver = factory::create_driver(&config.storage).await?;

    let mut builder = UploadServiceBuilder::new().store(store).driver(driver);
    if let Some(chunk_size) = config.upload.default_chunk_size {
        builder = builder.default_chunk_size(chunk_size);
    }
    let ttl = match config.upload.ttl_seconds {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    let service = Arc::new(builder.session_ttl(ttl).build().map_err(ServerError::from)?);

    // Background sweep of expired sessions.
    let sweeper = if config.cleanup.enabled {
        let sweeper_config = SweeperConfig {
            interval: Duration::from_secs(config.cleanup.interval_seconds.max(1)),
        };
        Some(torrin_engine::CleanupSweeper::spawn(
            sweeper_config,
            Arc::clone(&service),
        ))
    } else {
        None
    };

    let app = api::router(AppState { service }, &config.server.base_path);

    // Resolve the bind address (CLI overrides take precedence).
    let host = cli.host.unwrap_or(config.server.host);
    let port = cli.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, base_path = %config.server.base_path, "torrin-server listening");

    // Serve with graceful shutdown on SIGINT / SIGTERM.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some((shutdown_tx, handle)) = sweeper {
        let _ = shutdown_tx.send(()).await;
        let _ = handle.await;
    }

    info!("torrin-server shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
