//! podgen-ps (Progress Stream) - episode generation progress service
//!
//! Hosts the in-process progress bus and exposes it over HTTP:
//! - GET /api/progress/:job_id streams progress events (SSE)
//! - POST /api/progress/:job_id reports progress from external producers
//! - GET /health

use anyhow::{Context, Result};
use clap::Parser;
use podgen_common::ProgressBus;
use podgen_ps::config::{load_toml_config, Args, Config, ConfigSource};
use podgen_ps::{build_router, AppState};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // TOML is read before tracing init because it supplies the default log level
    let (toml_config, source) =
        load_toml_config(args.config.as_deref()).context("Failed to load configuration file")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                let level = &toml_config.logging.level;
                format!("podgen_ps={level},podgen_common={level},tower_http={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting PodGen Progress Stream (podgen-ps) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match &source {
        ConfigSource::File(path) => info!("Config file: {}", path.display()),
        ConfigSource::Defaults => warn!("No config file found, using defaults"),
    }

    let config = Config::resolve(&args, &toml_config).context("Invalid configuration")?;
    if config.access_key_generated {
        warn!(
            "No access key configured; generated one for this run: {}",
            config.access_key
        );
    }
    info!(
        "Stream settings: keep-alive {}s, {} events buffered per client, close on terminal step: {}",
        config.stream.keepalive.as_secs(),
        config.stream.subscriber_capacity,
        config.stream.close_on_terminal
    );

    let bus = ProgressBus::new();
    let shutdown = CancellationToken::new();
    let state = AppState::from_config(bus, &config, shutdown.clone());
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("podgen-ps listening on http://{}", config.bind_addr);
    info!("Health check: http://{}/health", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then cancel every open progress stream
///
/// Open SSE responses never finish on their own, so graceful shutdown only
/// completes once the token ends them.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }

    shutdown.cancel();
}
