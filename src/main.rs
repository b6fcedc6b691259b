//! Doc Converter Server
//!
//! A stateless document conversion service: PDF → Word, Word → PDF,
//! PDF merge and images → PDF over a small multipart HTTP API.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use doc_converter_server::artifacts::{ArtifactStore, PurgeScheduler};
use doc_converter_server::config::Config;
use doc_converter_server::engine::EngineRegistry;
use doc_converter_server::routes;
use doc_converter_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doc_converter_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Doc Converter Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Workspace root: {}",
        config.storage.workspace_root.display()
    );

    let store = ArtifactStore::open(&config.storage.workspace_root, config.storage.retention())
        .await
        .context("Failed to open workspace root")?;

    let registry =
        EngineRegistry::with_defaults(&config).context("Failed to build engine registry")?;
    for engine in registry.health().await {
        if engine.available {
            tracing::info!("Engine {:?} ready ({})", engine.engine, engine.backend);
        } else {
            tracing::warn!(
                "Engine {:?} unavailable ({}); its tools will fail until it is installed",
                engine.engine,
                engine.backend
            );
        }
    }

    let scheduler = PurgeScheduler::start(store.clone(), config.storage.purge_interval());

    let app_state = AppState::new(registry, store);
    let app = routes::app(app_state);

    // Start server with graceful shutdown
    let ip: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid SERVER_HOST '{}'", config.server.host))?;
    let addr = SocketAddr::new(ip, config.server.port);
    tracing::info!("Doc Converter Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    scheduler.shutdown().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
