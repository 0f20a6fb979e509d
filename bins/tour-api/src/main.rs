mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tour_common::config::ToolchainConfigManager;
use tour_engine::{Executor, Registry};
use tracing::info;
use tracing_subscriber::EnvFilter;

pub struct AppState {
    pub executor: Executor,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Go tour API booting...");

    let config = ToolchainConfigManager::load_default().context("Failed to load toolchain config")?;

    // Probing runs `go version` per toolchain; keep it off the async workers
    let registry = Arc::new(Registry::from_config(&config));
    let probe = Arc::clone(&registry);
    tokio::task::spawn_blocking(move || probe.initialize())
        .await
        .context("Toolchain discovery panicked")?;

    let status = registry.status();
    info!(
        total = status.total_versions,
        available = status.available_versions,
        "Toolchain registry initialized"
    );

    let executor = Executor::from_config(&config, registry).context("Failed to prepare executor")?;
    let state = Arc::new(AppState { executor });

    let app = routes::routes().with_state(state);

    let port = std::env::var("APP_PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
