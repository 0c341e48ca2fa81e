// crates/tabula-server/src/cli/serve.rs
// HTTP server startup and shutdown

use super::build_assistant;
use anyhow::Result;
use std::sync::Arc;
use tabula::config::{EnvConfig, TabulaConfig};
use tabula::web::{self, state::AppState};
use tokio::sync::watch;
use tracing::info;

pub async fn run_server(port: u16) -> Result<()> {
    let env = EnvConfig::load();
    let config = TabulaConfig::load();

    // Fails fast before binding when no provider is configured
    let assistant = Arc::new(build_assistant(&env, &config).await?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = assistant.spawn_sweeper(config.sweep_interval(), shutdown_rx);

    let app = web::create_router(AppState::new(assistant));
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Tabula API running on http://localhost:{}", port);
    println!("Tabula API running on http://localhost:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = sweeper.await;
    Ok(())
}
