pub mod api;
pub mod config;
pub mod db;

use anyhow::Context;

use crate::api::handlers::messages;
use crate::config::Config;

/// Opens the workspace, starts the expiry sweep, and serves until ctrl-c.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let conn = db::open_db(&config.data_dir)
        .with_context(|| format!("opening database in {}", config.data_dir.display()))?;
    let addr = config.addr;
    let sweep_every = config.sweep_interval;
    let state = api::AppState::new(config, conn);

    messages::spawn_sweeper(state.db.clone(), sweep_every);
    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
