//! SwainOS backend HTTP server.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{debug, info};

use common::Settings;
use swainos::{api::build_router, telemetry, AppState};

#[derive(Parser)]
#[command(name = "swainos-server", about = "SwainOS analytics backend")]
struct Cli {
    /// Listen address; overrides BIND_ADDR.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        debug!("No .env file loaded: {}", e);
    }
    telemetry::init_tracing();
    let cli = Cli::parse();

    let settings = Settings::from_env().context("loading settings")?;
    let bind_addr = cli.bind.unwrap_or_else(|| settings.bind_addr.clone());
    info!(
        app = %settings.app_name,
        environment = %settings.environment,
        prefix = %settings.api_prefix,
        "starting server"
    );

    let state = AppState::from_settings(settings).context("building services")?;
    let app = build_router(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    info!("listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
