//! OpenChat Server - Main Entry Point

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use openchat_server::{api, config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("openchat_server=info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "Starting OpenChat server"
    );

    let http_addr = config.http_addr.clone();
    let state = api::AppState::new(config);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    info!(address = %http_addr, "Server listening");

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        info!("Received shutdown signal, initiating graceful shutdown...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shutdown complete");

    Ok(())
}
