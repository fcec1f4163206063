//! Usercast server
//!
//! Run with: usercast-server

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use usercast::app::{app_router, AppState};
use usercast::config::{
    AppConfig, CABLE_PATH, DEFAULT_API_BASE_URL, DEFAULT_LISTEN_PORT, DEFAULT_MAX_UPLOAD_BYTES,
};
use usercast::error::Result;

const DEFAULT_LOG_FILTER: &str = "usercast=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(name = "usercast-server")]
#[command(about = "Registration page, users proxy and live event relay")]
#[command(version)]
struct Args {
    /// Base URL of the user directory API
    #[arg(long, env = "API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    api_base_url: String,

    /// Port for the combined HTTP + relay server
    #[arg(long, env = "LISTEN_PORT", default_value_t = DEFAULT_LISTEN_PORT)]
    listen_port: u16,

    /// Largest request body forwarded by the proxy, in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let args = Args::parse();
    let config = AppConfig::new(&args.api_base_url, args.listen_port, args.max_upload_bytes)?;

    let state = AppState::from_config(&config)?;
    let app = app_router(state, &config);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("Relay at ws://{}{}", addr, CABLE_PATH);
    tracing::info!("Proxying /api/users to {}", config.users_url());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
