//! Synapse site backend server.

use std::net::SocketAddr;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use synapse_site::config::Config;
use synapse_site::{create_router, AppState};

const LIMITER_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration; a missing pepper stops startup here
    let config = Config::from_env().inspect_err(|e| eprintln!("Configuration error: {e}"))?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Synapse site backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Upload directory: {:?}", config.upload_dir);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (SITE_API_PSK). Admin routes are open!");
    }

    let bind_addr = config.bind_addr;
    let state = AppState::initialize(config).await.inspect_err(|e| {
        tracing::error!("Startup failed: {}", e);
    })?;

    if state.limiter.is_enabled() {
        let limiter = state.limiter.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(LIMITER_PURGE_INTERVAL);
            loop {
                ticker.tick().await;
                limiter.purge_expired();
            }
        });
    }

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
