use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use wicgate_backend::{AppState, config::Config, create_app};
use wicgate_live::{Environment, HttpSource, LiveStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    #[cfg(debug_assertions)]
    let default_level = "debug";
    #[cfg(not(debug_assertions))]
    let default_level = "info";

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .compact()
        .init();
    tracing::info!("Starting WICGATE live backend...");

    let config = Config::from_env().context("invalid configuration")?;
    tracing::info!(
        "Configuration: port={}, api_base={}, poll={}s, retries={}, attempt_timeout={}s, body_limit={}KB, timeout={}s",
        config.port,
        config.api_base,
        config.poll_interval.as_secs(),
        config.max_retries,
        config.attempt_timeout.as_secs(),
        config.request_body_limit / 1024,
        config.request_timeout.as_secs(),
    );
    tracing::info!(
        "Rate limits: public={}/sec (burst {}), admin={}/min (burst {})",
        config.rate_limit_public_per_sec,
        config.rate_limit_public_burst,
        config.rate_limit_admin_per_min,
        config.rate_limit_admin_burst
    );

    let source = HttpSource::new(&config.api_base).context("building stats API client")?;
    let live = LiveStore::new(Arc::new(source), config.sync_config(), Environment::new());
    live.init();

    let state = AppState::new(live.clone(), config.admin_token.as_deref());
    let app = create_app(
        state,
        config.request_body_limit,
        config.request_timeout,
        config.rate_limit(),
    );

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("Server listening on {}", addr);

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    live.stop();
    tracing::info!("Live store stopped");
    served.context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
