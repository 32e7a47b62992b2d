use anyhow::Context;
use myna_stylist::{config::AppConfig, routes::{router, AppState}};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env().context("reading configuration")?;
    tracing::info!(
        generation_delay_ms = config.generation_delay.as_millis() as u64,
        recommendation_delay_ms = config.recommendation_delay.as_millis() as u64,
        "👗 MYNA stylist backend configured"
    );

    let app = router(AppState::new(&config));

    let addr = SocketAddr::from(([0,0,0,0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await
        .context("serving")?;
    Ok(())
}
