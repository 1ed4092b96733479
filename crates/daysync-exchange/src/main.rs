//! daysync-exchange - token exchange endpoint for public OAuth clients.

use daysync_core::{TracingConfig, init_tracing};
use daysync_exchange::{AppState, ExchangeConfig, ExchangeResult, router, shutdown_signal};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // .env is optional.
    let _ = dotenvy::dotenv();
    if let Err(e) = init_tracing(TracingConfig::server().with_env_filter(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "daysync_exchange=info,tower_http=info".into()),
    )) {
        eprintln!("failed to initialize logging: {}", e);
    }

    if let Err(e) = run().await {
        error!(error = %e, "exchange server failed");
        std::process::exit(1);
    }
}

async fn run() -> ExchangeResult<()> {
    let config = ExchangeConfig::from_env()?;
    let addr = config.listen_addr();
    let origin = config.allowed_origin.clone();
    let app = router(AppState::new(config)?)?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, allowed_origin = %origin, "exchange server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("exchange server stopped");
    Ok(())
}
