use std::sync::Arc;

use sportline_api::{app, config::AppConfig, db, events, AppState};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config loads before the subscriber is up, so load failures go to
    // stderr directly. The filter honors RUST_LOG when set.
    let config = AppConfig::load().map_err(|e| {
        eprintln!("failed to load configuration: {}", e);
        e
    })?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    if config.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = Arc::new(config);
    let db = Arc::new(db::connect(&config).await?);

    let (event_sender, mut event_rx) = events::channel(1024);

    // Drain workflow events into the log stream; downstream consumers
    // (email workers, analytics) subscribe here in production.
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            info!(?event, "workflow event");
        }
    });

    let state = AppState::build(db, config.clone(), event_sender)
        .map_err(|e| anyhow::anyhow!("service wiring failed: {}", e))?;

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "sportline-api listening");

    if let Err(e) = axum::serve(listener, app(state)).await {
        error!(error = %e, "server terminated");
        return Err(e.into());
    }
    Ok(())
}
