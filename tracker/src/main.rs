mod handlers;
mod monitor;
mod state;

use std::{env, time::Duration};

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::state::{AppState, DEFAULT_MAX_DESCRIBE};

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_TICK_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tracker=debug,tower_http=info,axum=info")),
        )
        .init();

    let bind = env::var("TRACKER_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let tick_secs: u64 = env::var("TRACKER_TICK_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_TICK_SECS);
    let max_describe: usize = env::var("TRACKER_MAX_DESCRIBE")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(DEFAULT_MAX_DESCRIBE);

    let state = AppState::new(max_describe);

    // router HTTP
    let app = handlers::build_router(state.clone());

    // avance de unidades en segundo plano
    let monitor_state = state.clone();
    tokio::spawn(async move {
        monitor::advance_units(monitor_state, Duration::from_secs(tick_secs.max(1))).await;
    });

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("no pude escuchar en {bind}"))?;
    info!(
        "tracker escuchando en {} (tick={}s, max_describe={})",
        listener.local_addr()?,
        tick_secs,
        max_describe
    );

    axum::serve(listener, app).await?;
    Ok(())
}
