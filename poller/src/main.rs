use std::{env, fs, io};

use anyhow::{Context, Result};
use poller::{unit_ids_from_event, BatchStatusPoller, HttpTracker, PollConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Handler de la tarea de polling: lee el evento (archivo en argv[1] o
/// stdin), consulta una vez y escribe el token del resultado en stdout.
#[tokio::main]
async fn main() -> Result<()> {
    // stdout queda reservado para el token.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("poller=info")),
        )
        .with_writer(io::stderr)
        .init();

    let raw = match env::args().nth(1) {
        Some(path) => fs::read_to_string(&path).with_context(|| format!("leyendo {path}"))?,
        None => io::read_to_string(io::stdin()).context("leyendo stdin")?,
    };
    let ids = unit_ids_from_event(&raw).context("evento de polling inválido")?;

    let config = PollConfig::from_env();
    let tracker = HttpTracker::from_config(&config)?;
    info!("consultando {} unidades en {}", ids.len(), tracker.base_url());

    let poller = BatchStatusPoller::new(tracker, config);
    let report = poller.check(&ids).await?;

    println!("{}", serde_json::to_string(&report.outcome)?);
    Ok(())
}
