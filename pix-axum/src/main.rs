use std::time::Duration;

use anyhow::Result;
use pix_axum::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env();
    let images = config.open_coordinator().await?;

    // Reconcile chunks and records left inconsistent by a previous run
    let grace = config.upload_timeout.unwrap_or(Duration::from_secs(60));
    if let Err(err) = images.sweep(grace).await {
        tracing::warn!(error = %err, "startup sweep failed, continuing without it");
    }

    let ax = pix_axum::build(&config, images)?;

    let addr = config.addr();
    println!("[pixshelf] listening on http://{addr}");

    ax.listen(addr).await?;

    Ok(())
}
