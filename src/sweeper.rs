//! Sweeper: an independent 6h ticker that deletes expired `cert_info`
//! rows. Runs on its own schedule, decoupled from CRL rebuilding.

use tokio::sync::broadcast;

use crate::db::Repo;

pub async fn run(repo: Repo, interval: std::time::Duration, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match repo.delete_cert_expired().await {
                    Ok(deleted) if deleted > 0 => tracing::info!(deleted, "swept expired certs"),
                    Ok(_) => {}
                    Err(err) => tracing::error!(error = %err, "sweeper tick failed, retrying next interval"),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("sweeper shutting down");
                break;
            }
        }
    }
}
