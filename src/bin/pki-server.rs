//! Entrypoint for the PKI service: loads YAML config, connects the
//! database pools, runs migrations, loads the configured issuers, and
//! runs the `main`/`pki`/`metrics` listeners until a shutdown signal.

use clap::Parser;
use casper_pki::{config::AppConfig, db, issuer::IssuerStore, server::Server};

#[derive(Parser)]
#[command(name = "pki-server")]
#[command(about = "Private certificate authority renewal, OCSP, and CRL service")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let config = AppConfig::load(&args.config)?;

    let pools = db::Pools::connect(&config.db).await?;
    pools.migrate().await?;
    let repo = db::Repo::new(pools);

    let issuers = IssuerStore::load(&config.certs)?;

    tracing::info!(issuers = issuers.list().len(), "issuers loaded");

    Server::new(config, repo, issuers).run().await
}
