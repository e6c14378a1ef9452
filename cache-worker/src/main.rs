//! `ledger-cache-worker` entry point.
//!
//! Installs the current cache generation, activates it (dropping older
//! generations), then serves the proxy front end until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ledger_cache_worker::CacheStorage;
use ledger_cache_worker::CacheWorker;
use ledger_cache_worker::HttpFetcher;
use ledger_cache_worker::WorkerSettings;
use ledger_cache_worker::proxy::ProxyServer;
use ledger_cache_worker::runtime;
use ledger_common::ConfigLoader;

#[derive(Debug, Parser)]
#[command(version, about = "Offline cache and notification worker for the ledger app")]
struct Cli {
    /// Config file (defaults to the standard search locations).
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Override `cache.listen`.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ledger_common::logging::init("info");
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::new().with_file(path).load(),
        None => ConfigLoader::load_default(),
    }
    .context("failed to load configuration")?;

    tracing::info!(
        "ledger-cache-worker v{} starting (cache {})",
        env!("CARGO_PKG_VERSION"),
        config.cache.version
    );

    let settings = WorkerSettings::from_ledger(&config)?;
    let origin = settings.origin.clone();
    let client = reqwest::Client::builder()
        .timeout(config.sync.request_timeout())
        .build()
        .context("failed to build HTTP client")?;
    let worker = CacheWorker::new(
        settings,
        CacheStorage::new(&config.cache.dir),
        Arc::new(HttpFetcher::new(client)),
    );

    let (handle, event_loop) = runtime::spawn(worker);
    handle.install().await.context("install failed")?;
    let deleted = handle.activate().await.context("activation failed")?;
    if !deleted.is_empty() {
        tracing::info!("removed {} stale cache(s)", deleted.len());
    }

    let listen = cli.listen.unwrap_or_else(|| config.cache.listen.clone());
    let proxy = ProxyServer::bind(&listen, origin, handle.clone())?;

    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("signal received, shutting down");

    proxy.shutdown().await;
    drop(handle);
    let _ = event_loop.await;
    tracing::info!("ledger-cache-worker exiting cleanly");
    Ok(())
}
