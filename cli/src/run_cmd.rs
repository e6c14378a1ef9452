use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ledger_common::config::LedgerConfig;
use ledger_store::LocalStore;
use ledger_sync::SyncConfig;
use ledger_sync::SyncService;

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Skip the initial snapshot pull and the periodic reconcile loop.
    #[arg(long = "no-reconcile")]
    pub no_reconcile: bool,
}

/// Connect, keep the session alive and log connectivity changes until Ctrl-C.
pub async fn run(
    config: &LedgerConfig,
    store: Arc<LocalStore>,
    args: &RunArgs,
) -> anyhow::Result<()> {
    let sync_config = SyncConfig::from_ledger(config).context("invalid server endpoints")?;
    tracing::info!(
        channel = %sync_config.channel_url,
        entries = %sync_config.entries_url,
        "starting ledger session"
    );
    let service = SyncService::new(sync_config, store)?;
    let mut connectivity = service.subscribe_connectivity();

    service.connect();
    if !args.no_reconcile
        && let Err(e) = service.start_session().await
    {
        tracing::info!("starting offline: {e}");
    }

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::error!("failed to listen for Ctrl-C: {e}");
                }
                break;
            }
            changed = connectivity.changed() => {
                if changed.is_err() {
                    break;
                }
                let now = *connectivity.borrow_and_update();
                tracing::info!(
                    connectivity = ?now,
                    pending = service.store().pending_len(),
                    "connectivity changed"
                );
            }
        }
    }

    service.shutdown().await;
    Ok(())
}
