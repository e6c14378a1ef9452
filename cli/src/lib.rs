//! `ledger` command-line front end.
//!
//! ## Commands
//!
//! - `ledger run`
//! - `ledger add --date <D> --symbols <S> (--amount <X> | --salary <X>) [--order <N>]`
//! - `ledger update --period <P> --row <R> --date <D> --symbols <S> (--amount <X> | --salary <X>)`
//! - `ledger delete --period <P> --row <R>`
//! - `ledger pending [--json]`
//! - `ledger entries [--period <P>] [--json]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use ledger_common::config::ConfigLoader;
use ledger_common::config::LedgerConfig;
use ledger_store::LocalStore;

pub mod entry_cmd;
pub mod run_cmd;
pub mod state_cmd;

/// Offline-first ledger client.
#[derive(Debug, Parser)]
#[command(name = "ledger", version)]
pub struct Cli {
    /// Config file. Defaults to ./ledger.toml, then the user config dir.
    #[arg(long = "config", short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Override `store.state_file`.
    #[arg(long = "state-file", global = true)]
    pub state_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Keep a live session open until Ctrl-C.
    Run(run_cmd::RunArgs),
    /// Add an entry.
    Add(entry_cmd::AddArgs),
    /// Update an existing entry.
    Update(entry_cmd::UpdateArgs),
    /// Delete an entry.
    Delete(entry_cmd::DeleteArgs),
    /// Print actions waiting for a channel.
    Pending(state_cmd::PendingArgs),
    /// Print locally known entries.
    Entries(state_cmd::EntriesArgs),
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = self.load_config()?;
        let store = open_store(&config)?;
        match self.command {
            Command::Run(args) => run_cmd::run(&config, store, &args).await,
            Command::Add(args) => entry_cmd::add(&config, store, &args).await,
            Command::Update(args) => entry_cmd::update(&config, store, &args).await,
            Command::Delete(args) => entry_cmd::delete(&config, store, &args).await,
            Command::Pending(args) => state_cmd::pending(&store, &args),
            Command::Entries(args) => state_cmd::entries(&store, &args),
        }
    }

    fn load_config(&self) -> anyhow::Result<LedgerConfig> {
        let mut config = match &self.config {
            Some(path) => ConfigLoader::new().with_file(path).load(),
            None => ConfigLoader::load_default(),
        }
        .context("failed to load configuration")?;
        if let Some(state_file) = &self.state_file {
            config.store.state_file = state_file.clone();
        }
        Ok(config)
    }
}

fn open_store(config: &LedgerConfig) -> anyhow::Result<Arc<LocalStore>> {
    let store = LocalStore::open(&config.store.state_file).with_context(|| {
        format!(
            "failed to open state file {}",
            config.store.state_file.display()
        )
    })?;
    Ok(Arc::new(store))
}
