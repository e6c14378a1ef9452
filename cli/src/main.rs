use clap::Parser;
use ledger_cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ledger_common::logging::init("info");
    Cli::parse().run().await
}
