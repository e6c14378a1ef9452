//! One-shot mutations: `add`, `update`, `delete`.
//!
//! Each command opens a short-lived sync session, waits up to
//! `--connect-timeout` for the channel, applies the mutation (sent or queued)
//! and then shuts the session down, which flushes anything already handed to
//! the link.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use clap::Parser;
use ledger_common::config::LedgerConfig;
use ledger_store::LedgerEntry;
use ledger_store::LocalStore;
use ledger_store::period_key_for_date;
use ledger_sync::Delivery;
use ledger_sync::SyncConfig;
use ledger_sync::SyncService;

#[derive(Debug, Args)]
pub struct ConnectArgs {
    /// How long to wait for the channel before queueing, in milliseconds.
    #[arg(long = "connect-timeout", value_name = "MS", default_value_t = 3000)]
    pub connect_timeout_ms: u64,
}

/// Exactly one of the two money fields.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct ValueArgs {
    /// Revenue amount.
    #[arg(long = "amount", allow_negative_numbers = true)]
    pub amount: Option<f64>,

    /// Salary / payout amount.
    #[arg(long = "salary", allow_negative_numbers = true)]
    pub salary: Option<f64>,
}

impl ValueArgs {
    fn entry(&self, date: &str, symbols: &str) -> anyhow::Result<LedgerEntry> {
        match (self.amount, self.salary) {
            (Some(amount), None) => Ok(LedgerEntry::revenue(date, symbols, amount)),
            (None, Some(salary)) => Ok(LedgerEntry::salary(date, symbols, salary)),
            _ => anyhow::bail!("exactly one of --amount or --salary is required"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct AddArgs {
    /// Date, DD.MM.YYYY.
    #[arg(long = "date", short = 'd')]
    pub date: String,

    /// Client name or description.
    #[arg(long = "symbols", short = 's')]
    pub symbols: String,

    #[command(flatten)]
    pub value: ValueArgs,

    /// Display order within the day.
    #[arg(long = "order")]
    pub order: Option<u32>,

    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Debug, Parser)]
pub struct UpdateArgs {
    /// Period holding the entry (YYYY-MM).
    #[arg(long = "period", short = 'p')]
    pub period: String,

    /// Server-assigned row index.
    #[arg(long = "row", short = 'r')]
    pub row: u64,

    /// Date, DD.MM.YYYY.
    #[arg(long = "date", short = 'd')]
    pub date: String,

    /// Client name or description.
    #[arg(long = "symbols", short = 's')]
    pub symbols: String,

    #[command(flatten)]
    pub value: ValueArgs,

    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Debug, Parser)]
pub struct DeleteArgs {
    /// Period holding the entry (YYYY-MM).
    #[arg(long = "period", short = 'p')]
    pub period: String,

    /// Server-assigned row index.
    #[arg(long = "row", short = 'r')]
    pub row: u64,

    #[command(flatten)]
    pub connect: ConnectArgs,
}

pub async fn add(
    config: &LedgerConfig,
    store: Arc<LocalStore>,
    args: &AddArgs,
) -> anyhow::Result<()> {
    period_key_for_date(&args.date)?;
    let mut entry = args.value.entry(&args.date, &args.symbols)?;
    if let Some(order) = args.order {
        entry = entry.with_order_index(order);
    }
    let delivery = with_session(config, store, &args.connect, |service| {
        service.add_entry(entry)
    })
    .await?;
    report("add_entry", delivery);
    Ok(())
}

pub async fn update(
    config: &LedgerConfig,
    store: Arc<LocalStore>,
    args: &UpdateArgs,
) -> anyhow::Result<()> {
    period_key_for_date(&args.date)?;
    let entry = args
        .value
        .entry(&args.date, &args.symbols)?
        .with_row_idx(args.row);
    let delivery = with_session(config, store, &args.connect, |service| {
        service.update_entry(&args.period, args.row, entry)
    })
    .await?;
    report("update_entry", delivery);
    Ok(())
}

pub async fn delete(
    config: &LedgerConfig,
    store: Arc<LocalStore>,
    args: &DeleteArgs,
) -> anyhow::Result<()> {
    let delivery = with_session(config, store, &args.connect, |service| {
        service.delete_entry(&args.period, args.row)
    })
    .await?;
    report("delete_entry", delivery);
    Ok(())
}

async fn with_session(
    config: &LedgerConfig,
    store: Arc<LocalStore>,
    connect: &ConnectArgs,
    mutate: impl FnOnce(&SyncService) -> Delivery,
) -> anyhow::Result<Delivery> {
    let sync_config = SyncConfig::from_ledger(config).context("invalid server endpoints")?;
    let service = SyncService::new(sync_config, store)?;
    service.connect();

    let timeout = Duration::from_millis(connect.connect_timeout_ms);
    if !service.channel().wait_connected(timeout).await {
        tracing::info!("channel not open after {timeout:?}; the action will be queued");
    }

    let delivery = mutate(&service);
    service.shutdown().await;
    Ok(delivery)
}

fn report(kind: &str, delivery: Delivery) {
    match delivery {
        Delivery::Sent => println!("sent {kind}"),
        Delivery::Queued(len) => println!("queued {kind} ({len} pending)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn value(amount: Option<f64>, salary: Option<f64>) -> ValueArgs {
        ValueArgs { amount, salary }
    }

    #[test]
    fn value_args_pick_the_entry_kind() {
        let revenue = value(Some(12.5), None).entry("03.01.2025", "Acme").unwrap();
        assert_eq!(revenue, LedgerEntry::revenue("03.01.2025", "Acme", 12.5));

        let salary = value(None, Some(80.0)).entry("15.01.2025", "Payroll").unwrap();
        assert_eq!(salary, LedgerEntry::salary("15.01.2025", "Payroll", 80.0));
    }

    #[test]
    fn value_args_reject_zero_or_two_values() {
        assert!(value(None, None).entry("03.01.2025", "Acme").is_err());
        assert!(value(Some(1.0), Some(2.0)).entry("03.01.2025", "Acme").is_err());
    }
}
