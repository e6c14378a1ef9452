//! Read-only views of the persisted state.

use clap::Parser;
use ledger_store::LedgerEntry;
use ledger_store::LocalStore;
use ledger_store::PeriodMap;

#[derive(Debug, Parser)]
pub struct PendingArgs {
    /// Output as JSON.
    #[arg(long = "json", short = 'j')]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct EntriesArgs {
    /// Only this period (YYYY-MM).
    #[arg(long = "period", short = 'p')]
    pub period: Option<String>,

    /// Output as JSON.
    #[arg(long = "json", short = 'j')]
    pub json: bool,
}

pub fn pending(store: &LocalStore, args: &PendingArgs) -> anyhow::Result<()> {
    let pending = store.pending();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&pending)?);
        return Ok(());
    }
    if pending.is_empty() {
        println!("No pending actions");
        return Ok(());
    }
    for (position, action) in pending.iter().enumerate() {
        println!("{:>3}  {}", position + 1, action.to_json()?);
    }
    Ok(())
}

pub fn entries(store: &LocalStore, args: &EntriesArgs) -> anyhow::Result<()> {
    let entries = match &args.period {
        Some(period) => {
            let mut only = PeriodMap::new();
            only.insert(period.clone(), store.entries_for(period));
            only
        }
        None => store.entries(),
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.entry_count() == 0 {
        println!("No entries");
        return Ok(());
    }
    for (period, rows) in entries.iter() {
        println!("{period}");
        for entry in rows {
            println!("  {}", format_row(entry));
        }
    }
    Ok(())
}

fn format_row(entry: &LedgerEntry) -> String {
    let row = match entry.row_idx {
        Some(idx) => idx.to_string(),
        None => "-".to_string(),
    };
    let kind = if entry.value.is_salary() {
        "salary"
    } else {
        "amount"
    };
    format!(
        "{row:>5}  {}  {:<24}  {kind:<6}  {:>12.2}",
        entry.date,
        entry.symbols,
        entry.value.value()
    )
}
