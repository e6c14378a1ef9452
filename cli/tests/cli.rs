#![allow(clippy::unwrap_used, clippy::expect_used)]
//! `ledger` binary integration tests.
//!
//! Every test points the binary at an origin nobody listens on, so mutations
//! always end up in the pending queue.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Result;
use ledger_store::ChannelAction;
use ledger_store::LedgerEntry;
use ledger_store::LocalStore;
use ledger_store::PeriodMap;
use ledger_store::load_snapshot;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::Value as JsonValue;
use serde_json::json;
use tempfile::TempDir;

const OFFLINE_CONFIG: &str = r#"
[server]
origin = "http://127.0.0.1:9"

[sync]
reconnect_delay_ms = 50
request_timeout_ms = 200
"#;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("ledger.toml"), OFFLINE_CONFIG)?;
        Ok(Self { dir })
    }

    fn state_file(&self) -> PathBuf {
        self.dir.path().join("ledger-state.json")
    }

    fn command(&self) -> Result<assert_cmd::Command> {
        let mut cmd = assert_cmd::Command::cargo_bin("ledger")?;
        cmd.current_dir(self.dir.path());
        cmd.env_remove("RUST_LOG");
        cmd.arg("--config")
            .arg(self.dir.path().join("ledger.toml"))
            .arg("--state-file")
            .arg(self.state_file());
        Ok(cmd)
    }

    fn seed(&self, entries: PeriodMap) -> Result<()> {
        let store = LocalStore::open(self.state_file())?;
        store.replace_entries(entries)?;
        Ok(())
    }
}

fn stdout_json(output: &[u8]) -> Result<JsonValue> {
    Ok(serde_json::from_slice(output)?)
}

fn two_periods() -> PeriodMap {
    let mut entries = PeriodMap::new();
    entries.insert(
        "2025-01",
        vec![
            LedgerEntry::revenue("03.01.2025", "Acme", 120.0).with_row_idx(7),
            LedgerEntry::salary("15.01.2025", "Payroll", 80.0).with_row_idx(8),
        ],
    );
    entries.insert(
        "2025-02",
        vec![LedgerEntry::revenue("01.02.2025", "Globex", 50.0).with_row_idx(9)],
    );
    entries
}

fn assert_cli_state(path: &Path, pending: Vec<ChannelAction>) -> Result<()> {
    let state = load_snapshot(path)?;
    assert_eq!(state.pending_actions, pending);
    Ok(())
}

#[test]
fn pending_is_empty_for_a_fresh_state_file() -> Result<()> {
    let fixture = Fixture::new()?;
    let output = fixture
        .command()?
        .args(["pending", "--json"])
        .output()?;
    assert!(output.status.success());
    assert_eq!(stdout_json(&output.stdout)?, json!([]));

    fixture
        .command()?
        .arg("pending")
        .assert()
        .success()
        .stdout(predicate::str::contains("No pending actions"));
    Ok(())
}

#[test]
fn entries_can_be_filtered_by_period() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.seed(two_periods())?;

    let output = fixture
        .command()?
        .args(["entries", "--period", "2025-02", "--json"])
        .output()?;
    assert!(output.status.success());
    assert_eq!(
        stdout_json(&output.stdout)?,
        json!({"2025-02": [{"date": "01.02.2025", "symbols": "Globex", "amount": 50.0, "row_idx": 9}]})
    );

    fixture
        .command()?
        .arg("entries")
        .assert()
        .success()
        .stdout(predicate::str::contains("2025-01"))
        .stdout(predicate::str::contains("Payroll"))
        .stdout(predicate::str::contains("salary"));
    Ok(())
}

#[test]
fn offline_delete_is_queued_and_applied_locally() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.seed(two_periods())?;

    fixture
        .command()?
        .args(["delete", "--period", "2025-01", "--row", "7"])
        .args(["--connect-timeout", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("queued delete_entry (1 pending)"));

    assert_cli_state(&fixture.state_file(), vec![ChannelAction::delete(7)])?;
    let state = load_snapshot(&fixture.state_file())?;
    let rows: Vec<Option<u64>> = state
        .entries
        .get("2025-01")
        .unwrap()
        .iter()
        .map(|e| e.row_idx)
        .collect();
    assert_eq!(rows, vec![Some(8)]);
    Ok(())
}

#[test]
fn offline_mutations_queue_in_order() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.seed(two_periods())?;

    fixture
        .command()?
        .args(["add", "--date", "04.01.2025", "--symbols", "Initech"])
        .args(["--amount", "42.5", "--order", "2", "--connect-timeout", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("queued add_entry (1 pending)"));

    fixture
        .command()?
        .args(["update", "--period", "2025-02", "--row", "9"])
        .args(["--date", "01.02.2025", "--symbols", "Globex Corp"])
        .args(["--salary", "60", "--connect-timeout", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("queued update_entry (2 pending)"));

    let output = fixture
        .command()?
        .args(["pending", "--json"])
        .output()?;
    assert_eq!(
        stdout_json(&output.stdout)?,
        json!([
            {
                "type": "add_entry",
                "data": {"date": "04.01.2025", "symbols": "Initech", "amount": 42.5, "order_index": 2}
            },
            {"type": "update_entry", "idx": 9, "symbols": "Globex Corp", "amount": 60.0}
        ])
    );

    let state = load_snapshot(&fixture.state_file())?;
    let updated = &state.entries.get("2025-02").unwrap()[0];
    assert_eq!(updated.symbols, "Globex Corp");
    assert_eq!(updated.salary_amount(), Some(60.0));
    Ok(())
}

#[test]
fn add_requires_exactly_one_value() -> Result<()> {
    let fixture = Fixture::new()?;

    fixture
        .command()?
        .args(["add", "--date", "04.01.2025", "--symbols", "Initech"])
        .args(["--amount", "1", "--salary", "2"])
        .assert()
        .code(2);

    fixture
        .command()?
        .args(["add", "--date", "04.01.2025", "--symbols", "Initech"])
        .assert()
        .code(2);

    assert_cli_state(&fixture.state_file(), Vec::new())?;
    Ok(())
}

#[test]
fn add_rejects_a_malformed_date() -> Result<()> {
    let fixture = Fixture::new()?;

    fixture
        .command()?
        .args(["add", "--date", "2025-01-04", "--symbols", "Initech"])
        .args(["--amount", "1", "--connect-timeout", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid date"));

    assert_cli_state(&fixture.state_file(), Vec::new())?;
    Ok(())
}

#[test]
fn missing_config_file_is_reported() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut cmd = assert_cmd::Command::cargo_bin("ledger")?;
    cmd.current_dir(fixture.dir.path())
        .args(["--config", "does-not-exist.toml", "pending"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load configuration"));
    Ok(())
}
