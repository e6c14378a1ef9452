//! Ledger data model.
//!
//! Entries travel over the wire with two optional money fields, `amount`
//! (revenue) and `salary` (payout). Exactly one of them is meaningful, so the
//! in-memory form folds them into [`EntryValue`] and converts at the serde
//! boundary through [`WireEntry`].

use std::collections::BTreeMap;

use chrono::Datelike;
use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;

/// External date format used by the server and the UI (`DD.MM.YYYY`).
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Errors raised while interpreting ledger data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("invalid date {0:?}: expected DD.MM.YYYY")]
    InvalidDate(String),

    #[error("entry dated {date} has neither amount nor salary")]
    MissingValue { date: String },
}

/// The monetary value of an entry. Setting one kind replaces the other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryValue {
    /// Revenue received from a client.
    Amount(f64),
    /// Salary / payout.
    Salary(f64),
}

impl EntryValue {
    /// The raw number regardless of kind.
    pub fn value(self) -> f64 {
        match self {
            Self::Amount(v) | Self::Salary(v) => v,
        }
    }

    pub fn is_salary(self) -> bool {
        matches!(self, Self::Salary(_))
    }
}

/// One ledger transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireEntry", into = "WireEntry")]
pub struct LedgerEntry {
    /// Calendar date, `DD.MM.YYYY`.
    pub date: String,
    /// Free-text label (client name or description).
    pub symbols: String,
    pub value: EntryValue,
    /// Server-assigned identity; `None` until the server has acknowledged it.
    pub row_idx: Option<u64>,
    /// Client-assigned display order within a day.
    pub order_index: Option<u32>,
}

impl LedgerEntry {
    /// A revenue entry.
    pub fn revenue(date: impl Into<String>, symbols: impl Into<String>, amount: f64) -> Self {
        Self {
            date: date.into(),
            symbols: symbols.into(),
            value: EntryValue::Amount(amount),
            row_idx: None,
            order_index: None,
        }
    }

    /// A salary / payout entry.
    pub fn salary(date: impl Into<String>, symbols: impl Into<String>, salary: f64) -> Self {
        Self {
            date: date.into(),
            symbols: symbols.into(),
            value: EntryValue::Salary(salary),
            row_idx: None,
            order_index: None,
        }
    }

    pub fn with_row_idx(mut self, row_idx: u64) -> Self {
        self.row_idx = Some(row_idx);
        self
    }

    pub fn with_order_index(mut self, order_index: u32) -> Self {
        self.order_index = Some(order_index);
        self
    }

    /// Revenue amount, if this is a revenue entry.
    pub fn amount(&self) -> Option<f64> {
        match self.value {
            EntryValue::Amount(v) => Some(v),
            EntryValue::Salary(_) => None,
        }
    }

    /// Salary amount, if this is a payout entry.
    pub fn salary_amount(&self) -> Option<f64> {
        match self.value {
            EntryValue::Salary(v) => Some(v),
            EntryValue::Amount(_) => None,
        }
    }

    /// Period key (`YYYY-MM`) this entry belongs to.
    pub fn period_key(&self) -> Result<String, ModelError> {
        period_key_for_date(&self.date)
    }
}

/// Derive the `YYYY-MM` period key from a `DD.MM.YYYY` date.
pub fn period_key_for_date(date: &str) -> Result<String, ModelError> {
    let parsed = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT)
        .map_err(|_| ModelError::InvalidDate(date.to_string()))?;
    Ok(format!("{:04}-{:02}", parsed.year(), parsed.month()))
}

/// Serialized shape of an entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireEntry {
    date: String,
    #[serde(default)]
    symbols: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    salary: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    row_idx: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    order_index: Option<u32>,
}

impl TryFrom<WireEntry> for LedgerEntry {
    type Error = ModelError;

    fn try_from(wire: WireEntry) -> Result<Self, Self::Error> {
        // The server reports a salary row even if the amount column is filled.
        let value = match (wire.salary, wire.amount) {
            (Some(salary), _) => EntryValue::Salary(salary),
            (None, Some(amount)) => EntryValue::Amount(amount),
            (None, None) => return Err(ModelError::MissingValue { date: wire.date }),
        };
        Ok(Self {
            date: wire.date,
            symbols: wire.symbols,
            value,
            row_idx: wire.row_idx,
            order_index: wire.order_index,
        })
    }
}

impl From<LedgerEntry> for WireEntry {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            amount: entry.amount(),
            salary: entry.salary_amount(),
            date: entry.date,
            symbols: entry.symbols,
            row_idx: entry.row_idx,
            order_index: entry.order_index,
        }
    }
}

/// The whole local ledger snapshot: period key → entries in display order.
///
/// Backed by a `BTreeMap` so identical snapshots serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodMap(BTreeMap<String, Vec<LedgerEntry>>);

impl PeriodMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, period: &str) -> Option<&[LedgerEntry]> {
        self.0.get(period).map(Vec::as_slice)
    }

    pub fn periods(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[LedgerEntry])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of periods.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of entries across all periods.
    pub fn entry_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn insert(&mut self, period: impl Into<String>, entries: Vec<LedgerEntry>) {
        self.0.insert(period.into(), entries);
    }

    /// Find an entry by its server identity within a period.
    pub fn find(&self, period: &str, row_idx: u64) -> Option<&LedgerEntry> {
        self.0
            .get(period)?
            .iter()
            .find(|e| e.row_idx == Some(row_idx))
    }

    /// Replace the entry with `row_idx` in `period`, keeping its position.
    ///
    /// The stored entry always carries `row_idx`, whatever `entry` says.
    /// Returns `false` when no such entry exists.
    pub fn replace_entry(&mut self, period: &str, row_idx: u64, entry: LedgerEntry) -> bool {
        let Some(entries) = self.0.get_mut(period) else {
            return false;
        };
        match entries.iter_mut().find(|e| e.row_idx == Some(row_idx)) {
            Some(slot) => {
                *slot = LedgerEntry {
                    row_idx: Some(row_idx),
                    ..entry
                };
                true
            }
            None => false,
        }
    }

    /// Remove every entry with `row_idx` from `period`.
    /// Returns `false` when nothing was removed.
    pub fn remove_entry(&mut self, period: &str, row_idx: u64) -> bool {
        let Some(entries) = self.0.get_mut(period) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.row_idx != Some(row_idx));
        entries.len() != before
    }
}

impl From<BTreeMap<String, Vec<LedgerEntry>>> for PeriodMap {
    fn from(map: BTreeMap<String, Vec<LedgerEntry>>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Vec<LedgerEntry>)> for PeriodMap {
    fn from_iter<T: IntoIterator<Item = (String, Vec<LedgerEntry>)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_map() -> PeriodMap {
        let mut map = PeriodMap::new();
        map.insert(
            "2025-01",
            vec![
                LedgerEntry::revenue("01.01.2025", "Acme", 100.0).with_row_idx(3),
                LedgerEntry::salary("02.01.2025", "payout", 40.0).with_row_idx(4),
            ],
        );
        map
    }

    #[test]
    fn revenue_entry_serializes_amount_only() {
        let entry = LedgerEntry::revenue("01.01.2025", "X", 100.0);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"date": "01.01.2025", "symbols": "X", "amount": 100.0})
        );
    }

    #[test]
    fn wire_entry_with_both_values_prefers_salary() {
        let entry: LedgerEntry = serde_json::from_value(serde_json::json!({
            "date": "05.02.2025",
            "symbols": "Bob",
            "amount": 10.0,
            "salary": 25.0,
            "row_idx": 9
        }))
        .unwrap();
        assert_eq!(entry.value, EntryValue::Salary(25.0));
        assert_eq!(entry.amount(), None);
        assert_eq!(entry.row_idx, Some(9));
    }

    #[test]
    fn wire_entry_without_value_is_rejected() {
        let err = serde_json::from_value::<LedgerEntry>(serde_json::json!({
            "date": "05.02.2025",
            "symbols": "Bob"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("neither amount nor salary"));
    }

    #[test]
    fn period_key_is_year_dash_month() {
        assert_eq!(period_key_for_date("01.01.2025").unwrap(), "2025-01");
        assert_eq!(period_key_for_date(" 31.12.2024 ").unwrap(), "2024-12");
        assert_eq!(
            period_key_for_date("2025-01-01"),
            Err(ModelError::InvalidDate("2025-01-01".to_string()))
        );
    }

    #[test]
    fn replace_entry_keeps_row_idx_and_position() {
        let mut map = sample_map();
        let edited = LedgerEntry::salary("01.01.2025", "Acme", 55.0);
        assert!(map.replace_entry("2025-01", 3, edited));

        let entries = map.get("2025-01").unwrap();
        assert_eq!(entries[0].row_idx, Some(3));
        assert_eq!(entries[0].value, EntryValue::Salary(55.0));
        assert_eq!(entries[0].amount(), None);
        assert_eq!(entries[1].row_idx, Some(4));
    }

    #[test]
    fn replace_or_remove_missing_entry_is_noop() {
        let mut map = sample_map();
        let before = map.clone();
        assert!(!map.replace_entry("2025-01", 99, LedgerEntry::revenue("x", "y", 1.0)));
        assert!(!map.remove_entry("2024-12", 3));
        assert_eq!(map, before);
    }

    #[test]
    fn remove_entry_drops_matching_row() {
        let mut map = sample_map();
        assert!(map.remove_entry("2025-01", 3));
        assert_eq!(map.get("2025-01").unwrap().len(), 1);
        assert_eq!(map.find("2025-01", 3), None);
        assert_eq!(map.entry_count(), 1);
    }

    #[test]
    fn identical_snapshots_serialize_identically() {
        let a: PeriodMap = serde_json::from_str(
            r#"{"2025-02":[{"date":"01.02.2025","symbols":"B","amount":2}],
                "2025-01":[{"date":"01.01.2025","symbols":"A","salary":1,"row_idx":2}]}"#,
        )
        .unwrap();
        let b = a.clone();
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
        assert_eq!(a.periods().collect::<Vec<_>>(), vec!["2025-01", "2025-02"]);
    }
}
