//! Outbound channel actions.
//!
//! The same JSON shape is sent over the live channel, stored in the pending
//! queue while offline, and POSTed to `/api/sync` by the background process.

use serde::Deserialize;
use serde::Serialize;

use crate::model::LedgerEntry;

/// A mutation addressed to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelAction {
    /// `{"type":"add_entry","data":{...}}`
    AddEntry { data: LedgerEntry },
    /// `{"type":"update_entry","idx":7,"symbols":"...","amount":100.0}`
    ///
    /// `amount` carries the entry's value whichever kind it is.
    UpdateEntry {
        idx: u64,
        symbols: String,
        amount: f64,
    },
    /// `{"type":"delete_entry","idx":7}`
    DeleteEntry { idx: u64 },
}

/// An action queued while no channel was available.
pub type PendingAction = ChannelAction;

impl ChannelAction {
    pub fn add(entry: LedgerEntry) -> Self {
        Self::AddEntry { data: entry }
    }

    pub fn update(row_idx: u64, entry: &LedgerEntry) -> Self {
        Self::UpdateEntry {
            idx: row_idx,
            symbols: entry.symbols.clone(),
            amount: entry.value.value(),
        }
    }

    pub fn delete(row_idx: u64) -> Self {
        Self::DeleteEntry { idx: row_idx }
    }

    /// Wire tag of this action.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddEntry { .. } => "add_entry",
            Self::UpdateEntry { .. } => "update_entry",
            Self::DeleteEntry { .. } => "delete_entry",
        }
    }

    /// Serialize to the JSON text sent over the channel.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn add_entry_wire_shape() {
        let action = ChannelAction::add(LedgerEntry::revenue("01.01.2025", "X", 100.0));
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            serde_json::json!({
                "type": "add_entry",
                "data": {"date": "01.01.2025", "symbols": "X", "amount": 100.0}
            })
        );
    }

    #[test]
    fn update_entry_sends_salary_as_amount() {
        let entry = LedgerEntry::salary("03.03.2025", "payout", 70.0);
        let action = ChannelAction::update(12, &entry);
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            serde_json::json!({
                "type": "update_entry",
                "idx": 12,
                "symbols": "payout",
                "amount": 70.0
            })
        );
        assert_eq!(action.kind(), "update_entry");
    }

    #[test]
    fn delete_entry_wire_shape() {
        let json = ChannelAction::delete(5).to_json().unwrap();
        assert_eq!(json, r#"{"type":"delete_entry","idx":5}"#);
        let back: ChannelAction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChannelAction::delete(5));
    }
}
