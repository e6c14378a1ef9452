//! Channel wire format.
//!
//! Inbound frames are `{"type": ..., "data": ...}`. Only `init` (sent once per
//! connection) and `sync` (broadcast after any server-side change) carry
//! state; every other type is acknowledged and dropped.

use ledger_store::PeriodMap;
use serde::Deserialize;
use serde_json::Value;

/// Application-level keep-alive frame. The server answers with `pong`.
pub const PING_FRAME: &str = r#"{"type":"ping"}"#;

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Full authoritative snapshot (`init` or `sync`).
    Snapshot { kind: SnapshotKind, data: PeriodMap },
    /// Any other message type, carried for logging only.
    Ignored { kind: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Init,
    Sync,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame is not a JSON envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("'{kind}' frame without data")]
    MissingData { kind: String },

    #[error("'{kind}' frame carries an invalid snapshot: {source}")]
    InvalidSnapshot {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Decode one text frame.
pub fn parse_server_message(text: &str) -> Result<ServerMessage, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(ProtocolError::Envelope)?;
    let kind = match envelope.kind.as_str() {
        "init" => SnapshotKind::Init,
        "sync" => SnapshotKind::Sync,
        _ => {
            return Ok(ServerMessage::Ignored {
                kind: envelope.kind,
            });
        }
    };
    let Some(data) = envelope.data else {
        return Err(ProtocolError::MissingData {
            kind: envelope.kind,
        });
    };
    let data = serde_json::from_value(data).map_err(|source| ProtocolError::InvalidSnapshot {
        kind: envelope.kind,
        source,
    })?;
    Ok(ServerMessage::Snapshot { kind, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_store::LedgerEntry;
    use pretty_assertions::assert_eq;

    #[test]
    fn init_and_sync_carry_snapshots() {
        let text = r#"{"type":"init","data":{"2025-03":[{"date":"02.03.2025","symbols":"Acme","amount":120.0,"row_idx":4}]}}"#;
        let ServerMessage::Snapshot { kind, data } = parse_server_message(text).unwrap() else {
            panic!("expected snapshot");
        };
        assert_eq!(kind, SnapshotKind::Init);
        assert_eq!(
            data.get("2025-03").unwrap(),
            &[LedgerEntry::revenue("02.03.2025", "Acme", 120.0).with_row_idx(4)]
        );

        let sync = parse_server_message(r#"{"type":"sync","data":{}}"#).unwrap();
        assert_eq!(
            sync,
            ServerMessage::Snapshot {
                kind: SnapshotKind::Sync,
                data: PeriodMap::new(),
            }
        );
    }

    #[test]
    fn other_types_are_ignored() {
        for kind in ["pong", "entry_added", "entry_updated", "entry_deleted"] {
            let text = format!(r#"{{"type":"{kind}","data":{{"row_idx":1}}}}"#);
            assert_eq!(
                parse_server_message(&text).unwrap(),
                ServerMessage::Ignored {
                    kind: kind.to_string()
                }
            );
        }
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(matches!(
            parse_server_message("not json"),
            Err(ProtocolError::Envelope(_))
        ));
        assert!(matches!(
            parse_server_message(r#"{"type":"sync"}"#),
            Err(ProtocolError::MissingData { .. })
        ));
        assert!(matches!(
            parse_server_message(r#"{"type":"sync","data":{"2025-01":[{"date":"01.01.2025"}]}}"#),
            Err(ProtocolError::InvalidSnapshot { .. })
        ));
    }
}
