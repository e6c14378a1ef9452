//! Durable local state: the period map plus the pending-action queue.
//!
//! ## Layout
//!
//! ```text
//! <state_file>          {"entries": {...}, "pendingActions": [...]}
//! <state_file>.tmp      transient, renamed over <state_file> on every write
//! ```
//!
//! Every mutation is written through before the call returns. If the write
//! fails the in-memory state has still changed; the error is returned so the
//! caller can decide how loudly to complain.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::watch;

use crate::action::PendingAction;
use crate::model::LedgerEntry;
use crate::model::PeriodMap;

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("state file {} is unreadable: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
}

/// Everything that survives a restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub entries: PeriodMap,
    #[serde(default)]
    pub pending_actions: Vec<PendingAction>,
}

/// Owner of the period map and pending queue.
///
/// Cheap to share behind an `Arc`. The inner lock is never held across an
/// `.await`.
pub struct LocalStore {
    /// `None` keeps the store purely in memory.
    path: Option<PathBuf>,
    state: Mutex<PersistedState>,
    /// Bumped after every state change so readers can react.
    revision: watch::Sender<u64>,
}

impl LocalStore {
    /// Open the store at `path`, loading any previously persisted state.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let state = load_snapshot(&path)?;
        tracing::debug!(
            periods = state.entries.len(),
            pending = state.pending_actions.len(),
            "Loaded local state from {}",
            path.display()
        );
        Ok(Self::with_state(Some(path), state))
    }

    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self::with_state(None, PersistedState::default())
    }

    fn with_state(path: Option<PathBuf>, state: PersistedState) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            path,
            state: Mutex::new(state),
            revision,
        }
    }

    /// Location of the state file, if persisted.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, PersistedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to the state, then persist and notify subscribers.
    fn mutate<R>(&self, f: impl FnOnce(&mut PersistedState) -> R) -> Result<R, StoreError> {
        let mut state = self.lock();
        let out = f(&mut state);
        let written = self.write_through(&state);
        drop(state);
        self.revision.send_modify(|rev| *rev += 1);
        written.map(|()| out)
    }

    fn write_through(&self, state: &PersistedState) -> Result<(), StoreError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let json = serde_json::to_vec(state)?;
        atomic_write(path, &json)
    }

    // ── Reads ────────────────────────────────────────────────────────────

    /// Snapshot of the whole period map.
    pub fn entries(&self) -> PeriodMap {
        self.lock().entries.clone()
    }

    /// Entries of one period, in display order.
    pub fn entries_for(&self, period: &str) -> Vec<LedgerEntry> {
        self.lock()
            .entries
            .get(period)
            .map(<[LedgerEntry]>::to_vec)
            .unwrap_or_default()
    }

    /// Snapshot of the pending queue in FIFO order.
    pub fn pending(&self) -> Vec<PendingAction> {
        self.lock().pending_actions.clone()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending_actions.len()
    }

    /// Full persisted snapshot.
    pub fn snapshot(&self) -> PersistedState {
        self.lock().clone()
    }

    /// Receiver that observes a new revision after every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    // ── Writes ───────────────────────────────────────────────────────────

    /// Wholesale-replace the period map with an authoritative snapshot.
    pub fn replace_entries(&self, entries: PeriodMap) -> Result<(), StoreError> {
        self.mutate(|state| state.entries = entries)
    }

    /// Replace the entry with `row_idx` in `period`. Returns whether it existed.
    pub fn replace_entry(
        &self,
        period: &str,
        row_idx: u64,
        entry: LedgerEntry,
    ) -> Result<bool, StoreError> {
        self.mutate(|state| state.entries.replace_entry(period, row_idx, entry))
    }

    /// Remove the entry with `row_idx` from `period`. Returns whether it existed.
    pub fn remove_entry(&self, period: &str, row_idx: u64) -> Result<bool, StoreError> {
        self.mutate(|state| state.entries.remove_entry(period, row_idx))
    }

    /// Append an action to the pending queue. Returns the new queue length.
    pub fn enqueue(&self, action: PendingAction) -> Result<usize, StoreError> {
        self.mutate(|state| {
            state.pending_actions.push(action);
            state.pending_actions.len()
        })
    }

    /// Remove and return every queued action, oldest first.
    pub fn take_pending(&self) -> Result<Vec<PendingAction>, StoreError> {
        self.mutate(|state| std::mem::take(&mut state.pending_actions))
    }
}

/// Read a persisted state file without taking ownership of it.
///
/// A missing file is an empty state. Used on startup and by processes that
/// only need to observe the foreground's queue.
pub fn load_snapshot(path: &Path) -> Result<PersistedState, StoreError> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(PersistedState::default());
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&data).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Atomically write `data` to `path` via a `.tmp` sibling.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
