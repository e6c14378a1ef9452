//! `ledger-store`: the locally held ledger and its pending-action queue.
//!
//! The store is the single owner of two pieces of state:
//! - the **period map**: every known [`LedgerEntry`] grouped by `YYYY-MM`
//! - the **pending queue**: [`PendingAction`]s recorded while no channel was
//!   available, replayed in FIFO order once one opens
//!
//! Both are persisted together as one JSON blob so they survive restarts.
//!
//! ```text
//! {
//!   "entries":        { "2025-01": [ { "date": "01.01.2025", ... } ] },
//!   "pendingActions": [ { "type": "delete_entry", "idx": 7 } ]
//! }
//! ```

pub mod action;
pub mod model;
pub mod persistence;

pub use action::ChannelAction;
pub use action::PendingAction;
pub use model::EntryValue;
pub use model::LedgerEntry;
pub use model::ModelError;
pub use model::PeriodMap;
pub use model::period_key_for_date;
pub use persistence::LocalStore;
pub use persistence::PersistedState;
pub use persistence::StoreError;
pub use persistence::load_snapshot;

/// Default filename of the persisted state blob.
pub const STATE_FILENAME: &str = "ledger-state.json";
