//! `ledger-sync`: keeps the local ledger consistent with the server.
//!
//! ```text
//!   caller ──► MutationCoordinator ──► ChannelHandle ──► channel task ──► server
//!                   │   (send or queue)        ▲                │
//!                   ▼                          │ init / sync    │
//!               LocalStore ◄───────────────────┴────────────────┘
//!                   ▲
//!                   └──── Reconciler (GET entries, periodic + on demand)
//! ```
//!
//! [`SyncService`] wires the pieces together and owns every spawned task.

pub mod channel;
pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod error;
pub mod protocol;
pub mod reconcile;
pub mod service;
pub mod task;

pub use channel::ChannelHandle;
pub use channel::ChannelManager;
pub use channel::ChannelState;
pub use channel::Delivery;
pub use config::SyncConfig;
pub use connectivity::Connectivity;
pub use connectivity::ConnectivityTracker;
pub use coordinator::MutationCoordinator;
pub use error::SyncError;
pub use reconcile::Reconciler;
pub use service::SyncService;
pub use task::Supervisor;
