//! `ledger-cache-worker`: the background cache process.
//!
//! Sits between the app and its origin: serves the app shell from a
//! versioned on-disk cache, lets API and channel traffic through with an
//! offline fallback, shows push notifications, and replays queued actions
//! when a background sync fires.
//!
//! The worker never shares memory with the foreground. It talks through
//! [`runtime::WorkerEvent`] messages and shares only two things on disk: the
//! cache directory (owned here) and the foreground's state file (read only).

pub mod background_sync;
pub mod error;
pub mod fetch;
pub mod notification;
pub mod proxy;
pub mod runtime;
pub mod storage;
pub mod worker;

pub use error::CacheError;
pub use fetch::FetchError;
pub use fetch::FetchRequest;
pub use fetch::FetchResponse;
pub use fetch::Fetcher;
pub use fetch::HttpFetcher;
pub use runtime::WorkerEvent;
pub use runtime::WorkerHandle;
pub use storage::CacheStorage;
pub use worker::CacheWorker;
pub use worker::WorkerSettings;

/// Background sync tag that replays the pending queue.
pub const SYNC_TAG: &str = "sync-data";
