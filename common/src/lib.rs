//! Shared plumbing for the ledger binaries: layered configuration and the
//! tracing bootstrap.

pub mod config;
pub mod logging;

pub use config::ConfigError;
pub use config::ConfigLoader;
pub use config::LedgerConfig;
