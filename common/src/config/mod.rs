/// Layered configuration for the ledger binaries.
///
/// Sources, lowest priority first:
/// 1. Defaults (from code)
/// 2. Config file (`ledger.toml`)
/// 3. Environment variables (`LEDGER_*` prefix, `__` for nesting)
///
/// ```no_run
/// use ledger_common::config::ConfigLoader;
///
/// let config = ConfigLoader::load_default().expect("Failed to load config");
/// println!("syncing against {}", config.server.origin);
/// ```
pub mod error;
pub mod loader;
pub mod validator;

pub use error::ConfigError;
pub use error::Result;
pub use loader::CacheConfig;
pub use loader::ConfigLoader;
pub use loader::LedgerConfig;
pub use loader::ServerConfig;
pub use loader::StoreConfig;
pub use loader::SyncSettings;
pub use validator::validate;
