use crate::config::error::ConfigError;
use crate::config::error::Result;
use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Root configuration shared by the sync engine and the cache worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Where the ledger server lives.
    #[serde(default)]
    pub server: ServerConfig,

    /// Channel and reconciliation timing.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Local state persistence.
    #[serde(default)]
    pub store: StoreConfig,

    /// Background cache process.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Server endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Origin the app is served from (e.g. `https://ledger.example.com`).
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Real-time channel path.
    #[serde(default = "default_channel_path")]
    pub channel_path: String,

    /// Full snapshot resource.
    #[serde(default = "default_entries_path")]
    pub entries_path: String,

    /// Background-sync replay endpoint.
    #[serde(default = "default_sync_path")]
    pub sync_path: String,
}

/// Timing of the channel manager and reconciliation loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Delay between a channel close and the next connection attempt.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Period of the full-snapshot pull while a session is active.
    #[serde(default = "default_reconcile_interval_ms")]
    pub reconcile_interval_ms: u64,

    /// Delay between sending `add_entry` and pulling the server-assigned row.
    #[serde(default = "default_post_add_reconcile_delay_ms")]
    pub post_add_reconcile_delay_ms: u64,

    /// Application-level ping period. Disabled when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping_interval_ms: Option<u64>,

    /// Timeout applied to every HTTP request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Local persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the persisted `{entries, pendingActions}` blob.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

/// Background cache process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Name of the current cache generation.
    #[serde(default = "default_cache_version")]
    pub version: String,

    /// Root directory holding one subdirectory per named cache.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Shell resources stored at install time.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Path markers that bypass the cache (API and channel traffic).
    #[serde(default = "default_passthrough")]
    pub passthrough: Vec<String>,

    /// Address the proxy front end listens on.
    #[serde(default = "default_listen")]
    pub listen: String,
}

// Default value functions
fn default_origin() -> String {
    "http://127.0.0.1:8000".to_string()
}
fn default_channel_path() -> String {
    "/ws".to_string()
}
fn default_entries_path() -> String {
    "/api/entries".to_string()
}
fn default_sync_path() -> String {
    "/api/sync".to_string()
}
fn default_reconnect_delay_ms() -> u64 {
    3000
}
fn default_reconcile_interval_ms() -> u64 {
    5000
}
fn default_post_add_reconcile_delay_ms() -> u64 {
    500
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ledger")
}
fn default_state_file() -> PathBuf {
    default_data_dir().join("ledger-state.json")
}
fn default_cache_version() -> String {
    "ledger-v1.0.0".to_string()
}
fn default_cache_dir() -> PathBuf {
    default_data_dir().join("cache")
}
fn default_precache() -> Vec<String> {
    vec![
        "/".to_string(),
        "/index.html".to_string(),
        "/manifest.webmanifest".to_string(),
    ]
}
fn default_passthrough() -> Vec<String> {
    vec!["/api/".to_string(), "/ws".to_string()]
}
fn default_listen() -> String {
    "127.0.0.1:8787".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            channel_path: default_channel_path(),
            entries_path: default_entries_path(),
            sync_path: default_sync_path(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            reconcile_interval_ms: default_reconcile_interval_ms(),
            post_add_reconcile_delay_ms: default_post_add_reconcile_delay_ms(),
            ping_interval_ms: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: default_cache_version(),
            dir: default_cache_dir(),
            precache: default_precache(),
            passthrough: default_passthrough(),
            listen: default_listen(),
        }
    }
}

impl ServerConfig {
    /// Parsed origin URL.
    pub fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.origin)
            .map_err(|e| ConfigError::ValidationError(format!("server.origin: {e}")))
    }

    /// Absolute URL of `path` on the origin.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.origin_url()?
            .join(path)
            .map_err(|e| ConfigError::ValidationError(format!("endpoint {path}: {e}")))
    }
}

impl SyncSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    pub fn post_add_reconcile_delay(&self) -> Duration {
        Duration::from_millis(self.post_add_reconcile_delay_ms)
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        self.ping_interval_ms.map(Duration::from_millis)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Configuration loader with layered merging support
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration with layered merging:
    /// 1. Start with defaults (from Default implementations)
    /// 2. Merge config file if provided
    /// 3. Override with environment variables (LEDGER_ prefix)
    pub fn load(&self) -> Result<LedgerConfig> {
        let mut builder = Config::builder();

        // Defaults are serialized to JSON and loaded as the base layer.
        let defaults_json = serde_json::to_string(&LedgerConfig::default())?;
        builder = builder.add_source(File::from_str(&defaults_json, config::FileFormat::Json));

        if let Some(ref path) = self.config_path {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_ref()));
            } else {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
        }

        // Example: LEDGER_SYNC__RECONNECT_DELAY_MS=1000
        builder = builder.add_source(
            Environment::with_prefix("LEDGER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("cache.precache")
                .with_list_parse_key("cache.passthrough"),
        );

        let config: LedgerConfig = builder.build()?.try_deserialize()?;
        crate::config::validator::validate(&config)?;
        Ok(config)
    }

    /// Locate the default config file in standard locations:
    /// 1. Current directory: ./ledger.toml
    /// 2. XDG config: ~/.config/ledger/config.toml
    /// 3. Home directory: ~/.ledger.toml
    pub fn find_config_file() -> Option<PathBuf> {
        let cwd_config = PathBuf::from("./ledger.toml");
        if cwd_config.exists() {
            return Some(cwd_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("ledger").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".ledger.toml");
            if home_config.exists() {
                return Some(home_config);
            }
        }

        None
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<LedgerConfig> {
        let loader = match Self::find_config_file() {
            Some(config_path) => ConfigLoader::new().with_file(config_path),
            None => ConfigLoader::new(),
        };
        loader.load()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
