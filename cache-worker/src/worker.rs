//! Lifecycle and event handlers of the cache worker.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use bytes::Bytes;
use ledger_common::LedgerConfig;
use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::SYNC_TAG;
use crate::background_sync::BackgroundSync;
use crate::background_sync::SyncReport;
use crate::error::CacheError;
use crate::error::Result;
use crate::fetch::FetchRequest;
use crate::fetch::FetchResponse;
use crate::fetch::Fetcher;
use crate::notification::LogNotifier;
use crate::notification::Notification;
use crate::notification::NotificationRequest;
use crate::notification::Notifier;
use crate::storage::CacheStorage;

/// Control message asking the worker to display a notification.
pub const SHOW_NOTIFICATION: &str = "SHOW_NOTIFICATION";

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Name of the current cache generation.
    pub version: String,
    /// Origin whose responses may be cached.
    pub origin: Url,
    /// Shell resources fetched at install time.
    pub precache: Vec<String>,
    /// Path markers that bypass the cache.
    pub passthrough: Vec<String>,
    /// Endpoint background sync POSTs to.
    pub sync_url: Url,
    /// The foreground's state file, read during background sync.
    pub state_file: PathBuf,
}

impl WorkerSettings {
    pub fn from_ledger(config: &LedgerConfig) -> Result<Self> {
        let settings_err = |e: ledger_common::ConfigError| CacheError::Settings(e.to_string());
        Ok(Self {
            version: config.cache.version.clone(),
            origin: config.server.origin_url().map_err(settings_err)?,
            precache: config.cache.precache.clone(),
            passthrough: config.cache.passthrough.clone(),
            sync_url: config
                .server
                .endpoint(&config.server.sync_path)
                .map_err(settings_err)?,
            state_file: config.store.state_file.clone(),
        })
    }
}

/// The app windows the worker controls.
pub trait Clients: Send + Sync {
    /// Take control of every open client without waiting for a reload.
    fn claim(&self);
    /// Focus or open a window at `url`.
    fn open_window(&self, url: &Url) -> Result<()>;
}

/// Clients served through the system browser.
#[derive(Debug, Default)]
pub struct BrowserClients {
    claimed: AtomicBool,
}

impl BrowserClients {
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }
}

impl Clients for BrowserClients {
    fn claim(&self) {
        self.claimed.store(true, Ordering::SeqCst);
        tracing::debug!("clients claimed");
    }

    fn open_window(&self, url: &Url) -> Result<()> {
        webbrowser::open(url.as_str()).map_err(|e| CacheError::Window {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

pub struct CacheWorker {
    settings: WorkerSettings,
    storage: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
    notifier: Arc<dyn Notifier>,
    clients: Arc<dyn Clients>,
    background_sync: BackgroundSync,
}

impl CacheWorker {
    pub fn new(settings: WorkerSettings, storage: CacheStorage, fetcher: Arc<dyn Fetcher>) -> Self {
        let background_sync = BackgroundSync::new(
            Arc::clone(&fetcher),
            settings.sync_url.clone(),
            settings.state_file.clone(),
        );
        Self {
            settings,
            storage,
            fetcher,
            notifier: Arc::new(LogNotifier),
            clients: Arc::new(BrowserClients::default()),
            background_sync,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clients(mut self, clients: Arc<dyn Clients>) -> Self {
        self.clients = clients;
        self
    }

    pub fn with_background_sync(mut self, background_sync: BackgroundSync) -> Self {
        self.background_sync = background_sync;
        self
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    /// Fill the current cache with the app shell. Any failed resource fails
    /// the install. Activation may follow immediately.
    pub async fn install(&self) -> Result<()> {
        let cache = self.storage.open(&self.settings.version).await?;
        for resource in &self.settings.precache {
            let url = self
                .settings
                .origin
                .join(resource)
                .map_err(|e| CacheError::Install {
                    resource: resource.clone(),
                    reason: e.to_string(),
                })?;
            let response = self
                .fetcher
                .fetch(FetchRequest::get(url.clone()))
                .await
                .map_err(|e| CacheError::Install {
                    resource: resource.clone(),
                    reason: e.to_string(),
                })?;
            if !response.is_ok() {
                return Err(CacheError::Install {
                    resource: resource.clone(),
                    reason: format!("status {}", response.status),
                });
            }
            cache.put(&url, &response).await?;
        }
        tracing::info!(
            version = %self.settings.version,
            resources = self.settings.precache.len(),
            "installed; skipping wait"
        );
        Ok(())
    }

    /// Drop every cache from other versions and take over open clients.
    /// Returns the names of the deleted caches.
    pub async fn activate(&self) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        for name in self.storage.keys().await? {
            if name != self.settings.version {
                self.storage.delete(&name).await?;
                tracing::info!("deleted stale cache {name}");
                deleted.push(name);
            }
        }
        self.clients.claim();
        tracing::info!(version = %self.settings.version, "activated");
        Ok(deleted)
    }

    fn is_passthrough(&self, url: &Url) -> bool {
        let path = url.path();
        self.settings
            .passthrough
            .iter()
            .any(|marker| path.contains(marker.as_str()))
    }

    fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.settings.origin.origin()
    }

    /// Answer one intercepted request.
    pub async fn handle_fetch(&self, request: FetchRequest) -> FetchResponse {
        if self.is_passthrough(&request.url) {
            let url = request.url.to_string();
            return match self.fetcher.fetch(request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!("{url} unreachable, answering offline: {e}");
                    offline_response()
                }
            };
        }

        if request.method != Method::GET {
            return self.network_or_unavailable(request).await;
        }

        let url = request.url.clone();
        let cache = match self.storage.open(&self.settings.version).await {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!("cache unavailable: {e}");
                None
            }
        };
        if let Some(cache) = &cache {
            match cache.lookup(&url).await {
                Ok(Some(hit)) => {
                    tracing::trace!("cache hit {url}");
                    return hit;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("cache lookup failed for {url}: {e}"),
            }
        }

        let response = self.network_or_unavailable(request).await;
        if let Some(cache) = &cache
            && response.is_ok()
            && self.is_same_origin(&url)
            && let Err(e) = cache.put(&url, &response).await
        {
            tracing::warn!("failed to cache {url}: {e}");
        }
        response
    }

    async fn network_or_unavailable(&self, request: FetchRequest) -> FetchResponse {
        match self.fetcher.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("{e}");
                FetchResponse::text(503, "Service Unavailable")
            }
        }
    }

    /// Show a notification for a push event.
    pub fn handle_push(&self, payload: Option<Bytes>) -> Notification {
        let notification =
            NotificationRequest::from_push_payload(payload.as_deref()).into_notification();
        self.notifier.show(&notification);
        notification
    }

    /// Close the clicked notification and open its URL.
    pub fn handle_notification_click(&self, notification: &Notification) -> Result<()> {
        self.notifier.close(&notification.tag);
        let url = self
            .settings
            .origin
            .join(&notification.url)
            .map_err(|e| CacheError::Window {
                url: notification.url.clone(),
                reason: e.to_string(),
            })?;
        self.clients.open_window(&url)
    }

    /// Handle a control message. Only `SHOW_NOTIFICATION` is understood.
    pub fn handle_message(&self, message: &Value) -> Option<Notification> {
        if message.get("type").and_then(Value::as_str) != Some(SHOW_NOTIFICATION) {
            tracing::debug!("ignoring control message {message}");
            return None;
        }
        let request: NotificationRequest = match serde_json::from_value(message.clone()) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("malformed {SHOW_NOTIFICATION} message: {e}");
                return None;
            }
        };
        let notification = request.into_notification();
        self.notifier.show(&notification);
        Some(notification)
    }

    /// Handle a background sync event. Unknown tags are ignored.
    pub async fn handle_sync(&self, tag: &str) -> Result<Option<SyncReport>> {
        if tag != SYNC_TAG {
            tracing::debug!("ignoring sync tag {tag}");
            return Ok(None);
        }
        self.background_sync.run().await.map(Some)
    }
}

/// Synthesized answer for API traffic while offline.
pub fn offline_response() -> FetchResponse {
    FetchResponse::json(200, &serde_json::json!({"error": "offline"}))
}
