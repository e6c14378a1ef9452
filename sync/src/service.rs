//! The sync engine as one explicit, injectable service object.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use ledger_store::LedgerEntry;
use ledger_store::LocalStore;
use tokio::sync::Notify;
use tokio::sync::watch;

use crate::channel::ChannelHandle;
use crate::channel::ChannelManager;
use crate::channel::Delivery;
use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::connectivity::ConnectivityTracker;
use crate::coordinator::MutationCoordinator;
use crate::error::Result;
use crate::error::SyncError;
use crate::reconcile::Reconciler;
use crate::task::Supervisor;

/// Owns the channel, the reconciliation loop, and every task they spawn.
///
/// ```no_run
/// # async fn demo(config: ledger_sync::SyncConfig) -> Result<(), ledger_sync::SyncError> {
/// use std::sync::Arc;
/// use ledger_store::{LedgerEntry, LocalStore};
///
/// let store = Arc::new(LocalStore::open("/tmp/ledger-state.json")?);
/// let service = ledger_sync::SyncService::new(config, store)?;
/// service.connect();
/// let _ = service.start_session().await;
/// service.add_entry(LedgerEntry::revenue("01.03.2025", "Acme", 120.0));
/// service.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct SyncService {
    config: SyncConfig,
    store: Arc<LocalStore>,
    connectivity: ConnectivityTracker,
    channel: ChannelHandle,
    reconciler: Arc<Reconciler>,
    coordinator: MutationCoordinator,
    supervisor: Supervisor,
    reconcile_kick: Arc<Notify>,
    connected: AtomicBool,
    session_started: AtomicBool,
}

impl SyncService {
    pub fn new(config: SyncConfig, store: Arc<LocalStore>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| SyncError::Http {
                url: config.entries_url.to_string(),
                source,
            })?;
        let connectivity = ConnectivityTracker::new();
        let channel = ChannelHandle::new();
        let supervisor = Supervisor::new();
        let reconciler = Arc::new(Reconciler::new(
            client,
            config.entries_url.clone(),
            Arc::clone(&store),
            connectivity.clone(),
        ));
        let coordinator = MutationCoordinator::new(
            channel.clone(),
            Arc::clone(&store),
            Arc::clone(&reconciler),
            supervisor.clone(),
            config.post_add_reconcile_delay,
        );
        Ok(Self {
            config,
            store,
            connectivity,
            channel,
            reconciler,
            coordinator,
            supervisor,
            reconcile_kick: Arc::new(Notify::new()),
            connected: AtomicBool::new(false),
            session_started: AtomicBool::new(false),
        })
    }

    /// Start the channel task. Later calls are no-ops.
    pub fn connect(&self) {
        if self.supervisor.is_shutting_down() || self.connected.swap(true, Ordering::SeqCst) {
            return;
        }
        let manager = ChannelManager {
            url: self.config.channel_url.clone(),
            reconnect_delay: self.config.reconnect_delay,
            ping_interval: self.config.ping_interval,
            handle: self.channel.clone(),
            store: Arc::clone(&self.store),
            connectivity: self.connectivity.clone(),
            reconcile_kick: Arc::clone(&self.reconcile_kick),
        };
        self.supervisor.spawn("channel", |cancel| manager.run(cancel));
    }

    /// Pull once, then keep reconciling every `reconcile_interval` and on
    /// every channel open. Returns the result of the initial pull; the
    /// periodic loop starts either way, and only once.
    pub async fn start_session(&self) -> Result<()> {
        let initial = self.reconciler.pull().await;
        if let Err(e) = &initial {
            tracing::warn!("initial reconciliation failed: {e}");
        }
        if !self.supervisor.is_shutting_down() && !self.session_started.swap(true, Ordering::SeqCst)
        {
            let reconciler = Arc::clone(&self.reconciler);
            self.supervisor.spawn_periodic(
                "reconcile",
                self.config.reconcile_interval,
                Arc::clone(&self.reconcile_kick),
                move || {
                    let reconciler = Arc::clone(&reconciler);
                    async move {
                        if let Err(e) = reconciler.pull().await {
                            tracing::debug!("periodic reconciliation failed: {e}");
                        }
                    }
                },
            );
        }
        initial
    }

    pub fn add_entry(&self, entry: LedgerEntry) -> Delivery {
        self.coordinator.add_entry(entry)
    }

    pub fn update_entry(&self, period: &str, row_idx: u64, entry: LedgerEntry) -> Delivery {
        self.coordinator.update_entry(period, row_idx, entry)
    }

    pub fn delete_entry(&self, period: &str, row_idx: u64) -> Delivery {
        self.coordinator.delete_entry(period, row_idx)
    }

    /// One reconciliation pull on demand.
    pub async fn sync_data(&self) -> Result<()> {
        self.reconciler.pull().await
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity.get()
    }

    pub fn subscribe_connectivity(&self) -> watch::Receiver<Connectivity> {
        self.connectivity.subscribe()
    }

    pub fn channel(&self) -> &ChannelHandle {
        &self.channel
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Cancel every loop and wait until all of them have returned.
    pub async fn shutdown(&self) {
        tracing::debug!("sync service shutting down");
        self.supervisor.shutdown().await;
        tracing::info!(pending = self.store.pending_len(), "sync service stopped");
    }
}
