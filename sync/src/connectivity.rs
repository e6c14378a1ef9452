use tokio::sync::watch;

/// Whether the app believes it can reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(self) -> bool {
        self == Self::Online
    }
}

/// Shared connectivity flag written by the channel and the reconciler.
///
/// Starts [`Connectivity::Offline`]; subscribers only wake on actual changes.
#[derive(Debug, Clone)]
pub struct ConnectivityTracker {
    tx: watch::Sender<Connectivity>,
}

impl ConnectivityTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Connectivity::Offline);
        Self { tx }
    }

    pub fn get(&self) -> Connectivity {
        *self.tx.borrow()
    }

    pub fn set(&self, value: Connectivity) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
        if changed {
            tracing::info!("connectivity: {value:?}");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityTracker {
    fn default() -> Self {
        Self::new()
    }
}
