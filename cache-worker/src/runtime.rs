//! Event loop that owns the worker.
//!
//! Everything reaches the worker as a [`WorkerEvent`]. Lifecycle events run
//! one at a time on the loop; fetches and sync events run as tasks so a slow
//! origin never blocks the rest. The loop ends once every [`WorkerHandle`] is
//! dropped, after in-flight tasks finish.
//!
//! The loop also remembers every notification it has shown, keyed by tag, so
//! a later click can be resolved to the notification's URL.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::task::JoinSet;

use crate::background_sync::SyncReport;
use crate::error::CacheError;
use crate::error::Result;
use crate::fetch::FetchRequest;
use crate::fetch::FetchResponse;
use crate::notification::Notification;
use crate::worker::CacheWorker;

const EVENT_BUFFER: usize = 64;

#[derive(Debug)]
pub enum WorkerEvent {
    Install {
        reply: oneshot::Sender<Result<()>>,
    },
    Activate {
        reply: oneshot::Sender<Result<Vec<String>>>,
    },
    Fetch {
        request: FetchRequest,
        reply: oneshot::Sender<FetchResponse>,
    },
    Push {
        payload: Option<Bytes>,
    },
    /// Click on the showing notification with `tag`.
    NotificationClick {
        tag: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Message {
        data: Value,
    },
    Sync {
        tag: String,
        reply: oneshot::Sender<Result<Option<SyncReport>>>,
    },
}

/// Start the event loop for `worker`.
pub fn spawn(worker: CacheWorker) -> (WorkerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let handle = tokio::spawn(run(Arc::new(worker), rx));
    (WorkerHandle { tx }, handle)
}

async fn run(worker: Arc<CacheWorker>, mut rx: mpsc::Receiver<WorkerEvent>) {
    let mut tasks = JoinSet::new();
    let mut shown = HashMap::new();
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => dispatch(&worker, event, &mut tasks, &mut shown).await,
                None => break,
            },
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!("worker task failed: {e}");
                }
            }
        }
    }
    while tasks.join_next().await.is_some() {}
    tracing::debug!("worker event loop stopped");
}

async fn dispatch(
    worker: &Arc<CacheWorker>,
    event: WorkerEvent,
    tasks: &mut JoinSet<()>,
    shown: &mut HashMap<String, Notification>,
) {
    match event {
        WorkerEvent::Install { reply } => {
            let _ = reply.send(worker.install().await);
        }
        WorkerEvent::Activate { reply } => {
            let _ = reply.send(worker.activate().await);
        }
        WorkerEvent::Fetch { request, reply } => {
            let worker = Arc::clone(worker);
            tasks.spawn(async move {
                let _ = reply.send(worker.handle_fetch(request).await);
            });
        }
        WorkerEvent::Push { payload } => {
            let notification = worker.handle_push(payload);
            shown.insert(notification.tag.clone(), notification);
        }
        WorkerEvent::NotificationClick { tag, reply } => {
            let result = match shown.remove(&tag) {
                Some(notification) => worker.handle_notification_click(&notification),
                None => Err(CacheError::UnknownNotification(tag)),
            };
            if let Err(e) = &result {
                tracing::warn!("notification click failed: {e}");
            }
            let _ = reply.send(result);
        }
        WorkerEvent::Message { data } => {
            if let Some(notification) = worker.handle_message(&data) {
                shown.insert(notification.tag.clone(), notification);
            }
        }
        WorkerEvent::Sync { tag, reply } => {
            let worker = Arc::clone(worker);
            tasks.spawn(async move {
                let result = worker.handle_sync(&tag).await;
                if let Err(e) = &result {
                    tracing::warn!("background sync '{tag}' failed: {e}");
                }
                let _ = reply.send(result);
            });
        }
    }
}

/// Cloneable sender side of the event loop.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<WorkerEvent>,
}

impl WorkerHandle {
    async fn send(&self, event: WorkerEvent) -> Result<()> {
        self.tx.send(event).await.map_err(|_| CacheError::Stopped)
    }

    async fn request<T>(&self, event: impl FnOnce(oneshot::Sender<T>) -> WorkerEvent) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(event(reply)).await?;
        rx.await.map_err(|_| CacheError::Stopped)
    }

    pub async fn install(&self) -> Result<()> {
        self.request(|reply| WorkerEvent::Install { reply }).await?
    }

    pub async fn activate(&self) -> Result<Vec<String>> {
        self.request(|reply| WorkerEvent::Activate { reply }).await?
    }

    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        self.request(|reply| WorkerEvent::Fetch { request, reply }).await
    }

    pub async fn push(&self, payload: Option<Bytes>) -> Result<()> {
        self.send(WorkerEvent::Push { payload }).await
    }

    /// Click the showing notification with `tag`: close it and open its URL.
    pub async fn notification_click(&self, tag: impl Into<String>) -> Result<()> {
        let tag = tag.into();
        self.request(|reply| WorkerEvent::NotificationClick { tag, reply })
            .await?
    }

    pub async fn post_message(&self, data: Value) -> Result<()> {
        self.send(WorkerEvent::Message { data }).await
    }

    /// Fire a sync event and wait for its outcome.
    pub async fn sync(&self, tag: impl Into<String>) -> Result<Option<SyncReport>> {
        let tag = tag.into();
        self.request(|reply| WorkerEvent::Sync { tag, reply }).await?
    }
}
