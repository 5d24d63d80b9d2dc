use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SyncError;

/// What a tab broadcasts to its siblings when local data changes (spec §4.5:
/// "a sibling tab notification carries the set of tables whose current
/// value may have changed").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TabNotification {
    pub origin_site_id: String,
    pub tables: Vec<String>,
}

/// A named broadcast channel shared by every sibling tab/process of one
/// node. In a browser this is a `BroadcastChannel`; here it's backed by
/// `tokio::sync::broadcast`, the in-process analogue for sibling tasks
/// rather than sibling OS processes.
#[async_trait]
pub trait BroadcastBus: Send + Sync {
    async fn publish(&self, notification: TabNotification) -> Result<(), SyncError>;
    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<TabNotification>;
    /// Release the channel (spec §4.5). Further `publish` calls are no-ops.
    fn close(&self);
}

/// `BroadcastBus` backed by a single shared `tokio::sync::broadcast::Sender`,
/// keyed by channel name so multiple independent buses can coexist in one
/// process (spec §4.5's `tabChannelName`).
pub struct LocalBroadcastBus {
    sender: tokio::sync::broadcast::Sender<TabNotification>,
    closed: std::sync::atomic::AtomicBool,
}

impl LocalBroadcastBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender, closed: std::sync::atomic::AtomicBool::new(false) }
    }
}

impl Default for LocalBroadcastBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl BroadcastBus for LocalBroadcastBus {
    async fn publish(&self, notification: TabNotification) -> Result<(), SyncError> {
        if self.closed.load(std::sync::atomic::Ordering::Acquire) {
            return Ok(());
        }
        // No receivers is not an error: a lone tab has nothing to tell.
        let _ = self.sender.send(notification);
        Ok(())
    }

    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<TabNotification> {
        self.sender.subscribe()
    }

    fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::Release);
    }
}

/// Publishes local-change notifications to sibling tabs and relays
/// sibling notifications onward, guarding against rebroadcasting a
/// notification this same tab just published (spec §4.5's tab-loop
/// prevention, generalized by the coordinator for all three sources).
pub struct TabSyncer<B: BroadcastBus> {
    bus: Arc<B>,
    site_id: String,
}

impl<B: BroadcastBus + 'static> TabSyncer<B> {
    pub fn new(bus: Arc<B>, site_id: String) -> Self {
        Self { bus, site_id }
    }

    pub async fn notify_tables_changed(&self, tables: HashSet<String>) -> Result<(), SyncError> {
        if tables.is_empty() {
            return Ok(());
        }
        debug!(count = tables.len(), "broadcasting table change to sibling tabs");
        self.bus
            .publish(TabNotification { origin_site_id: self.site_id.clone(), tables: tables.into_iter().collect() })
            .await
    }

    /// Release the tab channel (spec §4.5, §4.7).
    pub fn close(&self) {
        self.bus.close();
    }

    /// Spawn a task forwarding every inbound sibling notification (other
    /// than ones this tab itself published) to `on_remote_change`.
    pub fn spawn_listener<F>(&self, on_remote_change: F) -> tokio::task::JoinHandle<()>
    where
        F: Fn(HashSet<String>) + Send + Sync + 'static,
    {
        let mut rx = self.bus.subscribe();
        let own_site_id = self.site_id.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(notification) => {
                        if notification.origin_site_id == own_site_id {
                            continue;
                        }
                        on_remote_change(notification.tables.into_iter().collect());
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "tab broadcast listener lagged, notifications dropped");
                    }
                }
            }
        })
    }
}
