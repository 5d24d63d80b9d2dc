use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::change::{Change, ChangeKey};
use crate::db::{DatabaseConnection, TrackedDirection};
use crate::error::SyncError;
use crate::transport::{Message, Transport};

/// Connection lifecycle of one peer link (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Disconnected,
    Connecting,
    Syncing,
    Steady,
    Closed,
}

/// Which side of the handshake this node plays with this peer. A server
/// answers `pull` requests restricted to rows it didn't receive from the
/// requester (spec §4.4 `handlePull`); a client has no such obligation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Client,
    Server,
}

/// What happened as a result of handling one inbound message, for the
/// coordinator to route onward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    HandshakeStarted,
    TablesChanged(HashSet<String>),
    Noop,
}

/// Drives one peer connection: handshake, batched push of local changes,
/// and application of inbound updates (spec §4.3, §4.4).
pub struct PeerSyncer<T: Transport> {
    db: DatabaseConnection,
    transport: Arc<T>,
    role: PeerRole,
    peer_id: Mutex<Option<String>>,
    state: Mutex<PeerState>,
    pending_push: Mutex<HashMap<ChangeKey, Change>>,
    push_scheduled: AtomicBool,
    first_update_handled: AtomicBool,
}

impl<T: Transport + 'static> PeerSyncer<T> {
    pub fn new(db: DatabaseConnection, transport: T, role: PeerRole) -> Arc<Self> {
        Arc::new(Self {
            db,
            transport: Arc::new(transport),
            role,
            peer_id: Mutex::new(None),
            state: Mutex::new(PeerState::Disconnected),
            pending_push: Mutex::new(HashMap::new()),
            push_scheduled: AtomicBool::new(false),
            first_update_handled: AtomicBool::new(false),
        })
    }

    pub async fn state(&self) -> PeerState {
        *self.state.lock().await
    }

    /// Transport became ready: send the handshake and kick off push+pull
    /// (spec §4.3: "on connect, send `connected`, then push pending local
    /// changes, then pull").
    pub async fn on_connected(&self) -> Result<PeerEvent, SyncError> {
        *self.state.lock().await = PeerState::Connecting;
        let version = self.db.get_version().await?;
        self.transport
            .send(Message::Connected { site_id: self.db.site_id().as_str().to_string(), version })
            .await?;
        *self.state.lock().await = PeerState::Syncing;
        let peer_id = self.peer_id.lock().await.clone().unwrap_or_default();
        self.push_changes_since_tracked(&peer_id).await?;
        self.flush_push().await?;
        self.request_pull().await?;
        Ok(PeerEvent::HandshakeStarted)
    }

    async fn request_pull(&self) -> Result<(), SyncError> {
        let peer_id = self.peer_id.lock().await.clone().unwrap_or_default();
        let since = self.db.last_tracked_version_for(&peer_id, TrackedDirection::Received).await?;
        self.transport.send(Message::Pull { version: since }).await
    }

    /// Queue every locally-originated change since the last version we're
    /// known to have pushed to `peer_id` (spec §4.4 connected step 3:
    /// "push changesSince(lastTrackedVersionFor(siteId, sent))"). Lets a
    /// peer link catch a node up automatically on connect rather than
    /// relying on a caller to have queued pre-connection writes by hand.
    async fn push_changes_since_tracked(&self, peer_id: &str) -> Result<(), SyncError> {
        let since = self.db.last_tracked_version_for(peer_id, TrackedDirection::Sent).await?;
        let changes = self.db.client_changes_since(since).await?;
        if changes.is_empty() {
            return Ok(());
        }
        let mut pending = self.pending_push.lock().await;
        for change in changes {
            pending.insert(change.key(), change);
        }
        Ok(())
    }

    /// Queue a locally-originated change for push, coalescing bursts of
    /// synchronous writes into a single batch the way a microtask-scheduled
    /// flush would on a single-threaded event loop (spec §4.3).
    pub async fn queue_change(self: Arc<Self>, change: Change) {
        self.pending_push.lock().await.insert(change.key(), change);
        if !self.push_scheduled.swap(true, Ordering::AcqRel) {
            let this = self.clone();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                this.push_scheduled.store(false, Ordering::Release);
                if let Err(e) = this.flush_push().await {
                    warn!(error = %e, "scheduled push flush failed");
                }
            });
        }
    }

    async fn flush_push(&self) -> Result<(), SyncError> {
        if !self.transport.is_ready() {
            return Ok(());
        }
        let batch: Vec<Change> = {
            let mut pending = self.pending_push.lock().await;
            pending.drain().map(|(_, v)| v).collect()
        };
        if batch.is_empty() {
            return Ok(());
        }
        let max_version = batch.iter().map(|c| c.db_version).max().unwrap_or(0);
        let site_id = self.db.site_id().as_str().to_string();
        debug!(count = batch.len(), "pushing batch to peer");
        self.transport
            .send(Message::Update { site_id, version: max_version, changes: batch })
            .await?;
        let peer_id = self.peer_id.lock().await.clone().unwrap_or_default();
        self.db.insert_tracked_peer(&peer_id, max_version, TrackedDirection::Sent).await?;
        Ok(())
    }

    /// Dispatch one inbound message (spec §4.4).
    pub async fn handle_message(&self, message: Message) -> Result<PeerEvent, SyncError> {
        match message {
            Message::Connected { site_id, version } => {
                *self.peer_id.lock().await = Some(site_id.clone());
                *self.state.lock().await = PeerState::Syncing;
                info!(peer = %site_id, peer_version = version, "peer handshake received");
                self.push_changes_since_tracked(&site_id).await?;
                self.flush_push().await?;
                self.request_pull().await?;
                Ok(PeerEvent::HandshakeStarted)
            }
            Message::Update { site_id, version, changes } => {
                if changes.is_empty() {
                    return Ok(PeerEvent::Noop);
                }
                // First update of this connection's lifetime: bulk-load when
                // this node has no local data yet, merge otherwise (spec
                // §4.4: "hasData = getVersion() > 0").
                let is_first = !self.first_update_handled.swap(true, Ordering::AcqRel);
                let touched = if is_first && self.db.get_version().await? == 0 {
                    self.db.bulk_load(changes).await?
                } else {
                    self.db.merge(changes).await?
                };
                self.db.insert_tracked_peer(&site_id, version, TrackedDirection::Received).await?;
                *self.state.lock().await = PeerState::Steady;
                let own_id = self.db.site_id().as_str().to_string();
                self.transport.send(Message::Ack { site_id: own_id, version }).await?;
                if touched.is_empty() {
                    Ok(PeerEvent::Noop)
                } else {
                    Ok(PeerEvent::TablesChanged(touched))
                }
            }
            Message::Pull { version } => {
                if self.role != PeerRole::Server {
                    return Ok(PeerEvent::Noop);
                }
                let peer_id = self.peer_id.lock().await.clone().unwrap_or_default();
                let changes = self.db.changes_since_excluding(version, &peer_id).await?;
                if !changes.is_empty() {
                    let max_version = changes.iter().map(|c| c.db_version).max().unwrap_or(0);
                    let own_id = self.db.site_id().as_str().to_string();
                    self.transport
                        .send(Message::Update { site_id: own_id, version: max_version, changes })
                        .await?;
                }
                Ok(PeerEvent::Noop)
            }
            Message::Ack { site_id, version } => {
                self.db.insert_tracked_peer(&site_id, version, TrackedDirection::Sent).await?;
                Ok(PeerEvent::Noop)
            }
            Message::Unknown => {
                debug!("ignoring unrecognized message type from peer");
                Ok(PeerEvent::Noop)
            }
        }
    }

    pub async fn close(&self) {
        *self.state.lock().await = PeerState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::transport::LoopbackTransport;

    async fn db_with_todos(site: &str) -> DatabaseConnection {
        let config = EngineConfig { site_id_override: Some(site.to_string()), ..EngineConfig::default() };
        let db = DatabaseConnection::open_in_memory(&config).unwrap();
        db.apply_local_write(|tx| {
            tx.execute("CREATE TABLE todos (id TEXT PRIMARY KEY, text TEXT NOT NULL)", [])?;
            Ok(())
        })
        .await
        .unwrap();
        db.enroll_table("todos").await.unwrap();
        db
    }

    async fn recv_timeout(rx: &mut tokio::sync::mpsc::Receiver<Message>) -> Option<Message> {
        tokio::time::timeout(std::time::Duration::from_millis(200), rx.recv())
            .await
            .unwrap_or(None)
    }

    #[tokio::test]
    async fn push_then_pull_converges_two_peers() {
        let db_a = db_with_todos("site-a").await;
        let db_b = db_with_todos("site-b").await;

        db_a.apply_local_write(|tx| {
            tx.execute("INSERT INTO todos(id, text) VALUES ('1', 'from-a')", [])?;
            Ok(())
        })
        .await
        .unwrap();

        let (mut handles_a, mut handles_b) = LoopbackTransport::pair();
        let peer_a = PeerSyncer::new(db_a.clone(), handles_a.transport, PeerRole::Client);
        let peer_b = PeerSyncer::new(db_b.clone(), handles_b.transport, PeerRole::Server);

        for change in db_a.changes_since(0).await.unwrap() {
            peer_a.clone().queue_change(change).await;
        }
        peer_a.on_connected().await.unwrap();

        while let Some(msg) = recv_timeout(&mut handles_b.inbound).await {
            peer_b.handle_message(msg).await.unwrap();
        }
        while let Some(msg) = recv_timeout(&mut handles_a.inbound).await {
            peer_a.handle_message(msg).await.unwrap();
        }

        let replicated: String = {
            let changes = db_b.changes_since(0).await.unwrap();
            changes
                .iter()
                .find(|c| c.cid == "text")
                .and_then(|c| c.val.as_ref())
                .and_then(|v| v.as_str())
                .unwrap()
                .to_string()
        };
        assert_eq!(replicated, "from-a");
    }

    #[tokio::test]
    async fn duplicate_queued_changes_coalesce_into_one_batched_update() {
        let db = db_with_todos("site-a").await;
        let (handles_a, mut handles_b) = LoopbackTransport::pair();
        let peer = PeerSyncer::new(db, handles_a.transport, PeerRole::Client);

        fn make_change(pk_index: usize, val: &str) -> Change {
            Change {
                table: "todos".into(),
                pk: crate::change::pk_to_hex(&format!("row-{pk_index}")),
                cid: "text".into(),
                val: Some(serde_json::json!(val)),
                col_version: 1,
                db_version: 1,
                site_id: "site-a".into(),
                cl: 1,
                seq: 0,
            }
        }

        // 90 distinct rows, plus 10 more writes that land on the first 10
        // rows again (same table/pk/cid/db_version/site_id key) before the
        // scheduled flush runs.
        for i in 0..90 {
            peer.clone().queue_change(make_change(i, "first")).await;
        }
        for i in 0..10 {
            peer.clone().queue_change(make_change(i, "overwritten")).await;
        }

        let message = recv_timeout(&mut handles_b.inbound).await.expect("expected one batched update");
        match message {
            Message::Update { changes, .. } => assert_eq!(changes.len(), 90),
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(recv_timeout(&mut handles_b.inbound).await.is_none(), "only one update should have been sent");
    }
}
