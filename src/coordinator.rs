use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::change::Change;
use crate::db::DatabaseConnection;
use crate::error::SyncError;
use crate::tab::{BroadcastBus, TabSyncer};
use crate::transport::Transport;
use crate::ui::UiSyncer;
use crate::peer::PeerSyncer;

/// Which part of the system a table-change notification originated from.
/// Used purely to decide where *not* to route it back to, so a change
/// doesn't bounce forever between the tab bus, the peer link, and the UI
/// layer that caused it (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Ui,
    Tab,
    Peer,
}

/// One row of the fan-out routing table: for a change originating at
/// `source`, which downstream actions fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    RefreshUi,
    NotifyTab,
    PushPeer,
}

/// `UI` writes refresh the UI, notify sibling tabs, and push to peers.
/// `TAB` notifications (another tab already wrote and told us) only refresh
/// the UI — re-broadcasting would loop, and this process's peer link
/// already belongs to whichever tab owns it.
/// `PEER` updates refresh the UI and notify sibling tabs, but are never
/// pushed back out to a peer (that peer already has them; this is the
/// tab-loop / peer-loop guard spec §4.7 calls for, generalized to all
/// three sources instead of just the tab case).
const ROUTING_TABLE: &[(Source, &[Action])] = &[
    (Source::Ui, &[Action::RefreshUi, Action::NotifyTab, Action::PushPeer]),
    (Source::Tab, &[Action::RefreshUi]),
    (Source::Peer, &[Action::RefreshUi, Action::NotifyTab]),
];

fn actions_for(source: Source) -> &'static [Action] {
    ROUTING_TABLE
        .iter()
        .find(|(s, _)| *s == source)
        .map(|(_, actions)| *actions)
        .unwrap_or(&[])
}

/// Ties the database, UI syncer, tab syncer, and peer syncers together:
/// whenever one of them reports that tables changed, the coordinator
/// decides which of the others need to hear about it (spec §4.7).
pub struct Coordinator<B: BroadcastBus, T: Transport + 'static> {
    db: DatabaseConnection,
    ui: UiSyncer,
    tab: TabSyncer<B>,
    peers: Arc<parking_lot::Mutex<Vec<Arc<PeerSyncer<T>>>>>,
}

impl<B: BroadcastBus + 'static, T: Transport + 'static> Coordinator<B, T> {
    pub fn new(db: DatabaseConnection, ui: UiSyncer, tab: TabSyncer<B>) -> Self {
        Self { db, ui, tab, peers: Arc::new(parking_lot::Mutex::new(Vec::new())) }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn ui(&self) -> &UiSyncer {
        &self.ui
    }

    pub fn add_peer(&self, peer: Arc<PeerSyncer<T>>) {
        self.peers.lock().push(peer);
    }

    /// Shut down the tab channel (spec §4.7).
    pub fn close(&self) {
        self.tab.close();
    }

    /// Call after a local write. `changes` are the rows the write's
    /// triggers just logged, used to feed each peer's push queue.
    pub async fn on_local_write(&self, tables: HashSet<String>, changes: Vec<Change>) -> Result<(), SyncError> {
        self.dispatch(Source::Ui, tables, changes).await
    }

    /// Call with the set of tables touched by applying an inbound peer
    /// update (the `HashSet` `DatabaseConnection::merge` returns).
    pub async fn on_peer_update(&self, tables: HashSet<String>) -> Result<(), SyncError> {
        self.dispatch(Source::Peer, tables, Vec::new()).await
    }

    /// Call from the tab broadcast listener when a sibling tab reports a
    /// change.
    pub async fn on_tab_notification(&self, tables: HashSet<String>) -> Result<(), SyncError> {
        self.dispatch(Source::Tab, tables, Vec::new()).await
    }

    async fn dispatch(&self, source: Source, tables: HashSet<String>, changes: Vec<Change>) -> Result<(), SyncError> {
        if tables.is_empty() {
            return Ok(());
        }
        debug!(?source, count = tables.len(), "routing table change");
        for action in actions_for(source) {
            match action {
                Action::RefreshUi => self.ui.refresh_for_tables(&tables),
                Action::NotifyTab => self.tab.notify_tables_changed(tables.clone()).await?,
                Action::PushPeer => {
                    let peers = self.peers.lock().clone();
                    for peer in peers {
                        for change in &changes {
                            peer.clone().queue_change(change.clone()).await;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
