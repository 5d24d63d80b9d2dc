pub mod change;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod peer;
pub mod schema;
pub mod site;
pub mod tab;
pub mod transport;
pub mod ui;

pub use change::Change;
pub use config::EngineConfig;
pub use coordinator::Coordinator;
pub use db::DatabaseConnection;
pub use error::SyncError;
pub use peer::{PeerRole, PeerSyncer};
pub use site::SiteId;
pub use tab::{BroadcastBus, LocalBroadcastBus, TabSyncer};
pub use transport::{LoopbackTransport, Message, Transport};
pub use ui::{Repo, RepoDefinition, RepoHandle, UiSyncer};
