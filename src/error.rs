use thiserror::Error;

/// Errors surfaced by the sync engine.
///
/// Propagation follows spec §7: errors from local writes reach the caller;
/// errors observed while applying a remote batch fail the whole batch so the
/// peer resends on its next pull; errors inside refresh/inbound handlers are
/// logged at the call site and never propagate here.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid state: {0}")]
    State(&'static str),

    #[error("transport not ready")]
    TransportNotReady,

    #[error("merge rejected: {0}")]
    MergeRejected(&'static str),

    #[error("decode failure: {0}")]
    DecodeFailure(String),

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("blocking task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}
