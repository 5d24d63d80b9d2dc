use serde::Deserialize;

/// Tunables for one `DatabaseConnection` / engine instance.
///
/// This crate is a library embedded into a host application rather than a
/// standalone service, so there is no composition-root `main.rs` to load
/// this from a file the way `andrebassi-edgeproxy` loads `Config` from the
/// environment — callers construct it directly or via `Default`.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Named broadcast channel shared by sibling tabs/processes of this
    /// node (spec §4.5).
    pub tab_channel_name: String,

    /// Max rows returned per `changesSince`/push batch read. Not specified
    /// by spec.md; bounds memory use when a peer has fallen far behind.
    pub push_batch_limit: i64,

    /// Overrides site id generation; intended for tests that need
    /// deterministic, human-readable site ids.
    pub site_id_override: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tab_channel_name: "sync-engine".to_string(),
            push_batch_limit: 1000,
            site_id_override: None,
        }
    }
}
