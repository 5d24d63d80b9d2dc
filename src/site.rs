use rand::RngCore;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::SyncError;

/// Stable per-node identifier, generated once and persisted in
/// `crdt_site_id`. Never mutated for the lifetime of the database file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteId(String);

impl SiteId {
    /// 16 random bytes, hex-encoded. Collision probability is negligible at
    /// any realistic fleet size and authentication of peers is an explicit
    /// non-goal, so no registry or coordination is needed at generation time.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        SiteId(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SiteId {
    fn from(s: String) -> Self {
        SiteId(s)
    }
}

impl std::fmt::Display for SiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Load the persisted site id, generating and persisting a fresh one on
/// first run. Idempotent: safe to call on every open.
pub fn load_or_create(conn: &Connection) -> Result<SiteId, SyncError> {
    let existing: Option<String> = conn
        .query_row("SELECT site_id FROM crdt_site_id LIMIT 1", [], |r| r.get(0))
        .optional()?;

    if let Some(id) = existing {
        return Ok(SiteId(id));
    }

    let fresh = SiteId::generate();
    conn.execute(
        "INSERT INTO crdt_site_id(site_id) VALUES (?1)",
        params![fresh.as_str()],
    )?;
    Ok(fresh)
}
