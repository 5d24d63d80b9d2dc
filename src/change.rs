use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Column identifier sentinel marking a row tombstone (spec §3).
pub const TOMBSTONE_CID: &str = "-1";

/// Record separator used to join composite primary-key column values before
/// hex-encoding. Chosen because it cannot appear in ordinary text input and
/// SQLite has no native tuple type to carry this losslessly for us.
const PK_PART_SEP: u8 = 0x1E;

/// One row of the append-only CRDT change log (spec §3).
///
/// Primary key is `(table, pk, cid, db_version, site_id)`. `val` is absent
/// for tombstones (`cid == TOMBSTONE_CID`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Change {
    pub table: String,
    pub pk: String,
    pub cid: String,
    pub val: Option<serde_json::Value>,
    pub col_version: i64,
    pub db_version: i64,
    pub site_id: String,
    pub cl: i64,
    pub seq: i64,
}

impl Change {
    pub fn is_tombstone(&self) -> bool {
        self.cid == TOMBSTONE_CID
    }

    /// Key used for push-queue deduplication and change-log lookups;
    /// mirrors the row's own primary key (spec §3, §8 property 4).
    pub fn key(&self) -> ChangeKey {
        ChangeKey {
            table: self.table.clone(),
            pk: self.pk.clone(),
            cid: self.cid.clone(),
            db_version: self.db_version,
            site_id: self.site_id.clone(),
        }
    }

    /// `(col_version, site_id)` ordering key used by the LWW merge rule
    /// (spec §4.2): greater tuple wins, ties broken by site id.
    pub fn version_key(&self) -> (i64, &str) {
        (self.col_version, self.site_id.as_str())
    }

    /// The 9-tuple wire shape from spec §6.
    pub fn to_wire_tuple(
        &self,
    ) -> (
        String,
        String,
        String,
        Option<serde_json::Value>,
        i64,
        i64,
        String,
        i64,
        i64,
    ) {
        (
            self.table.clone(),
            self.pk.clone(),
            self.cid.clone(),
            self.val.clone(),
            self.col_version,
            self.db_version,
            self.site_id.clone(),
            self.cl,
            self.seq,
        )
    }

    pub fn from_wire_tuple(
        tuple: (
            String,
            String,
            String,
            Option<serde_json::Value>,
            i64,
            i64,
            String,
            i64,
            i64,
        ),
    ) -> Self {
        Change {
            table: tuple.0,
            pk: tuple.1,
            cid: tuple.2,
            val: tuple.3,
            col_version: tuple.4,
            db_version: tuple.5,
            site_id: tuple.6,
            cl: tuple.7,
            seq: tuple.8,
        }
    }
}

/// Deduplication / lookup key mirroring `Change`'s own primary key. Kept
/// separate from `Change` because `Change::val` carries a `serde_json::Value`
/// which does not implement `Hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeKey {
    pub table: String,
    pub pk: String,
    pub cid: String,
    pub db_version: i64,
    pub site_id: String,
}

/// Hex-encode a single primary-key column value.
pub fn pk_to_hex(pk: &str) -> String {
    hex::encode(pk.as_bytes())
}

/// Reverse of `pk_to_hex` for a single-column key.
pub fn hex_to_pk(hex_str: &str) -> Result<String, SyncError> {
    let bytes = hex::decode(hex_str).map_err(|e| SyncError::DecodeFailure(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| SyncError::DecodeFailure(e.to_string()))
}

/// Hex-encode a composite primary key: the part values are joined with an
/// ASCII record separator, in the column order the table declares them,
/// then the whole joined byte string is hex-encoded (spec §4 SPEC_FULL
/// composite primary-key supplement).
pub fn encode_composite_pk(parts: &[String]) -> String {
    let mut joined = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            joined.push(PK_PART_SEP);
        }
        joined.extend_from_slice(part.as_bytes());
    }
    hex::encode(joined)
}

/// Reverse of `encode_composite_pk`.
pub fn decode_composite_pk(hex_str: &str) -> Result<Vec<String>, SyncError> {
    let bytes = hex::decode(hex_str).map_err(|e| SyncError::DecodeFailure(e.to_string()))?;
    bytes
        .split(|b| *b == PK_PART_SEP)
        .map(|part| String::from_utf8(part.to_vec()).map_err(|e| SyncError::DecodeFailure(e.to_string())))
        .collect()
}
