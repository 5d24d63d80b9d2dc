use rusqlite::Connection;

use crate::error::SyncError;

/// The five CRDT bookkeeping tables plus their indexes (spec §4.1, §6).
///
/// `crdt_tracked_peers` stores `(site_id, tag, event) -> version`; `tag`
/// names the tracked quantity (currently always `"db_version"`, left
/// open for future bookkeeping categories) and `event` is the direction,
/// `"sent"` or `"received"` (spec §3's `{sent, received}` tags).
///
/// `crdt_merge_guard` is a supplement (not named by spec.md): a single-row
/// flag triggers check via a `WHEN` clause so that `DatabaseConnection::merge`
/// can suppress trigger firing for the duration of a merge without relying
/// on any engine-specific "disable triggers" pragma, which SQLite doesn't have.
const CORE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS crdt_site_id (
    site_id TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS crdt_db_version (
    v INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS crdt_changes (
    table_name  TEXT NOT NULL,
    pk          TEXT NOT NULL,
    cid         TEXT NOT NULL,
    val,
    col_version INTEGER NOT NULL,
    db_version  INTEGER NOT NULL,
    site_id     TEXT NOT NULL,
    cl          INTEGER NOT NULL DEFAULT 1,
    seq         INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (table_name, pk, cid, db_version, site_id)
);

CREATE INDEX IF NOT EXISTS idx_crdt_changes_db_version ON crdt_changes(db_version);
CREATE INDEX IF NOT EXISTS idx_crdt_changes_site_id ON crdt_changes(site_id, db_version);

CREATE TABLE IF NOT EXISTS crdt_tracked_peers (
    site_id TEXT NOT NULL,
    tag     TEXT NOT NULL,
    event   TEXT NOT NULL,
    version INTEGER NOT NULL,
    PRIMARY KEY (site_id, tag, event)
);

CREATE TABLE IF NOT EXISTS crdt_merge_guard (
    active INTEGER NOT NULL
);
"#;

/// Ensure the CRDT bookkeeping tables, indexes, and seed rows exist. Safe to
/// call on every open (spec §4.1: "on first opening a database...").
pub fn ensure_core_tables(conn: &Connection) -> Result<(), SyncError> {
    conn.execute_batch(CORE_SCHEMA_SQL)?;
    conn.execute(
        "INSERT INTO crdt_db_version(v) SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM crdt_db_version)",
        [],
    )?;
    conn.execute(
        "INSERT INTO crdt_merge_guard(active) SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM crdt_merge_guard)",
        [],
    )?;
    Ok(())
}

/// A user table's introspected shape: every column in declared order, and
/// the subset (in primary-key position order) that makes up its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
    pub pk_columns: Vec<String>,
}

impl TableSchema {
    pub fn non_pk_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| !self.pk_columns.contains(c))
            .map(|c| c.as_str())
            .collect()
    }
}

/// Read `PRAGMA table_info` to discover the live column list and primary
/// key, replacing the single-`id` placeholder spec.md §9 calls out as
/// incomplete in the source this system was distilled from.
pub fn introspect_table(conn: &Connection, table: &str) -> Result<TableSchema, SyncError> {
    validate_identifier(table)?;

    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    // PRAGMA table_info columns: cid, name, type, notnull, dflt_value, pk
    // `pk` is 0 when the column is not part of the primary key, else its
    // 1-based position within a composite key — exactly the ordering we need.
    let mut rows = stmt.query([])?;

    let mut columns = Vec::new();
    let mut pk_positions: Vec<(i64, String)> = Vec::new();
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        let pk_pos: i64 = row.get(5)?;
        if pk_pos > 0 {
            pk_positions.push((pk_pos, name.clone()));
        }
        columns.push(name);
    }

    if columns.is_empty() {
        return Err(SyncError::State("table not found or has no columns"));
    }
    pk_positions.sort_by_key(|(pos, _)| *pos);
    let pk_columns: Vec<String> = pk_positions.into_iter().map(|(_, name)| name).collect();
    if pk_columns.is_empty() {
        return Err(SyncError::State("table has no primary key"));
    }

    Ok(TableSchema {
        name: table.to_string(),
        columns,
        pk_columns,
    })
}

/// Install the insert/update/delete triggers described in spec §4.1 for
/// `table`, parameterized on its introspected columns. Idempotent
/// (`CREATE TRIGGER IF NOT EXISTS`).
pub fn enroll_table(conn: &Connection, table: &str) -> Result<(), SyncError> {
    let schema = introspect_table(conn, table)?;
    let sql = generate_triggers(&schema);
    conn.execute_batch(&sql)?;
    Ok(())
}

fn generate_triggers(schema: &TableSchema) -> String {
    let table = quote_ident(&schema.name);
    let pk_expr_new = pk_hex_expr(&schema.pk_columns, "NEW");
    let pk_expr_old = pk_hex_expr(&schema.pk_columns, "OLD");
    let non_pk = schema.non_pk_columns();

    let mut sql = String::new();

    // Insert trigger: bump db_version once, one change row per non-pk column.
    sql.push_str(&format!(
        "CREATE TRIGGER IF NOT EXISTS trg_{name}_insert AFTER INSERT ON {table}\n\
         WHEN (SELECT active FROM crdt_merge_guard) = 0\n\
         BEGIN\n\
         UPDATE crdt_db_version SET v = v + 1;\n",
        name = schema.name,
        table = table,
    ));
    for col in &non_pk {
        sql.push_str(&format!(
            "INSERT INTO crdt_changes(table_name, pk, cid, val, col_version, db_version, site_id, cl, seq)\n\
             VALUES ('{table_name}', {pk}, '{col}', NEW.{col_q}, 1, (SELECT v FROM crdt_db_version), (SELECT site_id FROM crdt_site_id LIMIT 1), 1, 0);\n",
            table_name = schema.name,
            pk = pk_expr_new,
            col = col,
            col_q = quote_ident(col),
        ));
    }
    sql.push_str("END;\n\n");

    // Update trigger: bump db_version once, one conditional change row per changed column.
    sql.push_str(&format!(
        "CREATE TRIGGER IF NOT EXISTS trg_{name}_update AFTER UPDATE ON {table}\n\
         WHEN (SELECT active FROM crdt_merge_guard) = 0\n\
         BEGIN\n\
         UPDATE crdt_db_version SET v = v + 1;\n",
        name = schema.name,
        table = table,
    ));
    for col in &non_pk {
        let col_q = quote_ident(col);
        sql.push_str(&format!(
            "INSERT INTO crdt_changes(table_name, pk, cid, val, col_version, db_version, site_id, cl, seq)\n\
             SELECT '{table_name}', {pk}, '{col}', NEW.{col_q},\n\
             1 + COALESCE((SELECT MAX(col_version) FROM crdt_changes WHERE table_name = '{table_name}' AND pk = {pk} AND cid = '{col}'), 0),\n\
             (SELECT v FROM crdt_db_version), (SELECT site_id FROM crdt_site_id LIMIT 1), 1, 0\n\
             WHERE NEW.{col_q} IS NOT OLD.{col_q};\n",
            table_name = schema.name,
            pk = pk_expr_new,
            col = col,
            col_q = col_q,
        ));
    }
    sql.push_str("END;\n\n");

    // Delete trigger: bump db_version once, single tombstone row whose
    // col_version dominates every per-column version for this pk (spec §3
    // invariant: a tombstone only wins once its (col_version, site_id) beats
    // every column's).
    sql.push_str(&format!(
        "CREATE TRIGGER IF NOT EXISTS trg_{name}_delete AFTER DELETE ON {table}\n\
         WHEN (SELECT active FROM crdt_merge_guard) = 0\n\
         BEGIN\n\
         UPDATE crdt_db_version SET v = v + 1;\n\
         INSERT INTO crdt_changes(table_name, pk, cid, val, col_version, db_version, site_id, cl, seq)\n\
         VALUES (\n\
         '{table_name}', {pk}, '-1', NULL,\n\
         1 + COALESCE((SELECT MAX(col_version) FROM crdt_changes WHERE table_name = '{table_name}' AND pk = {pk}), 0),\n\
         (SELECT v FROM crdt_db_version), (SELECT site_id FROM crdt_site_id LIMIT 1), 1, 0\n\
         );\n\
         END;\n",
        name = schema.name,
        table = table,
        table_name = schema.name,
        pk = pk_expr_old,
    ));

    sql
}

/// SQL expression that computes the hex-encoded primary key for a row
/// referenced by `alias` (`NEW` or `OLD`), matching `change::encode_composite_pk`.
fn pk_hex_expr(pk_columns: &[String], alias: &str) -> String {
    if pk_columns.len() == 1 {
        format!("hex(CAST({}.{} AS TEXT))", alias, quote_ident(&pk_columns[0]))
    } else {
        let parts: Vec<String> = pk_columns
            .iter()
            .map(|c| format!("CAST({}.{} AS TEXT)", alias, quote_ident(c)))
            .collect();
        format!("hex({})", parts.join(" || char(30) || "))
    }
}

pub(crate) fn validate_identifier(name: &str) -> Result<(), SyncError> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        || name.chars().next().unwrap().is_ascii_digit()
    {
        return Err(SyncError::State("invalid table or column identifier"));
    }
    Ok(())
}

/// Double-quote a validated identifier (SQLite accepts `"..."` identifier
/// quoting). Internal quotes are doubled per SQL convention.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_todos() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure_core_tables(&conn).unwrap();
        conn.execute(
            "CREATE TABLE todos (id TEXT PRIMARY KEY, completed INTEGER NOT NULL, text TEXT NOT NULL)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO crdt_site_id(site_id) VALUES ('SELF')",
            [],
        )
        .unwrap();
        enroll_table(&conn, "todos").unwrap();
        conn
    }

    #[test]
    fn introspects_single_column_primary_key() {
        let conn = setup_todos();
        let schema = introspect_table(&conn, "todos").unwrap();
        assert_eq!(schema.pk_columns, vec!["id".to_string()]);
        assert_eq!(schema.non_pk_columns(), vec!["completed", "text"]);
    }

    #[test]
    fn introspects_composite_primary_key_in_declared_order() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE memberships (org TEXT, user TEXT, role TEXT, PRIMARY KEY (user, org))",
            [],
        )
        .unwrap();
        let schema = introspect_table(&conn, "memberships").unwrap();
        assert_eq!(schema.pk_columns, vec!["user".to_string(), "org".to_string()]);
    }

    #[test]
    fn insert_bumps_db_version_and_logs_one_row_per_column() {
        let conn = setup_todos();
        conn.execute(
            "INSERT INTO todos(id, completed, text) VALUES ('a', 0, 'x')",
            [],
        )
        .unwrap();

        let version: i64 = conn.query_row("SELECT v FROM crdt_db_version", [], |r| r.get(0)).unwrap();
        assert_eq!(version, 1);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM crdt_changes WHERE table_name = 'todos'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn update_only_logs_changed_columns() {
        let conn = setup_todos();
        conn.execute("INSERT INTO todos(id, completed, text) VALUES ('a', 0, 'x')", []).unwrap();
        conn.execute("UPDATE todos SET text = 'y' WHERE id = 'a'", []).unwrap();

        let version: i64 = conn.query_row("SELECT v FROM crdt_db_version", [], |r| r.get(0)).unwrap();
        assert_eq!(version, 2);

        let text_versions: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM crdt_changes WHERE table_name = 'todos' AND cid = 'text'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(text_versions, 2);

        let completed_versions: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM crdt_changes WHERE table_name = 'todos' AND cid = 'completed'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(completed_versions, 1);
    }

    #[test]
    fn delete_logs_single_tombstone_dominating_column_versions() {
        let conn = setup_todos();
        conn.execute("INSERT INTO todos(id, completed, text) VALUES ('a', 0, 'x')", []).unwrap();
        conn.execute("DELETE FROM todos WHERE id = 'a'", []).unwrap();

        let tombstone_version: i64 = conn
            .query_row(
                "SELECT col_version FROM crdt_changes WHERE table_name = 'todos' AND cid = '-1'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert!(tombstone_version > 1);
    }

    #[test]
    fn triggers_do_not_fire_while_merge_guard_is_active() {
        let conn = setup_todos();
        conn.execute("UPDATE crdt_merge_guard SET active = 1", []).unwrap();
        conn.execute("INSERT INTO todos(id, completed, text) VALUES ('a', 0, 'x')", []).unwrap();

        let version: i64 = conn.query_row("SELECT v FROM crdt_db_version", [], |r| r.get(0)).unwrap();
        assert_eq!(version, 0);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM crdt_changes", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
