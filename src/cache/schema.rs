// Cache store schema — table creation, idempotent across runs.
//
// Same shape as the teacher's `db/schema.rs`: a `schema_version` table plus
// version-gated migrations, so the file is safe to open against a store
// produced by an older build of this crate.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all tables and indexes if they don't exist yet.
///
/// Idempotent — safe to call on every startup, including against a file
/// produced by a previous run (spec §4.2 "must be safe to open against an
/// existing file... schema creation is idempotent").
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS account (
            uid INTEGER PRIMARY KEY AUTOINCREMENT,
            did TEXT NOT NULL,
            handle TEXT NOT NULL,
            nick TEXT NOT NULL,
            desc TEXT NOT NULL,
            followers INTEGER NOT NULL,
            following INTEGER NOT NULL,
            fetched INTEGER NOT NULL,
            depth INTEGER NOT NULL DEFAULT 0
        );

        CREATE UNIQUE INDEX IF NOT EXISTS account_did_index ON account (did);
        CREATE INDEX IF NOT EXISTS account_handle_index ON account (handle);

        CREATE TABLE IF NOT EXISTS edge (
            from_uid INTEGER NOT NULL,
            to_uid INTEGER NOT NULL,
            PRIMARY KEY (from_uid, to_uid)
        );

        CREATE INDEX IF NOT EXISTS edge_to_uid_index ON edge (to_uid);
        ",
    )
    .context("failed to create cache store tables")?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    Ok(())
}

/// Count the number of user-created tables (useful for init confirmation).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}
