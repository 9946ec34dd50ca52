// Free functions over a single `rusqlite::Connection` — the same split the
// teacher keeps between `db/queries.rs` (raw SQL) and `db/sqlite.rs` (the
// trait wiring, concurrency control).
//
// Nothing in this file knows about tokio; the async seam lives in `sqlite.rs`.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::models::{Account, Edge, ProfileInput};

/// Spec §4.2 — a single existence/insertion call must cover at most 512 DIDs.
pub const MAX_EXISTENCE_BATCH: usize = 512;

/// Look up existing `uid`s for a batch of DIDs, in the same order as `dids`
/// where found; DIDs not present in the store are simply absent from the
/// result (callers distinguish "missing" by length, as the original's
/// `_get_existent_dids` does via a plain list).
pub fn resolve_existing(conn: &Connection, dids: &[String]) -> Result<Vec<(String, i64)>> {
    anyhow::ensure!(
        dids.len() <= MAX_EXISTENCE_BATCH,
        "resolve_existing: batch of {} exceeds the {}-DID limit",
        dids.len(),
        MAX_EXISTENCE_BATCH
    );
    if dids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = std::iter::repeat("?")
        .take(dids.len())
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!("SELECT did, uid FROM account WHERE did IN ({placeholders})");
    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::ToSql> = dids.iter().map(|d| d as &dyn rusqlite::ToSql).collect();

    let rows = stmt
        .query_map(params.as_slice(), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to resolve existing DIDs")?;
    Ok(rows)
}

/// Batch lookup of `uid`s only, order not required (spec §4.2 `uids_for`).
pub fn uids_for(conn: &Connection, dids: &[String]) -> Result<Vec<i64>> {
    Ok(resolve_existing(conn, dids)?.into_iter().map(|(_, uid)| uid).collect())
}

/// Insert a batch of freshly-fetched profiles, returning their assigned uids
/// in the same order as `profiles`. Spec §4.2 — at most 512 rows per call.
///
/// Idempotent upsert keyed by `did`: a `did` already in the store keeps its
/// existing row untouched (its `uid`, fields, and `depth` are all left as
/// they were) and just has its `uid` looked back up — `insert_accounts`
/// never clobbers an existing row, matching
/// `original_source/pythonic/.../relationship.py`'s `INSERT OR IGNORE`.
pub fn insert_accounts(conn: &Connection, profiles: &[ProfileInput], depth: u32) -> Result<Vec<i64>> {
    anyhow::ensure!(
        profiles.len() <= MAX_EXISTENCE_BATCH,
        "insert_accounts: batch of {} exceeds the {}-row limit",
        profiles.len(),
        MAX_EXISTENCE_BATCH
    );

    let mut insert_stmt = conn.prepare(
        "INSERT INTO account (did, handle, nick, desc, followers, following, fetched, depth)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)
         ON CONFLICT(did) DO NOTHING
         RETURNING uid",
    )?;
    let mut select_stmt = conn.prepare("SELECT uid FROM account WHERE did = ?1")?;

    let mut uids = Vec::with_capacity(profiles.len());
    for profile in profiles {
        let inserted_uid: Option<i64> = insert_stmt
            .query_row(
                params![
                    profile.did,
                    profile.handle,
                    profile.nick,
                    profile.desc,
                    profile.followers,
                    profile.following,
                    depth,
                ],
                |row| row.get(0),
            )
            .optional()?;

        let uid = match inserted_uid {
            Some(uid) => uid,
            None => select_stmt
                .query_row(params![profile.did], |row| row.get(0))
                .with_context(|| format!("account row for {} vanished between insert and lookup", profile.did))?,
        };
        uids.push(uid);
    }
    Ok(uids)
}

/// Load a single account row by uid.
pub fn load_account(conn: &Connection, uid: i64) -> Result<Option<Account>> {
    conn.query_row(
        "SELECT uid, did, handle, nick, desc, followers, following, fetched, depth FROM account WHERE uid = ?1",
        [uid],
        |row| {
            Ok(Account {
                uid: row.get(0)?,
                did: row.get(1)?,
                handle: row.get(2)?,
                nick: row.get(3)?,
                desc: row.get(4)?,
                followers: row.get(5)?,
                following: row.get(6)?,
                fetched: row.get::<_, i64>(7)? != 0,
                depth: row.get::<_, i64>(8)? as u32,
            })
        },
    )
    .optional()
    .context("failed to load account")
}

/// Mark an account as fully expanded. The crawl engine calls this only after
/// all of an account's edges have been committed — the strict last write of
/// Phase 2 (spec §4.4).
pub fn mark_fetched(conn: &Connection, uid: i64) -> Result<()> {
    conn.execute("UPDATE account SET fetched = 1 WHERE uid = ?1", [uid])?;
    Ok(())
}

/// Insert directed follow edges, ignoring duplicates (spec §4.2 — edge
/// insertion is idempotent).
pub fn insert_edges(conn: &Connection, edges: &[Edge]) -> Result<()> {
    let mut stmt = conn.prepare("INSERT OR IGNORE INTO edge (from_uid, to_uid) VALUES (?1, ?2)")?;
    for edge in edges {
        stmt.execute(params![edge.from_uid, edge.to_uid])?;
    }
    Ok(())
}

/// All edges in the store, for the ranker's adjacency build.
pub fn all_edges(conn: &Connection) -> Result<Vec<Edge>> {
    let mut stmt = conn.prepare("SELECT from_uid, to_uid FROM edge")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Edge {
                from_uid: row.get(0)?,
                to_uid: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to load edges")?;
    Ok(rows)
}

/// All accounts in the store, for the ranker's vertex set and CSV output.
pub fn all_accounts(conn: &Connection) -> Result<Vec<Account>> {
    let mut stmt = conn.prepare(
        "SELECT uid, did, handle, nick, desc, followers, following, fetched, depth FROM account",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Account {
                uid: row.get(0)?,
                did: row.get(1)?,
                handle: row.get(2)?,
                nick: row.get(3)?,
                desc: row.get(4)?,
                followers: row.get(5)?,
                following: row.get(6)?,
                fetched: row.get::<_, i64>(7)? != 0,
                depth: row.get::<_, i64>(8)? as u32,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to load accounts")?;
    Ok(rows)
}

/// Count of accounts and edges, for the `status` command.
pub fn counts(conn: &Connection) -> Result<(i64, i64)> {
    let accounts: i64 = conn.query_row("SELECT COUNT(*) FROM account", [], |row| row.get(0))?;
    let edges: i64 = conn.query_row("SELECT COUNT(*) FROM edge", [], |row| row.get(0))?;
    Ok((accounts, edges))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::schema::create_tables;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn
    }

    #[test]
    fn insert_then_resolve_round_trips() {
        let conn = setup();
        let profiles = vec![ProfileInput {
            did: "did:plc:a".into(),
            handle: "a.bsky.social".into(),
            nick: "A".into(),
            desc: String::new(),
            followers: 10,
            following: 5,
        }];
        let uids = insert_accounts(&conn, &profiles, 0).unwrap();
        assert_eq!(uids.len(), 1);

        let resolved = resolve_existing(&conn, &["did:plc:a".to_string()]).unwrap();
        assert_eq!(resolved, vec![("did:plc:a".to_string(), uids[0])]);
    }

    #[test]
    fn resolve_existing_rejects_oversized_batch() {
        let conn = setup();
        let dids: Vec<String> = (0..=MAX_EXISTENCE_BATCH).map(|i| format!("did:plc:{i}")).collect();
        assert!(resolve_existing(&conn, &dids).is_err());
    }

    #[test]
    fn mark_fetched_flips_flag() {
        let conn = setup();
        let uids = insert_accounts(
            &conn,
            &[ProfileInput {
                did: "did:plc:a".into(),
                ..Default::default()
            }],
            0,
        )
        .unwrap();
        let uid = uids[0];
        assert!(!load_account(&conn, uid).unwrap().unwrap().fetched);
        mark_fetched(&conn, uid).unwrap();
        assert!(load_account(&conn, uid).unwrap().unwrap().fetched);
    }

    #[test]
    fn insert_edges_is_idempotent() {
        let conn = setup();
        let edges = vec![Edge { from_uid: 1, to_uid: 2 }];
        insert_edges(&conn, &edges).unwrap();
        insert_edges(&conn, &edges).unwrap();
        assert_eq!(all_edges(&conn).unwrap().len(), 1);
    }

    #[test]
    fn insert_accounts_never_clobbers_existing_row() {
        let conn = setup();
        let first = insert_accounts(
            &conn,
            &[ProfileInput {
                did: "did:plc:a".into(),
                handle: "a.bsky.social".into(),
                nick: "A".into(),
                desc: "original".into(),
                followers: 10,
                following: 5,
            }],
            2,
        )
        .unwrap();

        // A second insert for the same DID — as two concurrent expansions
        // discovering the same account would race into — must return the
        // same uid and leave every stored field (including depth) untouched.
        let second = insert_accounts(
            &conn,
            &[ProfileInput {
                did: "did:plc:a".into(),
                handle: "changed.bsky.social".into(),
                nick: "Changed".into(),
                desc: "overwritten?".into(),
                followers: 999,
                following: 999,
            }],
            7,
        )
        .unwrap();

        assert_eq!(first, second);
        let account = load_account(&conn, first[0]).unwrap().unwrap();
        assert_eq!(account.handle, "a.bsky.social");
        assert_eq!(account.desc, "original");
        assert_eq!(account.followers, 10);
        assert_eq!(account.following, 5);
        assert_eq!(account.depth, 2);
    }

    #[test]
    fn uids_for_returns_only_cached_uids() {
        let conn = setup();
        let uids = insert_accounts(
            &conn,
            &[ProfileInput { did: "did:plc:a".into(), ..Default::default() }],
            0,
        )
        .unwrap();
        let found = uids_for(&conn, &["did:plc:a".to_string(), "did:plc:missing".to_string()]).unwrap();
        assert_eq!(found, uids);
    }
}
