// SqliteCacheStore — rusqlite backend implementing CacheStore.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is
// !Send. Trait methods lock the mutex, do synchronous rusqlite work, and
// return; the lock is never held across an .await point, since MutexGuard
// is !Send and the borrow checker would refuse to compile it otherwise.
// Same shape as the teacher's `db/sqlite.rs`.

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::{Account, Edge, ProfileInput};
use super::{queries, schema, CacheStore};

pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

impl SqliteCacheStore {
    /// Open (or create) the cache file at `path`, running idempotent schema
    /// creation before returning.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Wrap an already-opened connection (used by tests with an in-memory
    /// database).
    pub fn from_connection(conn: Connection) -> Result<Self> {
        schema::create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        schema::table_count(&conn)
    }

    async fn resolve_existing(&self, dids: &[String]) -> Result<Vec<(String, i64)>> {
        let conn = self.conn.lock().await;
        queries::resolve_existing(&conn, dids)
    }

    async fn uids_for(&self, dids: &[String]) -> Result<Vec<i64>> {
        let conn = self.conn.lock().await;
        queries::uids_for(&conn, dids)
    }

    async fn insert_accounts(&self, profiles: &[ProfileInput], depth: u32) -> Result<Vec<i64>> {
        let conn = self.conn.lock().await;
        queries::insert_accounts(&conn, profiles, depth)
    }

    async fn load_account(&self, uid: i64) -> Result<Option<Account>> {
        let conn = self.conn.lock().await;
        queries::load_account(&conn, uid)
    }

    async fn mark_fetched(&self, uid: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::mark_fetched(&conn, uid)
    }

    async fn insert_edges(&self, edges: &[Edge]) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::insert_edges(&conn, edges)
    }

    async fn all_edges(&self) -> Result<Vec<Edge>> {
        let conn = self.conn.lock().await;
        queries::all_edges(&conn)
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn.lock().await;
        queries::all_accounts(&conn)
    }

    async fn counts(&self) -> Result<(i64, i64)> {
        let conn = self.conn.lock().await;
        queries::counts(&conn)
    }
}
