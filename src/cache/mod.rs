// Cache Store (C2) — the durable local key-value store for accounts and
// the follow graph (spec §4.2).
//
// `CacheStore` is the backend-agnostic async interface; `SqliteCacheStore`
// is the only implementor for now. The split mirrors the teacher's
// `db/traits.rs` + `db/sqlite.rs` pair — the trait exists so callers
// (crawl engine, ranker) depend on `Arc<dyn CacheStore>`, not a concrete
// rusqlite connection.

mod models;
mod queries;
mod schema;
mod sqlite;

pub use models::{Account, Edge, ProfileInput};
pub use queries::MAX_EXISTENCE_BATCH;
pub use sqlite::SqliteCacheStore;

use anyhow::Result;
use async_trait::async_trait;

/// Backend-agnostic interface over the cache store's Account and Edge
/// tables (spec §3 data model, §4.2 operations).
///
/// Implementations must uphold the single-writer-many-reader contract:
/// writes are serialized, and a caller never observes a partially-written
/// account/edge set — each write method commits its work before returning.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Number of user tables present (used by the `status` command and by
    /// tests asserting `create_tables` ran).
    async fn table_count(&self) -> Result<i64>;

    /// Resolve which of up to 512 DIDs already have a cached `uid`.
    async fn resolve_existing(&self, dids: &[String]) -> Result<Vec<(String, i64)>>;

    /// Batch lookup of `uid`s for a set of DIDs; order not required, and DIDs
    /// not yet cached are simply absent from the result (spec §4.2
    /// `uids_for(dids) → [uid]`).
    async fn uids_for(&self, dids: &[String]) -> Result<Vec<i64>>;

    /// Insert up to 512 freshly-fetched profiles, returning assigned uids in
    /// the same order as `profiles`. Never clobbers an existing row — a
    /// `did` already present keeps its stored fields and its original
    /// `depth`; only a brand-new row is written with `profiles`/`depth`.
    async fn insert_accounts(&self, profiles: &[ProfileInput], depth: u32) -> Result<Vec<i64>>;

    /// Load a single account by uid.
    async fn load_account(&self, uid: i64) -> Result<Option<Account>>;

    /// Mark an account fully expanded. Called only after all its edges are
    /// committed — the final write of Phase 2 for that account.
    async fn mark_fetched(&self, uid: i64) -> Result<()>;

    /// Insert directed follow edges, ignoring ones that already exist.
    async fn insert_edges(&self, edges: &[Edge]) -> Result<()>;

    /// All edges, for the ranker's adjacency build.
    async fn all_edges(&self) -> Result<Vec<Edge>>;

    /// All accounts, for the ranker's vertex set and CSV output.
    async fn all_accounts(&self) -> Result<Vec<Account>>;

    /// `(account_count, edge_count)`, for the `status` command.
    async fn counts(&self) -> Result<(i64, i64)>;
}
