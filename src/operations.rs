// Top-level operations (spec §6) — `update_all` and `rank_all` as library
// entry points, not CLI plumbing.
//
// The split mirrors the teacher's `pipeline::sweep::run` /
// `pipeline::amplification::run`: a free-standing async function taking its
// dependencies (agent, store, weights) as plain arguments rather than
// hanging off a long-lived struct with a fixed remote connection, so a
// caller that only wants to rank doesn't have to log in first.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::blocklist::BlockList;
use crate::cache::CacheStore;
use crate::crawl::CrawlEngine;
use crate::rank::Ranker;
use crate::remote::Gateway;

/// A crawl-and-rank session bound to one cache store and one block list
/// file. Holds no remote connection of its own — `update_all` takes a
/// `Gateway` explicitly, since `rank_all` never needs one.
pub struct Cluster {
    store: Arc<dyn CacheStore>,
    blocked_csv: std::path::PathBuf,
    default_bad: bool,
    max_followers: u64,
    depth: u32,
}

impl Cluster {
    pub fn new(
        store: Arc<dyn CacheStore>,
        blocked_csv: impl Into<std::path::PathBuf>,
        default_bad: bool,
        max_followers: u64,
        depth: u32,
    ) -> Self {
        Self {
            store,
            blocked_csv: blocked_csv.into(),
            default_bad,
            max_followers,
            depth,
        }
    }

    /// Spec §6 top-level operation 1: resolve the block list's bad DIDs to
    /// accounts, then expand their follow graph to `depth`. Annotates the
    /// block list in place for any DID the crawl could not find at all.
    pub async fn update_all(&self, gateway: Arc<Gateway>) -> Result<()> {
        let block_list = BlockList::read(&self.blocked_csv, self.default_bad)?;
        let bad_dids = block_list.bad_dids();
        info!(count = bad_dids.len(), "starting crawl from bad DIDs");

        let engine = CrawlEngine::new(self.store.clone(), gateway, self.max_followers);
        let not_found = engine.crawl(&bad_dids, self.depth).await?;

        if !not_found.is_empty() {
            let mut block_list = BlockList::read(&self.blocked_csv, self.default_bad)?;
            for did in &not_found {
                block_list.mark_removed(did);
            }
            block_list.write()?;
            info!(count = not_found.len(), "annotated removed accounts");
        }

        Ok(())
    }

    /// Resolve the block list's bad DIDs to their cached `uid`s, via the
    /// cache store's C2 `uids_for` operation (spec §4.2).
    pub async fn bad_uids(&self) -> Result<Vec<i64>> {
        let block_list = BlockList::read(&self.blocked_csv, self.default_bad)?;
        self.store.uids_for(&block_list.bad_dids()).await
    }

    /// Spec §6 top-level operation 2: rank the full cached graph and return
    /// the new block candidates (accounts scoring above `rank_threshold`
    /// that aren't already bad).
    pub async fn rank_all(
        &self,
        bad_uids: &[i64],
        damping: f64,
        rank_threshold: f64,
        output_csv: impl AsRef<std::path::Path>,
    ) -> Result<Vec<String>> {
        let ranker = Ranker::new(&*self.store);
        ranker.rank_all(bad_uids, damping, rank_threshold, output_csv).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ProfileInput, SqliteCacheStore};
    use crate::remote::{AtpClient, Page};
    use async_trait::async_trait;
    use rusqlite::Connection;
    use std::io::Write;

    struct FakeClient {
        profiles: std::collections::HashMap<String, ProfileInput>,
        followers: std::collections::HashMap<String, Vec<String>>,
    }

    #[async_trait]
    impl AtpClient for FakeClient {
        async fn get_profiles(&self, dids: &[String]) -> Result<Vec<ProfileInput>> {
            Ok(dids.iter().filter_map(|d| self.profiles.get(d).cloned()).collect())
        }

        async fn get_followers(&self, did: &str, _cursor: Option<String>) -> Result<Page> {
            Ok(Page {
                dids: self.followers.get(did).cloned().unwrap_or_default(),
                next_cursor: None,
            })
        }

        async fn get_follows(&self, _did: &str, _cursor: Option<String>) -> Result<Page> {
            Ok(Page { dids: Vec::new(), next_cursor: None })
        }
    }

    fn profile(did: &str, followers: i64) -> ProfileInput {
        ProfileInput {
            did: did.to_string(),
            handle: format!("{did}.bsky.social"),
            nick: did.to_string(),
            desc: String::new(),
            followers,
            following: 0,
        }
    }

    fn write_blocklist(dir: &std::path::Path, contents: &str) -> std::path::PathBuf {
        let path = dir.join("blocked.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn update_all_crawls_then_bad_uids_resolves_cached_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let blocked_csv = write_blocklist(&dir.path(), "did:plc:bad,,\n");

        let mut profiles = std::collections::HashMap::new();
        profiles.insert("did:plc:bad".to_string(), profile("did:plc:bad", 1));
        profiles.insert("did:plc:follower".to_string(), profile("did:plc:follower", 0));
        let mut followers = std::collections::HashMap::new();
        followers.insert("did:plc:bad".to_string(), vec!["did:plc:follower".to_string()]);
        let client: Arc<dyn AtpClient> = Arc::new(FakeClient { profiles, followers });
        let gateway = Arc::new(Gateway::new(client, 1000));

        let store: Arc<dyn CacheStore> =
            Arc::new(SqliteCacheStore::from_connection(Connection::open_in_memory().unwrap()).unwrap());
        let cluster = Cluster::new(store.clone(), &blocked_csv, true, 100_000, 1);

        cluster.update_all(gateway).await.unwrap();

        let bad = cluster.bad_uids().await.unwrap();
        assert_eq!(bad.len(), 1);
        let (accounts, edges) = store.counts().await.unwrap();
        assert_eq!(accounts, 2);
        assert_eq!(edges, 1);
    }

    #[tokio::test]
    async fn rank_all_needs_no_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let blocked_csv = write_blocklist(&dir.path(), "did:plc:bad,,\n");
        let store: Arc<dyn CacheStore> =
            Arc::new(SqliteCacheStore::from_connection(Connection::open_in_memory().unwrap()).unwrap());
        let uids = store
            .insert_accounts(
                &[ProfileInput { did: "did:plc:bad".into(), ..Default::default() }],
                0,
            )
            .await
            .unwrap();

        let cluster = Cluster::new(store, &blocked_csv, true, 100_000, 1);
        let output = dir.path().join("ranked.csv");
        let new_blocks = cluster.rank_all(&uids, 0.85, 0.5, &output).await.unwrap();
        assert!(new_blocks.is_empty());
    }
}
