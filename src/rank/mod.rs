// Ranker (C5) — biased/personalized PageRank over the cached follow graph
// (spec §4.5). A direct translation of the original's `rank_all` (which
// delegates to sknetwork's `PageRank`) into a hand-rolled power iteration:
// the personalization-weighted variant sknetwork implements is simple
// enough, and the uid space is already a dense array of small integers
// (spec's own "dense integer index" design), so a full graph library adds
// dependency weight without adding capability here.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use csv::WriterBuilder;
use tracing::info;

use crate::cache::{Account, CacheStore};

/// Power iteration stops once the L1 delta between successive score vectors
/// drops below this, or after `MAX_ITERATIONS`, whichever comes first —
/// sknetwork's `PageRank.fit` uses an equivalent tolerance-based stop.
const CONVERGENCE_TOLERANCE: f64 = 1e-9;
const MAX_ITERATIONS: usize = 200;

/// Personalization weight for a "bad" (already block-listed) account.
const BAD_WEIGHT: f64 = 1.0;
/// Personalization weight for every other account (spec §4.5 step 4).
const OTHER_WEIGHT: f64 = 0.1;

pub struct Ranker<'a> {
    store: &'a dyn CacheStore,
}

/// One row of ranker output, in emission order.
pub struct RankedAccount {
    pub score: f64,
    pub blocked: bool,
    pub account: Account,
}

impl<'a> Ranker<'a> {
    pub fn new(store: &'a dyn CacheStore) -> Self {
        Self { store }
    }

    /// Run PageRank over the full cached graph and write the ranked CSV to
    /// `output_path`. Returns the DIDs that score above `rank_threshold` and
    /// are not already in `bad_uids` — the new block candidates (spec §4.5
    /// step 7).
    pub async fn rank_all(
        &self,
        bad_uids: &[i64],
        damping: f64,
        rank_threshold: f64,
        output_path: impl AsRef<Path>,
    ) -> Result<Vec<String>> {
        let edges = self.store.all_edges().await?;
        let accounts = self.store.all_accounts().await?;
        let accounts_by_uid: HashMap<i64, &Account> =
            accounts.iter().map(|a| (a.uid, a)).collect();

        // Vertex set: every uid that appears in at least one edge (spec §4.5
        // step 2), in a stable order so index<->uid mapping is deterministic.
        let mut vertices: Vec<i64> = edges
            .iter()
            .flat_map(|e| [e.from_uid, e.to_uid])
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        vertices.sort_unstable();

        if vertices.is_empty() {
            self.write_csv(&[], output_path)?;
            return Ok(Vec::new());
        }

        let index_of: HashMap<i64, usize> =
            vertices.iter().enumerate().map(|(i, &uid)| (uid, i)).collect();
        let n = vertices.len();

        let bad_set: std::collections::HashSet<i64> = bad_uids.iter().copied().collect();
        let personalization: Vec<f64> = vertices
            .iter()
            .map(|uid| if bad_set.contains(uid) { BAD_WEIGHT } else { OTHER_WEIGHT })
            .collect();
        let personalization_sum: f64 = personalization.iter().sum();
        let personalization_norm: Vec<f64> = personalization
            .iter()
            .map(|w| w / personalization_sum)
            .collect();

        // Outbound adjacency, plus out-degree for normalization.
        let mut out_edges: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut out_degree: Vec<usize> = vec![0; n];
        for edge in &edges {
            let (Some(&from), Some(&to)) = (index_of.get(&edge.from_uid), index_of.get(&edge.to_uid)) else {
                continue;
            };
            out_edges[from].push(to);
            out_degree[from] += 1;
        }

        let scores = power_iterate(&out_edges, &out_degree, &personalization_norm, damping);

        let mut ranked: Vec<RankedAccount> = vertices
            .iter()
            .enumerate()
            .filter_map(|(i, &uid)| {
                accounts_by_uid.get(&uid).map(|&account| RankedAccount {
                    score: scores[i],
                    blocked: bad_set.contains(&uid),
                    account: account.clone(),
                })
            })
            .collect();

        // Spec §4.5 "numeric semantics": score descending, uid ascending tiebreak.
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.account.uid.cmp(&b.account.uid))
        });

        self.write_csv(&ranked, output_path)?;

        let new_blocks: Vec<String> = ranked
            .iter()
            .filter(|r| r.score > rank_threshold && !r.blocked)
            .map(|r| r.account.did.clone())
            .collect();

        info!(new_blocks = new_blocks.len(), "ranking complete");
        Ok(new_blocks)
    }

    fn write_csv(&self, ranked: &[RankedAccount], output_path: impl AsRef<Path>) -> Result<()> {
        let mut writer = WriterBuilder::new()
            .has_headers(true)
            .from_path(output_path.as_ref())
            .with_context(|| format!("failed to open {}", output_path.as_ref().display()))?;

        writer.write_record(["score", "blocked", "nick", "description", "handle", "did"])?;
        for row in ranked {
            let desc = row.account.desc.replace('\n', " ");
            writer.write_record([
                row.score.to_string(),
                if row.blocked { "y".to_string() } else { "n".to_string() },
                row.account.nick.clone(),
                desc,
                row.account.handle.clone(),
                row.account.did.clone(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Personalized PageRank via power iteration:
/// `s' = d * M^T s + (1 - d) * p`, where `M` is column-normalized adjacency
/// and `p` is the personalization vector. Dangling nodes (no outbound
/// edges) redistribute their mass according to `p`, the standard treatment.
fn power_iterate(
    out_edges: &[Vec<usize>],
    out_degree: &[usize],
    personalization: &[f64],
    damping: f64,
) -> Vec<f64> {
    let n = out_edges.len();
    let mut scores = vec![1.0 / n as f64; n];

    for _ in 0..MAX_ITERATIONS {
        let mut next = vec![0.0; n];
        let mut dangling_mass = 0.0;

        for (u, targets) in out_edges.iter().enumerate() {
            if out_degree[u] == 0 {
                dangling_mass += scores[u];
                continue;
            }
            let share = scores[u] / out_degree[u] as f64;
            for &v in targets {
                next[v] += share;
            }
        }

        for v in 0..n {
            next[v] = damping * (next[v] + dangling_mass * personalization[v])
                + (1.0 - damping) * personalization[v];
        }

        let delta: f64 = next.iter().zip(&scores).map(|(a, b)| (a - b).abs()).sum();
        scores = next;
        if delta < CONVERGENCE_TOLERANCE {
            break;
        }
    }

    scores
}
