// Cache store status display — file size, account/edge counts.
//
// Adapted from the teacher's `status.rs`: same file-existence/size check
// and the same "not initialized yet" guidance, reporting this crate's own
// account/edge tables instead of charcoal's threat-score tables.

use anyhow::Result;
use std::path::Path;

use crate::cache::{CacheStore, SqliteCacheStore};

/// Print cache store status to the terminal.
pub async fn show(cache_db_path: &Path) -> Result<()> {
    if !cache_db_path.exists() {
        println!("Cache store: not initialized");
        println!("\nRun `init` to create the cache database.");
        return Ok(());
    }

    let file_size = std::fs::metadata(cache_db_path)
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "unknown".to_string());
    println!("Cache store: {} ({})", cache_db_path.display(), file_size);

    let store = SqliteCacheStore::open(cache_db_path)?;
    let (accounts, edges) = store.counts().await?;
    let fetched = store
        .all_accounts()
        .await?
        .into_iter()
        .filter(|a| a.fetched)
        .count();

    println!("Accounts: {accounts} ({fetched} fully expanded)");
    println!("Edges: {edges}");

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
