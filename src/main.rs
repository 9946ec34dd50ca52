use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use bluesky_list_cluster::blocklist::BlockList;
use bluesky_list_cluster::cache::{CacheStore, SqliteCacheStore};
use bluesky_list_cluster::config::Config;
use bluesky_list_cluster::operations::Cluster;
use bluesky_list_cluster::remote::{login_with_session_fallback, AtpBskyClient, Gateway};
use bluesky_list_cluster::status;

/// Crawl a moderation block list's follow graph and rank new candidates
/// with personalized PageRank.
#[derive(Parser)]
#[command(name = "bluesky-list-cluster", version, about)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the cache database if it doesn't exist yet.
    Init,

    /// Crawl: resolve block-list DIDs to accounts, then expand their graph.
    Update,

    /// Rank cached accounts and write new block candidates.
    Rank,

    /// Run `update` followed by `rank`, then merge new candidates into the
    /// block list.
    Run,

    /// Show cache store statistics.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let config = Config::load(&cli.config)?;
            let store = SqliteCacheStore::open(config.cache_db_path())?;
            let table_count = store.table_count().await?;
            println!("Cache store initialized at: {}", config.cache_db_path().display());
            println!("Tables created: {table_count}");
        }

        Commands::Update => {
            let config = Config::load(&cli.config)?;
            let cluster = build_cluster(&config)?;
            let gateway = build_gateway(&config).await?;
            cluster.update_all(gateway).await?;
        }

        Commands::Rank => {
            let config = Config::load(&cli.config)?;
            let cluster = build_cluster(&config)?;
            let bad_uids = cluster.bad_uids().await?;
            cluster
                .rank_all(
                    &bad_uids,
                    config.page_rank_damping,
                    config.rank_threshold,
                    config.output_csv_path(),
                )
                .await?;
        }

        Commands::Run => {
            let config = Config::load(&cli.config)?;
            let cluster = build_cluster(&config)?;
            let gateway = build_gateway(&config).await?;
            cluster.update_all(gateway).await?;

            let bad_uids = cluster.bad_uids().await?;
            let new_blocks = cluster
                .rank_all(
                    &bad_uids,
                    config.page_rank_damping,
                    config.rank_threshold,
                    config.output_csv_path(),
                )
                .await?;

            let mut block_list = BlockList::read(config.blocked_csv_path(), config.default_bad)?;
            for did in &new_blocks {
                block_list.add(did, "", "");
            }
            block_list.write()?;
            println!("Added {} new candidates to the block list", new_blocks.len());
        }

        Commands::Status => {
            let config = Config::load(&cli.config)?;
            status::show(&config.cache_db_path()).await?;
        }
    }

    Ok(())
}

/// Build the library-level `Cluster` for the two top-level operations
/// (spec §6). Opens (but does not log in to) the cache store.
fn build_cluster(config: &Config) -> Result<Cluster> {
    let store: Arc<dyn CacheStore> = Arc::new(SqliteCacheStore::open(config.cache_db_path())?);
    Ok(Cluster::new(
        store,
        config.blocked_csv_path(),
        config.default_bad,
        config.max_followers,
        config.depth,
    ))
}

/// Log in (or resume a persisted session) and wrap the remote client in a
/// rate-limited `Gateway`. Only needed by commands that crawl.
async fn build_gateway(config: &Config) -> Result<Arc<Gateway>> {
    let agent =
        login_with_session_fallback(&config.user, &config.password, &config.session_file_path())
            .await?;
    let client = Arc::new(AtpBskyClient::new(agent));
    Ok(Arc::new(Gateway::new(client, config.rate_limit)))
}
