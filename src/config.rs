// Central configuration — a single JSON document, loaded once.
//
// Unlike the teacher's env-var-only Config, this crate's configuration
// mirrors the original Python implementation's `Config` dataclass: one JSON
// file, with `session_file` and `cache_db` resolved relative to the config
// file's own directory so the repo is runnable from anywhere.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::FatalError;

/// Configuration loaded from a JSON file (see spec §6 "Configuration file").
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Remote credentials for first-time login.
    pub user: String,
    pub password: String,

    /// Path (relative to the config file's directory) to the persisted session.
    pub session_file: String,

    /// Path (relative to the config file's directory) to the durable cache file.
    pub cache_db: String,

    /// Input CSV of seed block-list items.
    pub blocked_csv: String,

    /// Ranked-candidates CSV output.
    pub output_csv: String,

    /// PageRank damping factor, in (0, 1).
    pub page_rank_damping: f64,

    /// Accounts above this score become new block candidates.
    pub rank_threshold: f64,

    /// Global token-bucket rate, in tokens per second.
    pub rate_limit: u32,

    /// Accounts whose followers or following exceeds this are not expanded.
    pub max_followers: u64,

    /// Crawl depth (>= 1). Defaults to 1 if omitted.
    #[serde(default = "default_depth")]
    pub depth: u32,

    /// Treat block-list entries with an empty `reason_type` as "bad". Not
    /// part of the original JSON schema but a documented knob over the
    /// `default_bad` policy described in spec §3; defaults to true to match
    /// `BlockList.__init__`'s `default_bad: bool = True`.
    #[serde(default = "default_true")]
    pub default_bad: bool,

    /// Directory the config file lives in; `session_file` and `cache_db`
    /// resolve relative to this. Not part of the JSON document itself.
    #[serde(skip)]
    config_dir: PathBuf,
}

fn default_depth() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load(config_file: impl AsRef<Path>) -> Result<Self> {
        let config_file = config_file.as_ref();
        let contents = std::fs::read_to_string(config_file)
            .with_context(|| format!("failed to read config file {}", config_file.display()))?;
        let mut config: Config = serde_json::from_str(&contents)
            .map_err(|e| FatalError::ConfigInvalid(e.to_string()))
            .with_context(|| format!("failed to parse config file {}", config_file.display()))?;

        config.validate()?;

        config.config_dir = config_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.page_rank_damping <= 0.0 || self.page_rank_damping >= 1.0 {
            return Err(FatalError::ConfigInvalid(format!(
                "page_rank_damping must be in (0, 1), got {}",
                self.page_rank_damping
            ))
            .into());
        }
        if self.rate_limit == 0 {
            return Err(FatalError::ConfigInvalid("rate_limit must be >= 1".into()).into());
        }
        if self.depth == 0 {
            return Err(FatalError::ConfigInvalid("depth must be >= 1".into()).into());
        }
        Ok(())
    }

    pub fn cache_db_path(&self) -> PathBuf {
        self.config_dir.join(&self.cache_db)
    }

    pub fn session_file_path(&self) -> PathBuf {
        self.config_dir.join(&self.session_file)
    }

    pub fn blocked_csv_path(&self) -> PathBuf {
        self.config_dir.join(&self.blocked_csv)
    }

    pub fn output_csv_path(&self) -> PathBuf {
        self.config_dir.join(&self.output_csv)
    }
}
