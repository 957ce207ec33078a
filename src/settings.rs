use std::path::PathBuf;

use anyhow::{Context, Result};
use config::Config;
use serde::Deserialize;

use crate::snapshot::Granularity;

pub const CATALOG_URL: &str = "https://ollama.com/search";
pub const ENV_PREFIX: &str = "OLLAMA_STATS";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Catalog page to scrape.
    pub source_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub granularity: Granularity,
    /// Write snapshots to this directory instead of blob storage.
    pub local_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            source_url: CATALOG_URL.to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            timeout_secs: 30,
            granularity: Granularity::Hourly,
            local_dir: None,
        }
    }
}

impl Settings {
    /// Defaults, overridden by `OLLAMA_STATS_*` environment variables.
    pub fn load() -> Result<Self> {
        Self::from_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let defaults = Settings::default();
        Config::builder()
            .set_default("source_url", defaults.source_url)?
            .set_default("user_agent", defaults.user_agent)?
            .set_default("timeout_secs", defaults.timeout_secs as i64)?
            .set_default("granularity", "hourly")?
            .add_source(source)
            .build()
            .and_then(Config::try_deserialize)
            .context("Invalid OLLAMA_STATS_* settings")
    }
}
