use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

use crate::{
    DomainStore,
    Indexer,
    IndexerCfg,
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Path of the sled database; an ephemeral in-memory store is used when
    /// unset
    #[arg(long, env = "PNS_DB_PATH")]
    pub db_path: Option<PathBuf>,
    /// JSON-lines file of decoded feed items to replay
    #[arg(long, env = "PNS_FEED")]
    pub feed: PathBuf,
    /// Top-level suffix appended to bare labels
    #[arg(long, env = "PNS_TLD", default_value = "dot")]
    pub tld: String,
    /// Cache size in bytes
    #[arg(long, env = "PNS_CACHE_SIZE", default_value = "1000000")]
    pub cache_size: usize,
    /// Log level
    #[arg(long, env = "PNS_LOG_LEVEL", default_value = "info")]
    pub log_level: LevelFilter,
}

impl Config {
    /// Build the indexer over its store.
    pub fn build(&self) -> anyhow::Result<Indexer> {
        let store = match &self.db_path {
            Some(db_path) => {
                let db: sled::Db = sled::Config::new()
                    .path(db_path.clone())
                    .cache_capacity_bytes(self.cache_size)
                    .open()?;
                tracing::info!(
                    database_path = %db_path.display(),
                    "Opened database"
                );
                DomainStore::new(&db)
            }
            None => {
                tracing::info!("No database path supplied, using an ephemeral store");
                DomainStore::new_ephemeral()
            }
        };

        Ok(Indexer::new(IndexerCfg {
            store,
            tld: self.tld.clone(),
        }))
    }
}
