#![allow(clippy::too_many_arguments)]

pub mod audit;
pub mod config;
pub mod crawlers;
pub mod error;
pub mod extract;
pub mod filter;
pub mod link;
pub mod links;
pub mod output;
pub mod replay;

// Re-export the types most callers need
pub use config::ScanConfig;
pub use error::Error;
pub use link::Link;
pub use links::LinkSet;
pub use replay::{Replayer, ReplaySummary};

use crate::audit::{AuditStore, SqliteAuditStore};
use crate::crawlers::session::Discovery;
use std::sync::Arc;
use std::time::Duration;

/// Builder for one discovery run.
///
/// Drives the fetch engine and discovery session over the configured
/// entry URL and yields the deduplicated set of discovered actions.
pub struct Scan {
    config: ScanConfig,
}

impl Scan {
    /// Scan with defaults for everything but the entry URL.
    pub fn new(entry: &str) -> Self {
        Self {
            config: ScanConfig::new(entry),
        }
    }

    /// Scan from a fully prepared configuration.
    pub fn with_config(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Load the configuration from a JSON file.
    pub fn with_config_file(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        Ok(Self {
            config: ScanConfig::from_file(path)?,
        })
    }

    /// Set the maximum traversal depth.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.config.max_depth = max_depth;
        self
    }

    /// Set the number of concurrent fetch workers.
    pub fn with_concurrency(mut self, max_concurrency: usize) -> Self {
        self.config.max_concurrency = max_concurrency;
        self
    }

    /// Run discovery to exhaustion and return everything found.
    ///
    /// A failed initial login is logged and the crawl proceeds
    /// unauthenticated; configuration errors abort before any fetch.
    pub async fn discover(self) -> Result<LinkSet, Error> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .cookie_store(true)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let session = Discovery::new(Arc::clone(&config), http)?;
        if let Err(e) = session.login().await {
            ::log::error!("{e}; crawling unauthenticated");
        }

        crawlers::web::run(Arc::clone(&config), session.clone()).await?;

        let links = session.links().await;
        ::log::info!("discovery finished with {} unique actions", links.len());
        Ok(links)
    }
}

/// Open the configured audit-log store: file-backed when a path is set,
/// otherwise an in-memory store that will only ever hold this run's
/// marker statements.
pub async fn open_store(config: &ScanConfig) -> Result<Box<dyn AuditStore>, Error> {
    Ok(match &config.db_path {
        Some(path) => Box::new(SqliteAuditStore::open(path, &config.log_table).await?),
        None => Box::new(SqliteAuditStore::in_memory(&config.log_table).await?),
    })
}
