mod db;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use gindex_api::{EndpointManager, EndpointStatus, IndexClient, RequestPacer};
use gindex_core::config::AppConfig;
use gindex_core::error::CoreError;
use gindex_core::models::{CatalogCounts, EntityKey};
use gindex_core::scraper::Scraper;
use gindex_core::store::{StatusSink, TracingStatusSink};
use gindex_core::sync::{SyncEngine, SyncReport};
use gindex_core::url_cache::UrlCache;

pub use db::DbHandle;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("api error: {0}")]
    Api(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl From<CoreError> for RuntimeError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Config(msg) => Self::Config(msg),
            CoreError::Api(e) => Self::Api(e.to_string()),
            CoreError::NotFound(what) => Self::NotFound(what),
            e @ (CoreError::Unavailable { .. } | CoreError::Timeout(_)) => {
                Self::Unavailable(e.to_string())
            }
            e @ (CoreError::Storage(_) | CoreError::Io(_) | CoreError::StoreClosed) => {
                Self::Database(e.to_string())
            }
        }
    }
}

/// Everything a `gindex` process needs, wired from one [`AppConfig`].
pub struct Runtime {
    config: AppConfig,
    db: DbHandle,
    endpoints: Arc<EndpointManager>,
    sync: SyncEngine<DbHandle>,
    urls: Arc<UrlCache<DbHandle>>,
}

impl Runtime {
    /// Load the user config and open the default database.
    pub fn new() -> Result<Self, RuntimeError> {
        let config = AppConfig::load()?;
        let db_path = AppConfig::ensure_db_path()?;
        let db = DbHandle::open(&db_path)?;
        Self::with_db(config, db, Arc::new(TracingStatusSink))
    }

    pub fn with_db(
        config: AppConfig,
        db: DbHandle,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;

        let endpoints = Arc::new(
            EndpointManager::new(config.mirrors(), config.breaker_config())
                .map_err(|e| RuntimeError::Config(e.to_string()))?,
        );
        let pacer = Arc::new(RequestPacer::new(
            Duration::from_millis(config.pacing.base_ms),
            Duration::from_millis(config.pacing.jitter_ms),
        ));
        let client = Arc::new(
            IndexClient::new(
                endpoints.clone(),
                config.retry_policy(),
                config.index.password.clone(),
                pacer.clone(),
            )
            .map_err(|e| RuntimeError::Api(e.to_string()))?,
        );

        let store = Arc::new(db.clone());
        let scraper = Arc::new(Scraper::new(client.clone(), pacer));
        let sync = SyncEngine::new(
            scraper,
            store.clone(),
            config.roots.clone(),
            config.sync.clone(),
            sink,
        );
        let urls = Arc::new(UrlCache::new(client, store, config.cache_config()));

        tracing::info!(
            endpoints = endpoints.len(),
            roots = config.roots.len(),
            "runtime ready"
        );

        Ok(Self {
            config,
            db,
            endpoints,
            sync,
            urls,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run one full catalog sync pass.
    pub async fn run_sync(&self) -> Result<SyncReport, RuntimeError> {
        Ok(self.sync.run().await?)
    }

    /// Signed download URL for a movie or episode.
    pub async fn resolve_url(&self, key: EntityKey) -> Result<String, RuntimeError> {
        Ok(self.urls.get(key).await?)
    }

    pub async fn invalidate_url(&self, key: EntityKey) -> Result<(), RuntimeError> {
        Ok(self.urls.invalidate(key).await?)
    }

    /// Number of signed-URL fetches sent to the index.
    pub fn url_fetch_count(&self) -> u64 {
        self.urls.fetch_count()
    }

    pub fn endpoint_status(&self) -> Vec<EndpointStatus> {
        self.endpoints.status()
    }

    pub fn reset_endpoints(&self) {
        self.endpoints.reset_all();
    }

    pub async fn counts(&self) -> Result<CatalogCounts, RuntimeError> {
        Ok(self.db.counts().await?)
    }

    /// Evict expired signed URLs on the configured interval.
    pub fn spawn_cache_sweeper(&self) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.config.cache.sweep_interval_secs.max(1));
        self.urls.spawn_sweeper(interval)
    }
}
