//! Signed download URLs with a short in-memory TTL and a durable fallback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use gindex_api::IndexClient;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::CoreError;
use crate::models::EntityKey;
use crate::store::UrlStore;

#[derive(Debug, Clone)]
pub struct UrlCacheConfig {
    /// Lifetime assumed for a freshly minted URL.
    pub ttl: Duration,
    /// Entries with less than this left are refreshed on access.
    pub refresh_margin: Duration,
}

impl Default for UrlCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            refresh_margin: Duration::from_secs(2 * 60),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedUrlEntry {
    url: String,
    expires_at: Instant,
}

pub struct UrlCache<S> {
    client: Arc<IndexClient>,
    store: Arc<S>,
    config: UrlCacheConfig,
    entries: RwLock<HashMap<EntityKey, CachedUrlEntry>>,
    fetches: AtomicU64,
}

impl<S: UrlStore> UrlCache<S> {
    pub fn new(client: Arc<IndexClient>, store: Arc<S>, config: UrlCacheConfig) -> Self {
        Self {
            client,
            store,
            config,
            entries: RwLock::new(HashMap::new()),
            fetches: AtomicU64::new(0),
        }
    }

    /// Signed URL for an entity.
    ///
    /// Lookup order: in-memory entry outside the refresh margin, durable
    /// entry outside the margin, fresh fetch. When the fetch fails, the
    /// last known URL is returned even if expired.
    pub async fn get(&self, key: EntityKey) -> Result<String, CoreError> {
        if let Some(url) = self.fresh(key) {
            trace!(key = %key, "signed URL cache hit");
            return Ok(url);
        }

        let stored = match self.store.load_signed_url(key).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to read persisted signed URL");
                None
            }
        };

        if let Some(stored) = &stored {
            let remaining = (stored.expires_at - Utc::now()).to_std().ok();
            if let Some(remaining) = remaining.filter(|r| *r > self.config.refresh_margin) {
                debug!(key = %key, "restored signed URL from store");
                self.remember(key, stored.url.clone(), Instant::now() + remaining);
                return Ok(stored.url.clone());
            }
        }

        match self.refresh(key).await {
            Ok(url) => Ok(url),
            Err(e @ CoreError::NotFound(_)) => {
                self.write().remove(&key);
                Err(e)
            }
            Err(e) => {
                if let Some(stored) = stored {
                    warn!(key = %key, error = %e, expires_at = %stored.expires_at, "serving last known signed URL");
                    return Ok(stored.url);
                }
                let stale = self.read().get(&key).map(|entry| entry.url.clone());
                if let Some(url) = stale {
                    warn!(key = %key, error = %e, "serving stale in-memory signed URL");
                    return Ok(url);
                }
                Err(CoreError::Unavailable {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Drop an entry from memory and from the store.
    pub async fn invalidate(&self, key: EntityKey) -> Result<(), CoreError> {
        self.write().remove(&key);
        self.store.forget_signed_url(key).await
    }

    /// Evict expired in-memory entries. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the task is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()>
    where
        S: 'static,
    {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = cache.sweep();
                if evicted > 0 {
                    debug!(evicted, "swept expired signed URLs");
                }
            }
        })
    }

    /// Number of remote fetches issued so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    async fn refresh(&self, key: EntityKey) -> Result<String, CoreError> {
        let path = self
            .store
            .remote_path(key)
            .await?
            .ok_or_else(|| CoreError::NotFound(key.to_string()))?;

        let endpoint = self.client.endpoints().select();
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let url = self.client.get_download_url(&endpoint, &path).await?;

        let expires_at = Instant::now() + self.config.ttl;
        let wallclock = Utc::now()
            + chrono::Duration::from_std(self.config.ttl).unwrap_or_else(|_| chrono::Duration::zero());
        self.remember(key, url.clone(), expires_at);

        if let Err(e) = self.store.save_signed_url(key, url.clone(), wallclock).await {
            warn!(key = %key, error = %e, "failed to persist signed URL");
        }
        debug!(key = %key, endpoint = %endpoint.base_url, "fetched signed URL");
        Ok(url)
    }

    fn fresh(&self, key: EntityKey) -> Option<String> {
        let now = Instant::now();
        self.read()
            .get(&key)
            .filter(|entry| entry.expires_at.saturating_duration_since(now) > self.config.refresh_margin)
            .map(|entry| entry.url.clone())
    }

    fn remember(&self, key: EntityKey, url: String, expires_at: Instant) {
        self.write().insert(key, CachedUrlEntry { url, expires_at });
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<EntityKey, CachedUrlEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<EntityKey, CachedUrlEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use gindex_api::{BreakerConfig, EndpointManager, RequestPacer, RetryPolicy};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::models::{MovieRecord, ReleaseInfo};
    use crate::storage::Storage;

    const FILE_PATH: &str = "/1:/Filmes/Avatar/Avatar.mkv";

    fn store_with_movie() -> Arc<Mutex<Storage>> {
        let storage = Storage::open_memory().unwrap();
        storage
            .upsert_movies(&[MovieRecord {
                id: 1,
                title: "Avatar".into(),
                original_title: None,
                year: Some(2009),
                folder_path: "/1:/Filmes/Avatar/".into(),
                file_path: FILE_PATH.into(),
                file_name: "Avatar.mkv".into(),
                size: None,
                release: ReleaseInfo::default(),
                modified_at: None,
            }])
            .unwrap();
        Arc::new(Mutex::new(storage))
    }

    fn client_for(server: &MockServer) -> Arc<IndexClient> {
        let endpoints =
            Arc::new(EndpointManager::single(&server.uri(), BreakerConfig::default()).unwrap());
        let policy = RetryPolicy {
            transport_retries: 0,
            max_attempts: 1,
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(1),
            backoff_jitter: Duration::ZERO,
            ..RetryPolicy::default()
        };
        let pacer = Arc::new(RequestPacer::disabled());
        Arc::new(IndexClient::new(endpoints, policy, "", pacer).unwrap())
    }

    async fn mount_link(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(FILE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "link": "/dl?sig=1" })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_second_get_within_ttl_is_cached() {
        let server = MockServer::start().await;
        mount_link(&server).await;
        let store = store_with_movie();
        let cache = UrlCache::new(client_for(&server), store.clone(), UrlCacheConfig::default());

        let key = EntityKey::movie(1);
        let first = cache.get(key).await.unwrap();
        let second = cache.get(key).await.unwrap();

        assert_eq!(first, format!("{}/dl?sig=1", server.uri()));
        assert_eq!(first, second);
        assert_eq!(cache.fetch_count(), 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);

        let persisted = store.lock().unwrap().load_signed_url(key).unwrap().unwrap();
        assert_eq!(persisted.url, first);
        assert!(!persisted.is_expired(Utc::now()));
    }

    #[tokio::test]
    async fn test_restart_recovers_persisted_url() {
        let server = MockServer::start().await;
        mount_link(&server).await;
        let store = store_with_movie();
        let key = EntityKey::movie(1);

        let first = UrlCache::new(client_for(&server), store.clone(), UrlCacheConfig::default());
        let url = first.get(key).await.unwrap();

        let restarted = UrlCache::new(client_for(&server), store, UrlCacheConfig::default());
        assert_eq!(restarted.get(key).await.unwrap(), url);
        assert_eq!(restarted.fetch_count(), 0);
        assert_eq!(restarted.len(), 1);
    }

    #[tokio::test]
    async fn test_near_expiry_entry_is_refreshed() {
        let server = MockServer::start().await;
        mount_link(&server).await;
        let config = UrlCacheConfig {
            ttl: Duration::from_secs(60),
            refresh_margin: Duration::from_secs(120),
        };
        let cache = UrlCache::new(client_for(&server), store_with_movie(), config);

        let key = EntityKey::movie(1);
        cache.get(key).await.unwrap();
        cache.get(key).await.unwrap();
        assert_eq!(cache.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_falls_back_to_expired_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;
        let store = store_with_movie();
        let key = EntityKey::movie(1);
        let expired = Utc::now() - chrono::Duration::hours(1);
        store
            .lock()
            .unwrap()
            .save_signed_url(key, "https://cdn.example/old", expired)
            .unwrap();

        let cache = UrlCache::new(client_for(&server), store, UrlCacheConfig::default());
        assert_eq!(cache.get(key).await.unwrap(), "https://cdn.example/old");
        assert_eq!(cache.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_without_fallback_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        let cache = UrlCache::new(client_for(&server), store_with_movie(), UrlCacheConfig::default());

        let err = cache.get(EntityKey::movie(1)).await.unwrap_err();
        assert!(matches!(err, CoreError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_unknown_entity_is_not_found() {
        let server = MockServer::start().await;
        let cache = UrlCache::new(client_for(&server), store_with_movie(), UrlCacheConfig::default());

        let err = cache.get(EntityKey::episode(42)).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_and_invalidate() {
        let server = MockServer::start().await;
        mount_link(&server).await;
        let store = store_with_movie();
        let config = UrlCacheConfig {
            ttl: Duration::ZERO,
            refresh_margin: Duration::ZERO,
        };
        let cache = UrlCache::new(client_for(&server), store.clone(), config);

        let key = EntityKey::movie(1);
        cache.get(key).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.sweep(), 1);
        assert!(cache.is_empty());

        cache.invalidate(key).await.unwrap();
        assert!(store.lock().unwrap().load_signed_url(key).unwrap().is_none());
    }
}
