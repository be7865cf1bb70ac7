use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use gindex_api::{BreakerConfig, EndpointConfig, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::CategoryKind;
use crate::url_cache::UrlCacheConfig;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub roots: Vec<RootConfig>,
    pub index: IndexConfig,
    pub breaker: BreakerSettings,
    pub retry: RetrySettings,
    pub pacing: PacingConfig,
    pub cache: CacheConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Single base URL, used when no mirrors are listed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub mirrors: Vec<EndpointConfig>,
    #[serde(default)]
    pub password: String,
}

/// A top-level remote folder whose children are categories of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootConfig {
    pub kind: CategoryKind,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub success_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub transport_retries: u32,
    pub transport_delay_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_jitter_ms: u64,
    pub max_attempts: u32,
    pub request_timeout_secs: u64,
    pub page_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    pub base_ms: u64,
    pub jitter_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub refresh_margin_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Titles per upsert batch.
    pub batch_size: usize,
    /// Series per detail chunk.
    pub detail_chunk: usize,
    /// Concurrent detail workers.
    pub concurrency: usize,
    pub item_timeout_secs: u64,
}

impl SyncConfig {
    pub fn item_timeout(&self) -> Duration {
        Duration::from_secs(self.item_timeout_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        AppConfig::default().sync
    }
}

impl AppConfig {
    /// Load config: user file (if exists) merged over built-in defaults.
    pub fn load() -> Result<Self, CoreError> {
        let user_path = Self::config_path();
        if user_path.exists() {
            Self::load_from(&user_path)
        } else {
            toml::from_str(DEFAULT_CONFIG).map_err(|e| CoreError::Config(e.to_string()))
        }
    }

    /// Load a specific file merged over built-in defaults.
    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        let user_str = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&user_str)
    }

    /// Parse a (possibly partial) TOML document over the defaults.
    pub fn from_toml(user_str: &str) -> Result<Self, CoreError> {
        let mut merged: toml::Value =
            toml::from_str(DEFAULT_CONFIG).map_err(|e| CoreError::Config(e.to_string()))?;
        let user: toml::Value =
            toml::from_str(user_str).map_err(|e| CoreError::Config(e.to_string()))?;
        merge(&mut merged, user);
        merged
            .try_into()
            .map_err(|e: toml::de::Error| CoreError::Config(e.to_string()))
    }

    /// Reject configurations the runtime cannot start with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.mirrors().is_empty() {
            return Err(CoreError::Config(
                "no index endpoint configured: set index.url or [[index.mirrors]]".into(),
            ));
        }
        if self.sync.batch_size == 0 || self.sync.detail_chunk == 0 || self.sync.concurrency == 0
        {
            return Err(CoreError::Config(
                "sync.batch_size, sync.detail_chunk and sync.concurrency must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Configured mirrors, or the single `index.url` at priority 0.
    pub fn mirrors(&self) -> Vec<EndpointConfig> {
        if !self.index.mirrors.is_empty() {
            return self.index.mirrors.clone();
        }
        self.index
            .url
            .iter()
            .map(|url| EndpointConfig {
                url: url.clone(),
                priority: 0,
            })
            .collect()
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.breaker.failure_threshold,
            recovery_timeout: Duration::from_secs(self.breaker.recovery_timeout_secs),
            success_threshold: self.breaker.success_threshold,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let r = &self.retry;
        RetryPolicy {
            transport_retries: r.transport_retries,
            transport_delay: Duration::from_millis(r.transport_delay_ms),
            backoff_base: Duration::from_millis(r.backoff_base_ms),
            backoff_max: Duration::from_millis(r.backoff_max_ms),
            backoff_jitter: Duration::from_millis(r.backoff_jitter_ms),
            max_attempts: r.max_attempts,
            request_timeout: Duration::from_secs(r.request_timeout_secs),
            page_limit: r.page_limit,
        }
    }

    pub fn cache_config(&self) -> UrlCacheConfig {
        UrlCacheConfig {
            ttl: Duration::from_secs(self.cache.ttl_secs),
            refresh_margin: Duration::from_secs(self.cache.refresh_margin_secs),
        }
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Path to the database file.
    pub fn db_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().join("gindex.db"))
            .unwrap_or_else(|| PathBuf::from("gindex.db"))
    }

    /// Directory for rolling log files.
    pub fn log_dir() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"))
    }

    /// Ensure the data directory exists and return the DB path.
    pub fn ensure_db_path() -> Result<PathBuf, CoreError> {
        let path = Self::db_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "gindex")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}

/// Recursively overlay `user` onto `base`. Tables merge key by key;
/// everything else (arrays included) is replaced.
fn merge(base: &mut toml::Value, user: toml::Value) {
    match (base, user) {
        (toml::Value::Table(base), toml::Value::Table(user)) => {
            for (key, value) in user {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, user) => *base = user,
    }
}
