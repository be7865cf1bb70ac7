//! Persistence seams used by the sync engine and the URL cache.
//!
//! The runtime implements these over its database actor; a plain
//! `Mutex<Storage>` implements them too, for single-process embedding and
//! tests.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::models::{
    Category, CategoryKind, EntityKey, MovieRecord, SeriesDetail, SeriesRecord, StoredUrl,
    UpsertStats,
};
use crate::storage::{CategoryLink, Storage};
use crate::sync::SyncReport;

/// Catalog writes performed by a sync pass.
pub trait CatalogStore: Send + Sync {
    fn upsert_categories(
        &self,
        categories: Vec<Category>,
    ) -> impl Future<Output = Result<UpsertStats, CoreError>> + Send;

    fn upsert_movies(
        &self,
        movies: Vec<MovieRecord>,
    ) -> impl Future<Output = Result<UpsertStats, CoreError>> + Send;

    fn upsert_series(
        &self,
        series: Vec<SeriesRecord>,
    ) -> impl Future<Output = Result<UpsertStats, CoreError>> + Send;

    /// Upsert everything below one series; `prune` also deletes what
    /// `detail` no longer contains.
    fn replace_series_detail(
        &self,
        series_id: i64,
        detail: SeriesDetail,
        prune: bool,
    ) -> impl Future<Output = Result<UpsertStats, CoreError>> + Send;

    fn delete_movies_not_in(
        &self,
        keep: Vec<i64>,
    ) -> impl Future<Output = Result<usize, CoreError>> + Send;

    fn delete_series_not_in(
        &self,
        kind: CategoryKind,
        keep: Vec<i64>,
    ) -> impl Future<Output = Result<usize, CoreError>> + Send;

    fn category_links(
        &self,
        kind: CategoryKind,
    ) -> impl Future<Output = Result<HashSet<CategoryLink>, CoreError>> + Send;

    fn apply_category_diff(
        &self,
        kind: CategoryKind,
        added: Vec<CategoryLink>,
        removed: Vec<CategoryLink>,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;
}

/// Durable side of the signed-URL cache.
pub trait UrlStore: Send + Sync {
    /// Remote file path of an entity, `None` if it no longer exists.
    fn remote_path(
        &self,
        key: EntityKey,
    ) -> impl Future<Output = Result<Option<String>, CoreError>> + Send;

    fn save_signed_url(
        &self,
        key: EntityKey,
        url: String,
        expires_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;

    /// Last persisted URL, expired or not.
    fn load_signed_url(
        &self,
        key: EntityKey,
    ) -> impl Future<Output = Result<Option<StoredUrl>, CoreError>> + Send;

    fn forget_signed_url(&self, key: EntityKey)
        -> impl Future<Output = Result<(), CoreError>> + Send;
}

/// Checkpoints of a sync pass.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Started,
    Completed(SyncReport),
    Failed(String),
}

/// Receives sync checkpoints.
pub trait StatusSink: Send + Sync {
    fn emit(&self, event: &SyncEvent);
}

/// Logs sync checkpoints through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn emit(&self, event: &SyncEvent) {
        match event {
            SyncEvent::Started => tracing::info!("sync started"),
            SyncEvent::Completed(report) => tracing::info!(
                categories = report.categories,
                movies = report.movies,
                series = report.series,
                details = report.details_synced,
                detail_failures = report.details_failed,
                inserted = report.stats.inserted,
                updated = report.stats.updated,
                deleted = report.stats.deleted,
                "sync completed"
            ),
            SyncEvent::Failed(reason) => tracing::error!(reason = %reason, "sync failed"),
        }
    }
}

fn lock(storage: &Mutex<Storage>) -> MutexGuard<'_, Storage> {
    storage.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CatalogStore for Mutex<Storage> {
    async fn upsert_categories(&self, categories: Vec<Category>) -> Result<UpsertStats, CoreError> {
        lock(self).upsert_categories(&categories)
    }

    async fn upsert_movies(&self, movies: Vec<MovieRecord>) -> Result<UpsertStats, CoreError> {
        lock(self).upsert_movies(&movies)
    }

    async fn upsert_series(&self, series: Vec<SeriesRecord>) -> Result<UpsertStats, CoreError> {
        lock(self).upsert_series(&series)
    }

    async fn replace_series_detail(
        &self,
        series_id: i64,
        detail: SeriesDetail,
        prune: bool,
    ) -> Result<UpsertStats, CoreError> {
        lock(self).replace_series_detail(series_id, &detail, prune)
    }

    async fn delete_movies_not_in(&self, keep: Vec<i64>) -> Result<usize, CoreError> {
        lock(self).delete_movies_not_in(&keep)
    }

    async fn delete_series_not_in(
        &self,
        kind: CategoryKind,
        keep: Vec<i64>,
    ) -> Result<usize, CoreError> {
        lock(self).delete_series_not_in(kind, &keep)
    }

    async fn category_links(&self, kind: CategoryKind) -> Result<HashSet<CategoryLink>, CoreError> {
        lock(self).category_links(kind)
    }

    async fn apply_category_diff(
        &self,
        kind: CategoryKind,
        added: Vec<CategoryLink>,
        removed: Vec<CategoryLink>,
    ) -> Result<(), CoreError> {
        lock(self).apply_category_diff(kind, &added, &removed)
    }
}

impl UrlStore for Mutex<Storage> {
    async fn remote_path(&self, key: EntityKey) -> Result<Option<String>, CoreError> {
        lock(self).remote_path(key)
    }

    async fn save_signed_url(
        &self,
        key: EntityKey,
        url: String,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        lock(self).save_signed_url(key, &url, expires_at)
    }

    async fn load_signed_url(&self, key: EntityKey) -> Result<Option<StoredUrl>, CoreError> {
        lock(self).load_signed_url(key)
    }

    async fn forget_signed_url(&self, key: EntityKey) -> Result<(), CoreError> {
        lock(self).forget_signed_url(key)
    }
}
