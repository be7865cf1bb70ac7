use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

use gindex_core::error::CoreError;
use gindex_core::models::{
    CatalogCounts, Category, CategoryKind, EntityKey, MovieRecord, SeriesDetail, SeriesRecord,
    StoredUrl, UpsertStats,
};
use gindex_core::storage::{CategoryLink, Storage};
use gindex_core::store::{CatalogStore, UrlStore};

type Reply<T> = oneshot::Sender<Result<T, CoreError>>;

/// Handle to the database actor thread. Cheap to clone.
#[derive(Clone)]
pub struct DbHandle {
    tx: mpsc::UnboundedSender<DbCommand>,
}

enum DbCommand {
    UpsertCategories {
        categories: Vec<Category>,
        reply: Reply<UpsertStats>,
    },
    UpsertMovies {
        movies: Vec<MovieRecord>,
        reply: Reply<UpsertStats>,
    },
    UpsertSeries {
        series: Vec<SeriesRecord>,
        reply: Reply<UpsertStats>,
    },
    ReplaceSeriesDetail {
        series_id: i64,
        detail: SeriesDetail,
        prune: bool,
        reply: Reply<UpsertStats>,
    },
    DeleteMoviesNotIn {
        keep: Vec<i64>,
        reply: Reply<usize>,
    },
    DeleteSeriesNotIn {
        kind: CategoryKind,
        keep: Vec<i64>,
        reply: Reply<usize>,
    },
    CategoryLinks {
        kind: CategoryKind,
        reply: Reply<HashSet<CategoryLink>>,
    },
    ApplyCategoryDiff {
        kind: CategoryKind,
        added: Vec<CategoryLink>,
        removed: Vec<CategoryLink>,
        reply: Reply<()>,
    },
    RemotePath {
        key: EntityKey,
        reply: Reply<Option<String>>,
    },
    SaveSignedUrl {
        key: EntityKey,
        url: String,
        expires_at: DateTime<Utc>,
        reply: Reply<()>,
    },
    LoadSignedUrl {
        key: EntityKey,
        reply: Reply<Option<StoredUrl>>,
    },
    ForgetSignedUrl {
        key: EntityKey,
        reply: Reply<()>,
    },
    Counts {
        reply: Reply<CatalogCounts>,
    },
}

impl DbHandle {
    /// Open the database at `path` and start the actor thread.
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        Self::spawn(Storage::open(path)?)
    }

    /// Actor over an in-memory database.
    pub fn open_memory() -> Result<Self, CoreError> {
        Self::spawn(Storage::open_memory()?)
    }

    fn spawn(storage: Storage) -> Result<Self, CoreError> {
        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("db-actor".into())
            .spawn(move || actor_loop(storage, rx))?;

        Ok(Self { tx })
    }

    pub async fn counts(&self) -> Result<CatalogCounts, CoreError> {
        self.request(|reply| DbCommand::Counts { reply }).await
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> DbCommand) -> Result<T, CoreError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(command(reply));
        rx.await.unwrap_or_else(|_| Err(CoreError::StoreClosed))
    }
}

impl CatalogStore for DbHandle {
    async fn upsert_categories(&self, categories: Vec<Category>) -> Result<UpsertStats, CoreError> {
        self.request(|reply| DbCommand::UpsertCategories { categories, reply })
            .await
    }

    async fn upsert_movies(&self, movies: Vec<MovieRecord>) -> Result<UpsertStats, CoreError> {
        self.request(|reply| DbCommand::UpsertMovies { movies, reply })
            .await
    }

    async fn upsert_series(&self, series: Vec<SeriesRecord>) -> Result<UpsertStats, CoreError> {
        self.request(|reply| DbCommand::UpsertSeries { series, reply })
            .await
    }

    async fn replace_series_detail(
        &self,
        series_id: i64,
        detail: SeriesDetail,
        prune: bool,
    ) -> Result<UpsertStats, CoreError> {
        self.request(|reply| DbCommand::ReplaceSeriesDetail {
            series_id,
            detail,
            prune,
            reply,
        })
        .await
    }

    async fn delete_movies_not_in(&self, keep: Vec<i64>) -> Result<usize, CoreError> {
        self.request(|reply| DbCommand::DeleteMoviesNotIn { keep, reply })
            .await
    }

    async fn delete_series_not_in(
        &self,
        kind: CategoryKind,
        keep: Vec<i64>,
    ) -> Result<usize, CoreError> {
        self.request(|reply| DbCommand::DeleteSeriesNotIn { kind, keep, reply })
            .await
    }

    async fn category_links(&self, kind: CategoryKind) -> Result<HashSet<CategoryLink>, CoreError> {
        self.request(|reply| DbCommand::CategoryLinks { kind, reply })
            .await
    }

    async fn apply_category_diff(
        &self,
        kind: CategoryKind,
        added: Vec<CategoryLink>,
        removed: Vec<CategoryLink>,
    ) -> Result<(), CoreError> {
        self.request(|reply| DbCommand::ApplyCategoryDiff {
            kind,
            added,
            removed,
            reply,
        })
        .await
    }
}

impl UrlStore for DbHandle {
    async fn remote_path(&self, key: EntityKey) -> Result<Option<String>, CoreError> {
        self.request(|reply| DbCommand::RemotePath { key, reply })
            .await
    }

    async fn save_signed_url(
        &self,
        key: EntityKey,
        url: String,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.request(|reply| DbCommand::SaveSignedUrl {
            key,
            url,
            expires_at,
            reply,
        })
        .await
    }

    async fn load_signed_url(&self, key: EntityKey) -> Result<Option<StoredUrl>, CoreError> {
        self.request(|reply| DbCommand::LoadSignedUrl { key, reply })
            .await
    }

    async fn forget_signed_url(&self, key: EntityKey) -> Result<(), CoreError> {
        self.request(|reply| DbCommand::ForgetSignedUrl { key, reply })
            .await
    }
}

fn actor_loop(storage: Storage, mut rx: mpsc::UnboundedReceiver<DbCommand>) {
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            DbCommand::UpsertCategories { categories, reply } => {
                let _ = reply.send(storage.upsert_categories(&categories));
            }
            DbCommand::UpsertMovies { movies, reply } => {
                let _ = reply.send(storage.upsert_movies(&movies));
            }
            DbCommand::UpsertSeries { series, reply } => {
                let _ = reply.send(storage.upsert_series(&series));
            }
            DbCommand::ReplaceSeriesDetail {
                series_id,
                detail,
                prune,
                reply,
            } => {
                let _ = reply.send(storage.replace_series_detail(series_id, &detail, prune));
            }
            DbCommand::DeleteMoviesNotIn { keep, reply } => {
                let _ = reply.send(storage.delete_movies_not_in(&keep));
            }
            DbCommand::DeleteSeriesNotIn { kind, keep, reply } => {
                let _ = reply.send(storage.delete_series_not_in(kind, &keep));
            }
            DbCommand::CategoryLinks { kind, reply } => {
                let _ = reply.send(storage.category_links(kind));
            }
            DbCommand::ApplyCategoryDiff {
                kind,
                added,
                removed,
                reply,
            } => {
                let _ = reply.send(storage.apply_category_diff(kind, &added, &removed));
            }
            DbCommand::RemotePath { key, reply } => {
                let _ = reply.send(storage.remote_path(key));
            }
            DbCommand::SaveSignedUrl {
                key,
                url,
                expires_at,
                reply,
            } => {
                let _ = reply.send(storage.save_signed_url(key, &url, expires_at));
            }
            DbCommand::LoadSignedUrl { key, reply } => {
                let _ = reply.send(storage.load_signed_url(key));
            }
            DbCommand::ForgetSignedUrl { key, reply } => {
                let _ = reply.send(storage.forget_signed_url(key));
            }
            DbCommand::Counts { reply } => {
                let _ = reply.send(storage.counts());
            }
        }
    }
    tracing::debug!("db actor stopped");
}
