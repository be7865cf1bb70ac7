//! One catalog sync pass: scrape, upsert, clean up.
//!
//! Titles are streamed page by page and written in fixed-size batches.
//! Series detail (seasons and episodes) is fetched afterwards in chunks by
//! a bounded worker pool, each item under its own timeout. Orphan deletion
//! and category association diffs run last, per media kind, and are
//! skipped for any kind whose listing was incomplete this pass.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use gindex_parse::stable_id;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{RootConfig, SyncConfig};
use crate::error::CoreError;
use crate::models::{Category, CategoryKind, MovieRecord, SeriesRecord, UpsertStats};
use crate::scraper::{series_record, Scraper};
use crate::storage::CategoryLink;
use crate::store::{CatalogStore, StatusSink, SyncEvent};

/// Counters from one pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub categories: usize,
    pub movies: usize,
    pub series: usize,
    /// Titles whose scrape failed; their stored records were kept.
    pub titles_failed: usize,
    pub details_synced: usize,
    /// Series written without pruning because a season branch failed.
    pub details_partial: usize,
    pub details_failed: usize,
    pub details_timed_out: usize,
    pub orphans_deleted: usize,
    pub links_added: usize,
    pub links_removed: usize,
    /// Kinds whose cleanup was skipped.
    pub failed_kinds: Vec<CategoryKind>,
    pub stats: UpsertStats,
}

/// What one pass saw for a media kind.
#[derive(Debug, Default)]
struct KindPass {
    /// Ids to keep.
    seen: HashSet<i64>,
    /// Desired (media, category) associations.
    links: HashSet<CategoryLink>,
    /// Ids whose scrape failed. Their existing associations are kept.
    protected: HashSet<i64>,
    failed: bool,
}

enum DetailOutcome {
    Synced(UpsertStats),
    Partial(UpsertStats),
    Failed,
    TimedOut,
}

pub struct SyncEngine<S> {
    scraper: Arc<Scraper>,
    store: Arc<S>,
    roots: Vec<RootConfig>,
    config: SyncConfig,
    sink: Arc<dyn StatusSink>,
}

impl<S: CatalogStore> SyncEngine<S> {
    pub fn new(
        scraper: Arc<Scraper>,
        store: Arc<S>,
        roots: Vec<RootConfig>,
        config: SyncConfig,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            scraper,
            store,
            roots,
            config,
            sink,
        }
    }

    /// Run a full pass, reporting checkpoints to the status sink.
    pub async fn run(&self) -> Result<SyncReport, CoreError> {
        self.sink.emit(&SyncEvent::Started);
        match self.pass().await {
            Ok(report) => {
                self.sink.emit(&SyncEvent::Completed(report.clone()));
                Ok(report)
            }
            Err(e) => {
                self.sink.emit(&SyncEvent::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn pass(&self) -> Result<SyncReport, CoreError> {
        let mut report = SyncReport::default();
        let mut kinds: HashMap<CategoryKind, KindPass> = HashMap::new();
        let mut pending: Vec<SeriesRecord> = Vec::new();

        for root in &self.roots {
            let pass = kinds.entry(root.kind).or_default();
            let categories = match self.scraper.list_categories(root).await {
                Ok(categories) => categories,
                Err(e) => {
                    warn!(root = %root.path, kind = %root.kind, error = %e, "category listing failed");
                    pass.failed = true;
                    continue;
                }
            };

            report.categories += categories.len();
            report
                .stats
                .merge(self.store.upsert_categories(categories.clone()).await?);

            for category in &categories {
                match self
                    .sync_category(category, pass, &mut pending, &mut report)
                    .await
                {
                    Ok(()) => {}
                    Err(CoreError::Api(e)) => {
                        warn!(category = %category.name, error = %e, "category aborted");
                        pass.failed = true;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        self.sync_details(&pending, &mut report).await;

        for (kind, pass) in kinds {
            if pass.failed {
                warn!(kind = %kind, "listing incomplete, skipping cleanup");
                report.failed_kinds.push(kind);
                continue;
            }
            self.cleanup(kind, pass, &mut report).await?;
        }

        info!(
            movies = report.movies,
            series = report.series,
            orphans = report.orphans_deleted,
            "sync pass finished"
        );
        Ok(report)
    }

    async fn sync_category(
        &self,
        category: &Category,
        pass: &mut KindPass,
        pending: &mut Vec<SeriesRecord>,
        report: &mut SyncReport,
    ) -> Result<(), CoreError> {
        let batch_size = self.config.batch_size.max(1);
        let mut pages = self.scraper.title_pages(category);
        let mut movies: Vec<MovieRecord> = Vec::new();
        let mut series: Vec<SeriesRecord> = Vec::new();

        loop {
            let titles = match pages.next_batch().await {
                Ok(Some(titles)) => titles,
                Ok(None) => break,
                Err(e) => {
                    // Keep what was scraped before the listing broke.
                    self.flush_movies(&mut movies, report).await?;
                    self.flush_series(&mut series, pending, report).await?;
                    return Err(e.into());
                }
            };
            debug!(category = %category.name, titles = titles.len(), "title page");
            for title in &titles {
                match category.kind {
                    CategoryKind::Movies => {
                        let id = stable_id(&title.path);
                        if pass.seen.contains(&id) {
                            if !pass.protected.contains(&id) {
                                pass.links.insert((id, category.id));
                            }
                            continue;
                        }
                        match self.scraper.scrape_movie(title).await {
                            Ok(Some(movie)) => {
                                pass.seen.insert(movie.id);
                                pass.links.insert((movie.id, category.id));
                                movies.push(movie);
                            }
                            Ok(None) => {}
                            Err(e) => {
                                warn!(path = %title.path, error = %e, "movie scrape failed");
                                report.titles_failed += 1;
                                pass.seen.insert(id);
                                pass.protected.insert(id);
                            }
                        }
                        if movies.len() >= batch_size {
                            self.flush_movies(&mut movies, report).await?;
                        }
                    }
                    CategoryKind::Series | CategoryKind::Anime => {
                        let record = series_record(title, category.kind);
                        pass.links.insert((record.id, category.id));
                        if pass.seen.insert(record.id) {
                            series.push(record);
                        }
                        if series.len() >= batch_size {
                            self.flush_series(&mut series, pending, report).await?;
                        }
                    }
                }
            }
        }

        self.flush_movies(&mut movies, report).await?;
        self.flush_series(&mut series, pending, report).await
    }

    async fn flush_movies(
        &self,
        movies: &mut Vec<MovieRecord>,
        report: &mut SyncReport,
    ) -> Result<(), CoreError> {
        if movies.is_empty() {
            return Ok(());
        }
        report.movies += movies.len();
        let stats = self.store.upsert_movies(std::mem::take(movies)).await?;
        report.stats.merge(stats);
        Ok(())
    }

    async fn flush_series(
        &self,
        series: &mut Vec<SeriesRecord>,
        pending: &mut Vec<SeriesRecord>,
        report: &mut SyncReport,
    ) -> Result<(), CoreError> {
        if series.is_empty() {
            return Ok(());
        }
        report.series += series.len();
        let batch = std::mem::take(series);
        let stats = self.store.upsert_series(batch.clone()).await?;
        report.stats.merge(stats);
        pending.extend(batch);
        Ok(())
    }

    async fn sync_details(&self, pending: &[SeriesRecord], report: &mut SyncReport) {
        let chunk_size = self.config.detail_chunk.max(1);
        let workers = self.config.concurrency.max(1);

        for chunk in pending.chunks(chunk_size) {
            let outcomes: Vec<DetailOutcome> = stream::iter(chunk)
                .map(|series| self.sync_detail(series))
                .buffer_unordered(workers)
                .collect()
                .await;

            for outcome in outcomes {
                match outcome {
                    DetailOutcome::Synced(stats) => {
                        report.details_synced += 1;
                        report.stats.merge(stats);
                    }
                    DetailOutcome::Partial(stats) => {
                        report.details_partial += 1;
                        report.stats.merge(stats);
                    }
                    DetailOutcome::Failed => report.details_failed += 1,
                    DetailOutcome::TimedOut => report.details_timed_out += 1,
                }
            }
            debug!(done = chunk.len(), "series detail chunk finished");
        }
    }

    async fn sync_detail(&self, series: &SeriesRecord) -> DetailOutcome {
        let work = async {
            let scraped = self.scraper.scrape_series_detail(series).await?;
            let complete = scraped.is_complete();
            let stats = self
                .store
                .replace_series_detail(series.id, scraped.detail, complete)
                .await?;
            Ok::<_, CoreError>((stats, complete))
        };

        match tokio::time::timeout(self.config.item_timeout(), work).await {
            Ok(Ok((stats, true))) => DetailOutcome::Synced(stats),
            Ok(Ok((stats, false))) => DetailOutcome::Partial(stats),
            Ok(Err(e)) => {
                warn!(series = %series.title, path = %series.folder_path, error = %e, "series detail failed");
                DetailOutcome::Failed
            }
            Err(_) => {
                let e = CoreError::Timeout(self.config.item_timeout());
                warn!(series = %series.title, path = %series.folder_path, error = %e, "series detail abandoned");
                DetailOutcome::TimedOut
            }
        }
    }

    async fn cleanup(
        &self,
        kind: CategoryKind,
        pass: KindPass,
        report: &mut SyncReport,
    ) -> Result<(), CoreError> {
        let keep: Vec<i64> = pass.seen.iter().copied().collect();
        let deleted = match kind {
            CategoryKind::Movies => self.store.delete_movies_not_in(keep).await?,
            CategoryKind::Series | CategoryKind::Anime => {
                self.store.delete_series_not_in(kind, keep).await?
            }
        };
        report.orphans_deleted += deleted;
        report.stats.deleted += deleted;

        let current = self.store.category_links(kind).await?;
        let added: Vec<CategoryLink> = pass.links.difference(&current).copied().collect();
        let removed: Vec<CategoryLink> = current
            .difference(&pass.links)
            .filter(|(media, _)| !pass.protected.contains(media))
            .copied()
            .collect();

        report.links_added += added.len();
        report.links_removed += removed.len();
        if !added.is_empty() || !removed.is_empty() {
            self.store.apply_category_diff(kind, added, removed).await?;
        }
        debug!(kind = %kind, deleted, "cleanup finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use gindex_api::{BreakerConfig, EndpointManager, IndexClient, RequestPacer, RetryPolicy};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::storage::Storage;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<String>>);

    impl StatusSink for RecordingSink {
        fn emit(&self, event: &SyncEvent) {
            let label = match event {
                SyncEvent::Started => "started",
                SyncEvent::Completed(_) => "completed",
                SyncEvent::Failed(_) => "failed",
            };
            self.0.lock().unwrap().push(label.to_string());
        }
    }

    fn folder(name: &str) -> serde_json::Value {
        json!({ "name": name, "mimeType": "application/vnd.google-apps.folder" })
    }

    fn file(name: &str) -> serde_json::Value {
        json!({ "name": name, "mimeType": "video/x-matroska", "size": 1024 })
    }

    async fn listing(server: &MockServer, at: &str, files: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": files })))
            .mount(server)
            .await;
    }

    /// Two movie categories and one series with a single season.
    async fn mount_catalog(server: &MockServer, with_up: bool) {
        listing(server, "/1:/Filmes/", json!([folder("Acao"), folder("Drama")])).await;
        let acao = if with_up {
            json!([folder("Avatar"), folder("Up")])
        } else {
            json!([folder("Avatar")])
        };
        listing(server, "/1:/Filmes/Acao/", acao).await;
        listing(server, "/1:/Filmes/Drama/", json!([folder("Her")])).await;
        listing(server, "/1:/Filmes/Acao/Avatar/", json!([file("Avatar.2009.1080p.mkv")])).await;
        listing(server, "/1:/Filmes/Acao/Up/", json!([file("Up.2009.720p.mkv")])).await;
        listing(server, "/1:/Filmes/Drama/Her/", json!([file("Her.2013.mkv")])).await;
        mount_series(server).await;
    }

    async fn mount_series(server: &MockServer) {
        listing(server, "/1:/Series/", json!([folder("Drama")])).await;
        listing(server, "/1:/Series/Drama/", json!([folder("Dark")])).await;
        listing(server, "/1:/Series/Drama/Dark/", json!([folder("Season 1")])).await;
        listing(
            server,
            "/1:/Series/Drama/Dark/Season%201/",
            json!([file("Dark.S01E01.mkv"), file("Dark.S01E02.mkv")]),
        )
        .await;
    }

    fn roots() -> Vec<RootConfig> {
        vec![
            RootConfig {
                kind: CategoryKind::Movies,
                path: "/1:/Filmes/".into(),
            },
            RootConfig {
                kind: CategoryKind::Series,
                path: "/1:/Series/".into(),
            },
        ]
    }

    fn engine(
        server: &MockServer,
        store: Arc<Mutex<Storage>>,
        config: SyncConfig,
        sink: Arc<dyn StatusSink>,
    ) -> SyncEngine<Mutex<Storage>> {
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
        let client = Arc::new(IndexClient::new(endpoints, policy, "", pacer.clone()).unwrap());
        let scraper = Arc::new(Scraper::new(client, pacer));
        SyncEngine::new(scraper, store, roots(), config, sink)
    }

    fn small_batches() -> SyncConfig {
        SyncConfig {
            batch_size: 1,
            detail_chunk: 1,
            concurrency: 2,
            item_timeout_secs: 10,
        }
    }

    fn new_store() -> Arc<Mutex<Storage>> {
        Arc::new(Mutex::new(Storage::open_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_second_pass_is_idempotent() {
        let server = MockServer::start().await;
        mount_catalog(&server, true).await;
        let store = new_store();
        let sink = Arc::new(RecordingSink::default());
        let engine = engine(&server, store.clone(), small_batches(), sink.clone());

        let first = engine.run().await.unwrap();
        assert_eq!(first.categories, 3);
        assert_eq!(first.movies, 3);
        assert_eq!(first.series, 1);
        assert_eq!(first.details_synced, 1);
        assert_eq!(first.links_added, 4);
        assert!(first.failed_kinds.is_empty());

        let counts = store.lock().unwrap().counts().unwrap();
        assert_eq!(counts.movies, 3);
        assert_eq!(counts.seasons, 1);
        assert_eq!(counts.episodes, 2);

        let avatar = stable_id("/1:/Filmes/Acao/Avatar/");
        let before = store.lock().unwrap().get_movie(avatar).unwrap().unwrap();

        let second = engine.run().await.unwrap();
        assert_eq!(second.stats.inserted, 0);
        assert_eq!(second.stats.deleted, 0);
        assert_eq!(second.links_added, 0);
        assert_eq!(second.links_removed, 0);
        assert_eq!(store.lock().unwrap().counts().unwrap(), counts);

        let after = store.lock().unwrap().get_movie(avatar).unwrap().unwrap();
        assert_eq!(before, after);
        assert_eq!(
            *sink.0.lock().unwrap(),
            ["started", "completed", "started", "completed"]
        );
    }

    #[tokio::test]
    async fn test_absent_title_is_deleted_with_dependents() {
        let server = MockServer::start().await;
        mount_catalog(&server, true).await;
        let store = new_store();
        let engine = engine(
            &server,
            store.clone(),
            small_batches(),
            Arc::new(RecordingSink::default()),
        );
        engine.run().await.unwrap();

        let up = stable_id("/1:/Filmes/Acao/Up/");
        store
            .lock()
            .unwrap()
            .save_signed_url(crate::models::EntityKey::movie(up), "https://cdn/up", chrono::Utc::now())
            .unwrap();

        server.reset().await;
        mount_catalog(&server, false).await;
        let report = engine.run().await.unwrap();

        assert_eq!(report.orphans_deleted, 1);
        let db = store.lock().unwrap();
        assert!(db.get_movie(up).unwrap().is_none());
        assert_eq!(db.counts().unwrap().signed_urls, 0);
        assert!(db
            .category_links(CategoryKind::Movies)
            .unwrap()
            .iter()
            .all(|(movie, _)| *movie != up));
    }

    #[tokio::test]
    async fn test_failed_root_skips_cleanup_for_its_kind() {
        let server = MockServer::start().await;
        mount_catalog(&server, true).await;
        let store = new_store();
        let sink = Arc::new(RecordingSink::default());
        let engine = engine(&server, store.clone(), small_batches(), sink);
        engine.run().await.unwrap();

        server.reset().await;
        Mock::given(method("POST"))
            .and(path("/1:/Filmes/"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream crashed"))
            .mount(&server)
            .await;
        mount_series(&server).await;

        let report = engine.run().await.unwrap();
        assert_eq!(report.failed_kinds, [CategoryKind::Movies]);
        assert_eq!(report.orphans_deleted, 0);
        assert_eq!(report.details_synced, 1);

        let db = store.lock().unwrap();
        assert_eq!(db.counts().unwrap().movies, 3);
        assert_eq!(db.category_links(CategoryKind::Movies).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_movie_keeps_its_record() {
        let server = MockServer::start().await;
        mount_catalog(&server, true).await;
        let store = new_store();
        let engine = engine(
            &server,
            store.clone(),
            small_batches(),
            Arc::new(RecordingSink::default()),
        );
        engine.run().await.unwrap();

        server.reset().await;
        Mock::given(method("POST"))
            .and(path("/1:/Filmes/Drama/Her/"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream crashed"))
            .with_priority(1)
            .mount(&server)
            .await;
        mount_catalog(&server, true).await;

        let report = engine.run().await.unwrap();
        assert_eq!(report.titles_failed, 1);
        assert_eq!(report.orphans_deleted, 0);
        assert_eq!(report.links_removed, 0);

        let her = stable_id("/1:/Filmes/Drama/Her/");
        assert!(store.lock().unwrap().get_movie(her).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_detail_timeout_does_not_abort_batch() {
        let server = MockServer::start().await;
        listing(&server, "/1:/Series/", json!([folder("Drama")])).await;
        listing(&server, "/1:/Series/Drama/", json!([folder("Dark"), folder("Slow")])).await;
        listing(&server, "/1:/Series/Drama/Dark/", json!([file("Dark.S01E01.mkv")])).await;
        Mock::given(method("POST"))
            .and(path("/1:/Series/Drama/Slow/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "files": [] }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let store = new_store();
        let config = SyncConfig {
            batch_size: 50,
            detail_chunk: 100,
            concurrency: 10,
            item_timeout_secs: 1,
        };
        let engine = engine(&server, store.clone(), config, Arc::new(RecordingSink::default()));
        let report = engine.run().await.unwrap();

        assert_eq!(report.series, 2);
        assert_eq!(report.details_synced, 1);
        assert_eq!(report.details_timed_out, 1);
        assert_eq!(store.lock().unwrap().counts().unwrap().episodes, 1);
    }
}
