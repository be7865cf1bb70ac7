use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::CoreError;
use crate::models::{
    CatalogCounts, Category, CategoryKind, EntityKey, EntityKind, EpisodeRecord, MovieRecord,
    ReleaseInfo, SeasonRecord, SeriesDetail, SeriesRecord, StoredUrl, UpsertStats,
};

const SCHEMA_V1: &str = include_str!("../../../migrations/001_initial.sql");
const SCHEMA_V2: &str = include_str!("../../../migrations/002_signed_url.sql");

/// A (media id, category id) association.
pub type CategoryLink = (i64, i64);

/// SQLite-backed catalog and signed-URL store.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    // ── Categories ──────────────────────────────────────────────

    pub fn upsert_categories(&self, categories: &[Category]) -> Result<UpsertStats, CoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut stats = UpsertStats::default();
        for category in categories {
            count_upsert(&mut stats, row_exists(&tx, "category", category.id)?);
            tx.execute(
                "INSERT INTO category (id, name, kind, path) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name, kind = excluded.kind, path = excluded.path,
                    updated_at = datetime('now')",
                params![
                    category.id,
                    category.name,
                    category.kind.as_db_str(),
                    category.path
                ],
            )?;
        }
        tx.commit()?;
        Ok(stats)
    }

    // ── Movies ──────────────────────────────────────────────────

    /// Insert or update movies by id, replacing every mutable column.
    pub fn upsert_movies(&self, movies: &[MovieRecord]) -> Result<UpsertStats, CoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut stats = UpsertStats::default();
        for movie in movies {
            count_upsert(&mut stats, row_exists(&tx, "movie", movie.id)?);
            tx.execute(
                "INSERT INTO movie (id, title, original_title, year, folder_path, file_path,
                    file_name, size, quality, source, codec, release_group, is_dual_audio,
                    modified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title, original_title = excluded.original_title,
                    year = excluded.year, folder_path = excluded.folder_path,
                    file_path = excluded.file_path, file_name = excluded.file_name,
                    size = excluded.size, quality = excluded.quality, source = excluded.source,
                    codec = excluded.codec, release_group = excluded.release_group,
                    is_dual_audio = excluded.is_dual_audio, modified_at = excluded.modified_at,
                    updated_at = datetime('now')",
                params![
                    movie.id,
                    movie.title,
                    movie.original_title,
                    movie.year,
                    movie.folder_path,
                    movie.file_path,
                    movie.file_name,
                    movie.size.map(|s| s as i64),
                    movie.release.quality,
                    movie.release.source,
                    movie.release.codec,
                    movie.release.release_group,
                    movie.release.is_dual_audio,
                    movie.modified_at.map(|dt| dt.to_rfc3339()),
                ],
            )?;
        }
        tx.commit()?;
        Ok(stats)
    }

    pub fn get_movie(&self, id: i64) -> Result<Option<MovieRecord>, CoreError> {
        self.conn
            .query_row(
                "SELECT id, title, original_title, year, folder_path, file_path, file_name,
                 size, quality, source, codec, release_group, is_dual_audio, modified_at
                 FROM movie WHERE id = ?1",
                params![id],
                row_to_movie,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Delete every movie whose id is not in `keep`. Dependents cascade.
    pub fn delete_movies_not_in(&self, keep: &[i64]) -> Result<usize, CoreError> {
        let tx = self.conn.unchecked_transaction()?;
        fill_keep_ids(&tx, keep.iter().copied())?;
        let deleted = tx.execute(
            "DELETE FROM movie WHERE id NOT IN (SELECT id FROM keep_ids)",
            [],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    // ── Series ──────────────────────────────────────────────────

    pub fn upsert_series(&self, series: &[SeriesRecord]) -> Result<UpsertStats, CoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut stats = UpsertStats::default();
        for s in series {
            count_upsert(&mut stats, row_exists(&tx, "series", s.id)?);
            tx.execute(
                "INSERT INTO series (id, kind, title, original_title, year, format, folder_path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    kind = excluded.kind, title = excluded.title,
                    original_title = excluded.original_title, year = excluded.year,
                    format = excluded.format, folder_path = excluded.folder_path,
                    updated_at = datetime('now')",
                params![
                    s.id,
                    s.kind.as_db_str(),
                    s.title,
                    s.original_title,
                    s.year,
                    s.format,
                    s.folder_path
                ],
            )?;
        }
        tx.commit()?;
        Ok(stats)
    }

    /// Delete every series of `kind` whose id is not in `keep`.
    pub fn delete_series_not_in(&self, kind: CategoryKind, keep: &[i64]) -> Result<usize, CoreError> {
        let tx = self.conn.unchecked_transaction()?;
        fill_keep_ids(&tx, keep.iter().copied())?;
        let deleted = tx.execute(
            "DELETE FROM series WHERE kind = ?1 AND id NOT IN (SELECT id FROM keep_ids)",
            params![kind.as_db_str()],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    /// Make the stored seasons and episodes of a series match `detail`.
    ///
    /// Rows present in `detail` are upserted. With `prune`, rows of this
    /// series absent from it are deleted; a partially listed series is
    /// written without pruning.
    pub fn replace_series_detail(
        &self,
        series_id: i64,
        detail: &SeriesDetail,
        prune: bool,
    ) -> Result<UpsertStats, CoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut stats = UpsertStats::default();

        for season in &detail.seasons {
            count_upsert(&mut stats, row_exists(&tx, "season", season.id)?);
            tx.execute(
                "INSERT INTO season (id, series_id, number, name, folder_path, is_release,
                    quality, source, codec, release_group, is_dual_audio, score)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(id) DO UPDATE SET
                    series_id = excluded.series_id, number = excluded.number,
                    name = excluded.name, folder_path = excluded.folder_path,
                    is_release = excluded.is_release, quality = excluded.quality,
                    source = excluded.source, codec = excluded.codec,
                    release_group = excluded.release_group,
                    is_dual_audio = excluded.is_dual_audio, score = excluded.score,
                    updated_at = datetime('now')",
                params![
                    season.id,
                    series_id,
                    season.number,
                    season.name,
                    season.folder_path,
                    season.is_release,
                    season.release.quality,
                    season.release.source,
                    season.release.codec,
                    season.release.release_group,
                    season.release.is_dual_audio,
                    season.score,
                ],
            )?;
        }

        for episode in &detail.episodes {
            count_upsert(&mut stats, row_exists(&tx, "episode", episode.id)?);
            tx.execute(
                "INSERT INTO episode (id, season_id, series_id, number, title, file_name,
                    file_path, size, quality, source, codec, release_group, is_dual_audio)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(id) DO UPDATE SET
                    season_id = excluded.season_id, series_id = excluded.series_id,
                    number = excluded.number, title = excluded.title,
                    file_name = excluded.file_name, file_path = excluded.file_path,
                    size = excluded.size, quality = excluded.quality,
                    source = excluded.source, codec = excluded.codec,
                    release_group = excluded.release_group,
                    is_dual_audio = excluded.is_dual_audio,
                    updated_at = datetime('now')",
                params![
                    episode.id,
                    episode.season_id,
                    series_id,
                    episode.number,
                    episode.title,
                    episode.file_name,
                    episode.file_path,
                    episode.size.map(|s| s as i64),
                    episode.release.quality,
                    episode.release.source,
                    episode.release.codec,
                    episode.release.release_group,
                    episode.release.is_dual_audio,
                ],
            )?;
        }

        if prune {
            fill_keep_ids(&tx, detail.episodes.iter().map(|e| e.id))?;
            stats.deleted += tx.execute(
                "DELETE FROM episode WHERE series_id = ?1 AND id NOT IN (SELECT id FROM keep_ids)",
                params![series_id],
            )?;

            fill_keep_ids(&tx, detail.seasons.iter().map(|s| s.id))?;
            stats.deleted += tx.execute(
                "DELETE FROM season WHERE series_id = ?1 AND id NOT IN (SELECT id FROM keep_ids)",
                params![series_id],
            )?;
        }

        tx.commit()?;
        Ok(stats)
    }

    pub fn seasons_for(&self, series_id: i64) -> Result<Vec<SeasonRecord>, CoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, series_id, number, name, folder_path, is_release, quality, source,
             codec, release_group, is_dual_audio, score
             FROM season WHERE series_id = ?1 ORDER BY is_release, number",
        )?;
        let rows = stmt
            .query_map(params![series_id], row_to_season)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn episodes_for(&self, season_id: i64) -> Result<Vec<EpisodeRecord>, CoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, season_id, series_id, number, title, file_name, file_path, size,
             quality, source, codec, release_group, is_dual_audio
             FROM episode WHERE season_id = ?1 ORDER BY number, file_name",
        )?;
        let rows = stmt
            .query_map(params![season_id], row_to_episode)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Category associations ───────────────────────────────────

    /// Current associations between media of `kind` and their categories.
    pub fn category_links(&self, kind: CategoryKind) -> Result<HashSet<CategoryLink>, CoreError> {
        let mut stmt = match kind {
            CategoryKind::Movies => self
                .conn
                .prepare("SELECT movie_id, category_id FROM movie_category")?,
            CategoryKind::Series | CategoryKind::Anime => self.conn.prepare(
                "SELECT sc.series_id, sc.category_id FROM series_category sc
                 JOIN category c ON c.id = sc.category_id
                 WHERE c.kind = ?1",
            )?,
        };
        let map = |row: &Row<'_>| Ok((row.get(0)?, row.get(1)?));
        let links = if kind == CategoryKind::Movies {
            stmt.query_map([], map)?.collect::<Result<HashSet<_>, _>>()?
        } else {
            stmt.query_map(params![kind.as_db_str()], map)?
                .collect::<Result<HashSet<_>, _>>()?
        };
        Ok(links)
    }

    /// Insert only `added` and delete only `removed`.
    pub fn apply_category_diff(
        &self,
        kind: CategoryKind,
        added: &[CategoryLink],
        removed: &[CategoryLink],
    ) -> Result<(), CoreError> {
        let (insert_sql, delete_sql) = match kind {
            CategoryKind::Movies => (
                "INSERT OR IGNORE INTO movie_category (movie_id, category_id) VALUES (?1, ?2)",
                "DELETE FROM movie_category WHERE movie_id = ?1 AND category_id = ?2",
            ),
            CategoryKind::Series | CategoryKind::Anime => (
                "INSERT OR IGNORE INTO series_category (series_id, category_id) VALUES (?1, ?2)",
                "DELETE FROM series_category WHERE series_id = ?1 AND category_id = ?2",
            ),
        };

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut insert = tx.prepare(insert_sql)?;
            for (media_id, category_id) in added {
                insert.execute(params![media_id, category_id])?;
            }
            let mut delete = tx.prepare(delete_sql)?;
            for (media_id, category_id) in removed {
                delete.execute(params![media_id, category_id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ── Signed URLs ─────────────────────────────────────────────

    /// Remote file path behind an entity, if it still exists.
    pub fn remote_path(&self, key: EntityKey) -> Result<Option<String>, CoreError> {
        let sql = match key.kind {
            EntityKind::Movie => "SELECT file_path FROM movie WHERE id = ?1",
            EntityKind::Episode => "SELECT file_path FROM episode WHERE id = ?1",
        };
        self.conn
            .query_row(sql, params![key.id], |row| row.get(0))
            .optional()
            .map_err(Into::into)
    }

    pub fn save_signed_url(
        &self,
        key: EntityKey,
        url: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.conn.execute(
            "INSERT INTO signed_url (entity_kind, entity_id, url, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(entity_kind, entity_id) DO UPDATE SET
                url = excluded.url, expires_at = excluded.expires_at,
                fetched_at = datetime('now')",
            params![key.kind.as_db_str(), key.id, url, expires_at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Last persisted URL for an entity, expired or not.
    pub fn load_signed_url(&self, key: EntityKey) -> Result<Option<StoredUrl>, CoreError> {
        self.conn
            .query_row(
                "SELECT url, expires_at FROM signed_url
                 WHERE entity_kind = ?1 AND entity_id = ?2",
                params![key.kind.as_db_str(), key.id],
                |row| {
                    let expires: String = row.get(1)?;
                    Ok(StoredUrl {
                        url: row.get(0)?,
                        expires_at: parse_datetime(&expires),
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn forget_signed_url(&self, key: EntityKey) -> Result<(), CoreError> {
        self.conn.execute(
            "DELETE FROM signed_url WHERE entity_kind = ?1 AND entity_id = ?2",
            params![key.kind.as_db_str(), key.id],
        )?;
        Ok(())
    }

    // ── Status ──────────────────────────────────────────────────

    pub fn counts(&self) -> Result<CatalogCounts, CoreError> {
        let count = |table: &str| -> Result<usize, CoreError> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(CatalogCounts {
            categories: count("category")?,
            movies: count("movie")?,
            series: count("series")?,
            seasons: count("season")?,
            episodes: count("episode")?,
            signed_urls: count("signed_url")?,
        })
    }
}

// ── Migrations ──────────────────────────────────────────────────

/// Run schema migrations using `PRAGMA user_version` for version tracking.
fn run_migrations(conn: &Connection) -> Result<(), CoreError> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        conn.execute_batch(SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", 1)?;
    }
    if version < 2 {
        conn.execute_batch(SCHEMA_V2)?;
        conn.pragma_update(None, "user_version", 2)?;
    }
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────

fn row_exists(conn: &Connection, table: &str, id: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        &format!("SELECT 1 FROM {table} WHERE id = ?1"),
        params![id],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

fn count_upsert(stats: &mut UpsertStats, existed: bool) {
    if existed {
        stats.updated += 1;
    } else {
        stats.inserted += 1;
    }
}

/// Replace the contents of the connection-local `keep_ids` table.
fn fill_keep_ids(conn: &Connection, ids: impl IntoIterator<Item = i64>) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TEMP TABLE IF NOT EXISTS keep_ids (id INTEGER PRIMARY KEY);
         DELETE FROM keep_ids;",
    )?;
    let mut stmt = conn.prepare("INSERT OR IGNORE INTO keep_ids (id) VALUES (?1)")?;
    for id in ids {
        stmt.execute(params![id])?;
    }
    Ok(())
}

/// Parse a datetime string from SQLite (RFC 3339 or `datetime('now')` format).
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return naive.and_utc();
    }
    DateTime::default()
}

// ── Row mapping helpers ─────────────────────────────────────────

fn release_at(row: &Row<'_>, off: usize) -> rusqlite::Result<ReleaseInfo> {
    Ok(ReleaseInfo {
        quality: row.get(off)?,
        source: row.get(off + 1)?,
        codec: row.get(off + 2)?,
        release_group: row.get(off + 3)?,
        is_dual_audio: row.get(off + 4)?,
    })
}

fn row_to_movie(row: &Row<'_>) -> rusqlite::Result<MovieRecord> {
    let modified: Option<String> = row.get(13)?;
    Ok(MovieRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        original_title: row.get(2)?,
        year: row.get(3)?,
        folder_path: row.get(4)?,
        file_path: row.get(5)?,
        file_name: row.get(6)?,
        size: row.get::<_, Option<i64>>(7)?.map(|s| s as u64),
        release: release_at(row, 8)?,
        modified_at: modified.as_deref().map(parse_datetime),
    })
}

fn row_to_season(row: &Row<'_>) -> rusqlite::Result<SeasonRecord> {
    Ok(SeasonRecord {
        id: row.get(0)?,
        series_id: row.get(1)?,
        number: row.get(2)?,
        name: row.get(3)?,
        folder_path: row.get(4)?,
        is_release: row.get(5)?,
        release: release_at(row, 6)?,
        score: row.get(11)?,
    })
}

fn row_to_episode(row: &Row<'_>) -> rusqlite::Result<EpisodeRecord> {
    Ok(EpisodeRecord {
        id: row.get(0)?,
        season_id: row.get(1)?,
        series_id: row.get(2)?,
        number: row.get(3)?,
        title: row.get(4)?,
        file_name: row.get(5)?,
        file_path: row.get(6)?,
        size: row.get::<_, Option<i64>>(7)?.map(|s| s as u64),
        release: release_at(row, 8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: i64, kind: CategoryKind) -> Category {
        Category {
            id,
            name: format!("Category {id}"),
            kind,
            path: format!("/1:/root/{id}/"),
        }
    }

    fn movie(id: i64, title: &str) -> MovieRecord {
        MovieRecord {
            id,
            title: title.into(),
            original_title: None,
            year: Some(2009),
            folder_path: format!("/1:/Filmes/{title}/"),
            file_path: format!("/1:/Filmes/{title}/{title}.mkv"),
            file_name: format!("{title}.mkv"),
            size: Some(8_151_248_076),
            release: ReleaseInfo {
                quality: Some("1080p".into()),
                ..ReleaseInfo::default()
            },
            modified_at: None,
        }
    }

    fn series(id: i64) -> SeriesRecord {
        SeriesRecord {
            id,
            kind: CategoryKind::Series,
            title: "Dark".into(),
            original_title: None,
            year: Some(2017),
            format: None,
            folder_path: "/1:/Series/Dark/".into(),
        }
    }

    fn season(id: i64, series_id: i64, number: u32) -> SeasonRecord {
        SeasonRecord {
            id,
            series_id,
            number,
            name: format!("Season {number}"),
            folder_path: format!("/1:/Series/Dark/Season {number}/"),
            is_release: false,
            release: ReleaseInfo::default(),
            score: 0,
        }
    }

    fn episode(id: i64, season_id: i64, series_id: i64, number: u32) -> EpisodeRecord {
        EpisodeRecord {
            id,
            season_id,
            series_id,
            number,
            title: None,
            file_name: format!("Dark.S01E{number:02}.mkv"),
            file_path: format!("/1:/Series/Dark/Season 1/Dark.S01E{number:02}.mkv"),
            size: None,
            release: ReleaseInfo::default(),
        }
    }

    #[test]
    fn test_upsert_movies_preserves_identity() {
        let db = Storage::open_memory().unwrap();
        let stats = db.upsert_movies(&[movie(1, "Avatar"), movie(2, "Up")]).unwrap();
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.updated, 0);

        let mut changed = movie(1, "Avatar");
        changed.title = "Avatar (Extended)".into();
        let stats = db.upsert_movies(&[changed]).unwrap();
        assert_eq!(stats.inserted, 0);
        assert_eq!(stats.updated, 1);

        let stored = db.get_movie(1).unwrap().unwrap();
        assert_eq!(stored.title, "Avatar (Extended)");
        assert_eq!(stored.size, Some(8_151_248_076));
        assert_eq!(stored.release.quality.as_deref(), Some("1080p"));
    }

    #[test]
    fn test_delete_movies_not_in_cascades() {
        let db = Storage::open_memory().unwrap();
        db.upsert_categories(&[category(10, CategoryKind::Movies)]).unwrap();
        db.upsert_movies(&[movie(1, "Avatar"), movie(2, "Up")]).unwrap();
        db.apply_category_diff(CategoryKind::Movies, &[(1, 10), (2, 10)], &[])
            .unwrap();
        db.save_signed_url(EntityKey::movie(2), "https://x/up", Utc::now())
            .unwrap();

        let deleted = db.delete_movies_not_in(&[1]).unwrap();
        assert_eq!(deleted, 1);
        assert!(db.get_movie(2).unwrap().is_none());
        assert_eq!(
            db.category_links(CategoryKind::Movies).unwrap(),
            HashSet::from([(1, 10)])
        );
        assert!(db.load_signed_url(EntityKey::movie(2)).unwrap().is_none());
    }

    #[test]
    fn test_replace_series_detail() {
        let db = Storage::open_memory().unwrap();
        db.upsert_series(&[series(100)]).unwrap();

        let detail = SeriesDetail {
            seasons: vec![season(200, 100, 1), season(201, 100, 2)],
            episodes: vec![
                episode(300, 200, 100, 1),
                episode(301, 200, 100, 2),
                episode(302, 201, 100, 1),
            ],
        };
        let stats = db.replace_series_detail(100, &detail, true).unwrap();
        assert_eq!(stats.inserted, 5);
        assert_eq!(stats.deleted, 0);

        let stats = db.replace_series_detail(100, &detail, true).unwrap();
        assert_eq!(stats.inserted, 0);
        assert_eq!(stats.updated, 5);

        let smaller = SeriesDetail {
            seasons: vec![season(200, 100, 1)],
            episodes: vec![episode(300, 200, 100, 1)],
        };
        let stats = db.replace_series_detail(100, &smaller, false).unwrap();
        assert_eq!(stats.deleted, 0);
        assert_eq!(db.counts().unwrap().episodes, 3);

        let stats = db.replace_series_detail(100, &smaller, true).unwrap();
        // Two episodes plus season 2.
        assert_eq!(stats.deleted, 3);
        assert_eq!(db.seasons_for(100).unwrap().len(), 1);
        assert_eq!(db.episodes_for(200).unwrap().len(), 1);
        assert_eq!(db.counts().unwrap().episodes, 1);
    }

    #[test]
    fn test_delete_series_cascades_to_episodes() {
        let db = Storage::open_memory().unwrap();
        db.upsert_series(&[series(100)]).unwrap();
        db.replace_series_detail(
            100,
            &SeriesDetail {
                seasons: vec![season(200, 100, 1)],
                episodes: vec![episode(300, 200, 100, 1)],
            },
            true,
        )
        .unwrap();

        // Anime of the same pass must not be touched by a series cleanup.
        let mut anime = series(101);
        anime.kind = CategoryKind::Anime;
        anime.folder_path = "/1:/Anime/Frieren/".into();
        db.upsert_series(&[anime]).unwrap();

        let deleted = db.delete_series_not_in(CategoryKind::Series, &[]).unwrap();
        assert_eq!(deleted, 1);
        let counts = db.counts().unwrap();
        assert_eq!(counts.series, 1);
        assert_eq!(counts.seasons, 0);
        assert_eq!(counts.episodes, 0);
    }

    #[test]
    fn test_category_diff() {
        let db = Storage::open_memory().unwrap();
        db.upsert_categories(&[
            category(10, CategoryKind::Series),
            category(11, CategoryKind::Series),
            category(12, CategoryKind::Anime),
        ])
        .unwrap();
        let mut anime = series(101);
        anime.kind = CategoryKind::Anime;
        db.upsert_series(&[series(100), anime]).unwrap();

        db.apply_category_diff(CategoryKind::Series, &[(100, 10), (100, 11)], &[])
            .unwrap();
        db.apply_category_diff(CategoryKind::Anime, &[(101, 12)], &[])
            .unwrap();
        db.apply_category_diff(CategoryKind::Series, &[], &[(100, 11)])
            .unwrap();

        assert_eq!(
            db.category_links(CategoryKind::Series).unwrap(),
            HashSet::from([(100, 10)])
        );
        assert_eq!(
            db.category_links(CategoryKind::Anime).unwrap(),
            HashSet::from([(101, 12)])
        );
    }

    #[test]
    fn test_signed_urls() {
        let db = Storage::open_memory().unwrap();
        db.upsert_movies(&[movie(1, "Avatar")]).unwrap();
        let key = EntityKey::movie(1);

        assert_eq!(
            db.remote_path(key).unwrap().as_deref(),
            Some("/1:/Filmes/Avatar/Avatar.mkv")
        );
        assert_eq!(db.remote_path(EntityKey::episode(1)).unwrap(), None);

        let expires = DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        db.save_signed_url(key, "https://cdn/a", expires).unwrap();
        db.save_signed_url(key, "https://cdn/b", expires).unwrap();

        let stored = db.load_signed_url(key).unwrap().unwrap();
        assert_eq!(stored.url, "https://cdn/b");
        assert_eq!(stored.expires_at, expires);

        db.forget_signed_url(key).unwrap();
        assert!(db.load_signed_url(key).unwrap().is_none());
    }

    #[test]
    fn test_reopen_runs_migrations_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gindex.db");
        {
            let db = Storage::open(&path).unwrap();
            db.upsert_movies(&[movie(1, "Avatar")]).unwrap();
        }
        let db = Storage::open(&path).unwrap();
        assert_eq!(db.counts().unwrap().movies, 1);
    }
}
