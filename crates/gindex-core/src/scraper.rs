//! Walks the remote hierarchy and turns listings into catalog records.
//!
//! ```text
//! root → category → title ─┬→ video file                  (movie)
//!                          ├→ subfolder → video file      (movie, one level)
//!                          ├→ video files                 (series season 1)
//!                          ├→ "Season N" → episode files
//!                          └→ release folder → episode files
//! ```
//!
//! Every listing is preceded by a pacer wait. A failed branch is logged
//! and skipped; only the caller decides whether a failure is fatal.

use std::sync::Arc;

use gindex_api::{ApiError, FolderPages, IndexClient, RemoteEntry, RequestPacer};
use gindex_parse::parser::season;
use gindex_parse::{
    is_video_file, normalize_display, parse_anime_episode, parse_anime_folder,
    parse_episode_name, parse_movie_folder, parse_release_filename, parse_release_folder,
    stable_id, strip_count_suffix,
};
use tracing::{debug, warn};

use crate::config::RootConfig;
use crate::models::{
    Category, CategoryKind, EpisodeRecord, MovieRecord, ReleaseInfo, SeasonRecord, SeriesDetail,
    SeriesRecord,
};

/// Seasons and episodes found below one series.
#[derive(Debug, Clone, Default)]
pub struct ScrapedDetail {
    pub detail: SeriesDetail,
    /// Season or release folders whose listing failed.
    pub skipped_branches: usize,
}

impl ScrapedDetail {
    /// True when every branch below the series was listed.
    pub fn is_complete(&self) -> bool {
        self.skipped_branches == 0
    }
}

pub struct Scraper {
    client: Arc<IndexClient>,
    pacer: Arc<RequestPacer>,
}

impl Scraper {
    pub fn new(client: Arc<IndexClient>, pacer: Arc<RequestPacer>) -> Self {
        Self { client, pacer }
    }

    pub fn client(&self) -> &Arc<IndexClient> {
        &self.client
    }

    /// Category folders directly under a configured root.
    pub async fn list_categories(&self, root: &RootConfig) -> Result<Vec<Category>, ApiError> {
        let entries = self.list(&root.path).await?;
        Ok(entries
            .into_iter()
            .filter(RemoteEntry::is_folder)
            .map(|entry| Category {
                id: stable_id(&entry.path),
                name: strip_count_suffix(&entry.name),
                kind: root.kind,
                path: entry.path,
            })
            .collect())
    }

    /// Page-by-page cursor over the title folders of a category.
    pub fn title_pages<'a>(&'a self, category: &Category) -> TitlePages<'a> {
        let endpoint = self.client.endpoints().select();
        TitlePages {
            pacer: &self.pacer,
            pages: self.client.pages(&endpoint, &category.path),
            started: false,
        }
    }

    /// Resolve the playable file of a movie title folder.
    ///
    /// Uses the first video file in the folder; without one, probes each
    /// direct subfolder (never deeper). `Ok(None)` means nothing playable.
    pub async fn scrape_movie(&self, title: &RemoteEntry) -> Result<Option<MovieRecord>, ApiError> {
        let entries = self.list(&title.path).await?;
        if let Some(file) = first_video(&entries) {
            return Ok(Some(movie_record(title, file)));
        }

        for sub in entries.iter().filter(|e| e.is_folder()) {
            match self.list(&sub.path).await {
                Ok(children) => {
                    if let Some(file) = first_video(&children) {
                        return Ok(Some(movie_record(title, file)));
                    }
                }
                Err(e) => warn!(path = %sub.path, error = %e, "skipping movie subfolder"),
            }
        }

        debug!(path = %title.path, "no playable file in movie folder");
        Ok(None)
    }

    /// List the seasons, releases and episodes below a series.
    ///
    /// Fails only when the series folder itself cannot be listed.
    pub async fn scrape_series_detail(
        &self,
        series: &SeriesRecord,
    ) -> Result<ScrapedDetail, ApiError> {
        let entries = self.list(&series.folder_path).await?;
        let mut out = ScrapedDetail::default();

        let loose = videos(&entries);
        if !loose.is_empty() {
            let flat = SeasonRecord {
                id: stable_id(&format!("{}#1", series.folder_path)),
                series_id: series.id,
                number: 1,
                name: "Season 1".into(),
                folder_path: series.folder_path.clone(),
                is_release: false,
                release: ReleaseInfo::default(),
                score: 0,
            };
            out.detail
                .episodes
                .extend(episode_records(series, &flat, &loose));
            out.detail.seasons.push(flat);
        }

        let mut seasons = Vec::new();
        let mut releases = Vec::new();
        for folder in entries.iter().filter(|e| e.is_folder()) {
            match season::marked_season(&folder.name) {
                Some(number) => seasons.push((number, folder)),
                None => releases.push((parse_release_folder(&folder.name), folder)),
            }
        }
        // Best release first; ties keep a stable order.
        releases.sort_by(|a, b| {
            b.0.score
                .cmp(&a.0.score)
                .then_with(|| a.1.name.cmp(&b.1.name))
        });

        for (number, folder) in seasons {
            let record = SeasonRecord {
                id: stable_id(&folder.path),
                series_id: series.id,
                number,
                name: normalize_display(&folder.name),
                folder_path: folder.path.clone(),
                is_release: false,
                release: ReleaseInfo::default(),
                score: 0,
            };
            self.collect_season(series, record, &mut out).await;
        }

        for (rank, (meta, folder)) in releases.into_iter().enumerate() {
            let record = SeasonRecord {
                id: stable_id(&folder.path),
                series_id: series.id,
                number: rank as u32 + 1,
                name: normalize_display(&folder.name),
                folder_path: folder.path.clone(),
                is_release: true,
                release: ReleaseInfo {
                    quality: meta.quality,
                    source: meta.source,
                    codec: meta.codec,
                    release_group: meta.release_group,
                    is_dual_audio: meta.is_dual_audio,
                },
                score: meta.score,
            };
            self.collect_season(series, record, &mut out).await;
        }

        Ok(out)
    }

    async fn collect_season(&self, series: &SeriesRecord, season: SeasonRecord, out: &mut ScrapedDetail) {
        match self.list(&season.folder_path).await {
            Ok(children) => {
                let files = videos(&children);
                if files.is_empty() {
                    debug!(path = %season.folder_path, "season folder has no episodes");
                    return;
                }
                out.detail
                    .episodes
                    .extend(episode_records(series, &season, &files));
                out.detail.seasons.push(season);
            }
            Err(e) => {
                warn!(path = %season.folder_path, error = %e, "skipping season folder");
                out.skipped_branches += 1;
            }
        }
    }

    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, ApiError> {
        self.pacer.wait().await;
        let endpoint = self.client.endpoints().select();
        self.client.list_folder_all(&endpoint, path).await
    }
}

/// Title folders of one category, one listing page at a time.
pub struct TitlePages<'a> {
    pacer: &'a RequestPacer,
    pages: FolderPages<'a>,
    started: bool,
}

impl TitlePages<'_> {
    /// Folders of the next page, or `None` once the listing is drained.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<RemoteEntry>>, ApiError> {
        if !self.started {
            self.started = true;
            self.pacer.wait().await;
        }
        Ok(self.pages.next_page().await?.map(|page| {
            page.entries
                .into_iter()
                .filter(RemoteEntry::is_folder)
                .collect()
        }))
    }
}

/// Build the series record for a title folder. No network access.
pub fn series_record(entry: &RemoteEntry, kind: CategoryKind) -> SeriesRecord {
    let id = stable_id(&entry.path);
    match kind {
        CategoryKind::Anime => {
            let meta = parse_anime_folder(&entry.name);
            SeriesRecord {
                id,
                kind,
                title: meta.display_name,
                original_title: meta.original_name,
                year: meta.year,
                format: meta.kind.map(|k| k.as_str().to_string()),
                folder_path: entry.path.clone(),
            }
        }
        CategoryKind::Series | CategoryKind::Movies => {
            let meta = parse_movie_folder(&entry.name);
            SeriesRecord {
                id,
                kind,
                title: meta.display_name,
                original_title: meta.original_name,
                year: meta.year,
                format: None,
                folder_path: entry.path.clone(),
            }
        }
    }
}

fn first_video(entries: &[RemoteEntry]) -> Option<&RemoteEntry> {
    entries
        .iter()
        .find(|e| e.is_file() && is_video_file(&e.name))
}

/// Video files sorted by name.
fn videos(entries: &[RemoteEntry]) -> Vec<&RemoteEntry> {
    let mut files: Vec<&RemoteEntry> = entries
        .iter()
        .filter(|e| e.is_file() && is_video_file(&e.name))
        .collect();
    files.sort_by(|a, b| a.name.cmp(&b.name));
    files
}

fn movie_record(title: &RemoteEntry, file: &RemoteEntry) -> MovieRecord {
    let folder = parse_movie_folder(&title.name);
    let release = parse_release_filename(&file.name);
    let display = if folder.display_name.is_empty() {
        release
            .title
            .clone()
            .unwrap_or_else(|| normalize_display(&title.name))
    } else {
        folder.display_name
    };

    MovieRecord {
        id: stable_id(&title.path),
        title: display,
        original_title: folder.original_name,
        year: folder.year.or(release.year),
        folder_path: title.path.clone(),
        file_path: file.path.clone(),
        file_name: file.name.clone(),
        size: file.size,
        release: ReleaseInfo {
            quality: release.quality,
            source: release.source,
            codec: release.codec,
            release_group: release.release_group,
            is_dual_audio: release.is_dual_audio,
        },
        modified_at: file.modified_at,
    }
}

/// Number each file: explicit `SxxEyy` marker, then the anime "- NN ["
/// pattern, then (anime only) a trailing number, then list position.
fn episode_records(
    series: &SeriesRecord,
    season: &SeasonRecord,
    files: &[&RemoteEntry],
) -> Vec<EpisodeRecord> {
    files
        .iter()
        .enumerate()
        .map(|(pos, file)| {
            let scene = parse_episode_name(&file.name);
            let anime = parse_anime_episode(&file.name);

            let number = scene
                .as_ref()
                .map(|s| s.episode)
                .or(anime.episode.filter(|_| anime.bracketed))
                .or(anime
                    .episode
                    .filter(|_| series.kind == CategoryKind::Anime))
                .unwrap_or(pos as u32 + 1);

            let (title, release) = match scene {
                Some(s) => (
                    s.episode_title,
                    ReleaseInfo {
                        quality: s.quality,
                        source: s.source,
                        codec: s.codec,
                        release_group: s.release_group.or(anime.release_group),
                        is_dual_audio: s.is_dual_audio || anime.is_dual_audio,
                    },
                ),
                None => {
                    let parsed = parse_release_filename(&file.name);
                    (
                        None,
                        ReleaseInfo {
                            quality: parsed.quality,
                            source: parsed.source,
                            codec: parsed.codec,
                            release_group: anime.release_group.or(parsed.release_group),
                            is_dual_audio: parsed.is_dual_audio || anime.is_dual_audio,
                        },
                    )
                }
            };

            EpisodeRecord {
                id: stable_id(&file.path),
                season_id: season.id,
                series_id: series.id,
                number,
                title,
                file_name: file.name.clone(),
                file_path: file.path.clone(),
                size: file.size,
                release,
            }
        })
        .collect()
}
