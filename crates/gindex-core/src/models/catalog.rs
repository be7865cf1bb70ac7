use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a configured root (and every category under it) holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Movies,
    Series,
    Anime,
}

impl CategoryKind {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Movies => "movies",
            Self::Series => "series",
            Self::Anime => "anime",
        }
    }
}

impl std::fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// A genre/collection folder directly under a configured root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    /// Display name with the advisory "(count)" suffix removed.
    pub name: String,
    pub kind: CategoryKind,
    pub path: String,
}

/// Quality tags shared by movies, releases and episodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_group: Option<String>,
    pub is_dual_audio: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieRecord {
    /// `stable_id(folder_path)`.
    pub id: i64,
    pub title: String,
    pub original_title: Option<String>,
    pub year: Option<u32>,
    pub folder_path: String,
    /// The playable file chosen for this movie.
    pub file_path: String,
    pub file_name: String,
    pub size: Option<u64>,
    pub release: ReleaseInfo,
    pub modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesRecord {
    /// `stable_id(folder_path)`.
    pub id: i64,
    /// Series or anime.
    pub kind: CategoryKind,
    pub title: String,
    pub original_title: Option<String>,
    pub year: Option<u32>,
    /// Anime format tag ("TV", "OVA", ...), when the folder carries one.
    pub format: Option<String>,
    pub folder_path: String,
}

/// A season folder, or an alternative release stored like one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonRecord {
    pub id: i64,
    pub series_id: i64,
    /// Season number; for releases, the rank among siblings (1 = best).
    pub number: u32,
    pub name: String,
    pub folder_path: String,
    pub is_release: bool,
    pub release: ReleaseInfo,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    /// `stable_id(file_path)`.
    pub id: i64,
    pub season_id: i64,
    pub series_id: i64,
    pub number: u32,
    pub title: Option<String>,
    pub file_name: String,
    pub file_path: String,
    pub size: Option<u64>,
    pub release: ReleaseInfo,
}

/// Everything below one series, replaced as a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesDetail {
    pub seasons: Vec<SeasonRecord>,
    pub episodes: Vec<EpisodeRecord>,
}

/// Insert/update counters from an upsert batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl UpsertStats {
    pub fn merge(&mut self, other: UpsertStats) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.deleted += other.deleted;
    }
}

/// Row counts, for status output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogCounts {
    pub categories: usize,
    pub movies: usize,
    pub series: usize,
    pub seasons: usize,
    pub episodes: usize,
    pub signed_urls: usize,
}
