use serde::{Deserialize, Serialize};

/// Metadata extracted from a movie or series title folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTitleMetadata {
    /// Localized display name (e.g., "A Hora do Mal").
    pub display_name: String,
    /// Original title from the bracketed block (e.g., "Weapons").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    /// Release year.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
}

/// Anime format tag found in a folder name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnimeKind {
    Tv,
    Ova,
    Ona,
    Movie,
}

impl AnimeKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_uppercase().as_str() {
            "TV" => Some(Self::Tv),
            "OVA" => Some(Self::Ova),
            "ONA" => Some(Self::Ona),
            "MOVIE" => Some(Self::Movie),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tv => "TV",
            Self::Ova => "OVA",
            Self::Ona => "ONA",
            Self::Movie => "Movie",
        }
    }
}

/// Metadata extracted from an anime title folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimeFolderMetadata {
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<AnimeKind>,
    /// Season from "2nd Season", "Season 2", "Part 2" or a bare trailing number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
}

/// Metadata extracted from an anime episode filename.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimeEpisodeMetadata {
    /// Release group from the leading bracket (e.g., "SubsPlease").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
    /// True when the number came from the "- NNN [" pattern rather than
    /// the trailing-number fallback.
    pub bracketed: bool,
    pub is_dual_audio: bool,
}

/// Quality metadata and ranking score for a release folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReleaseMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_group: Option<String>,
    pub is_dual_audio: bool,
    /// Weighted sum of quality, source, codec and dual-audio points.
    pub score: u32,
}

/// Metadata extracted from a dot-delimited movie release filename.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReleaseFile {
    /// Tokens before the year, joined with spaces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_group: Option<String>,
    pub is_dual_audio: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    /// Tokens that were not consumed by any rule, in order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remaining: Vec<String>,
}

/// Metadata extracted from an `S<NN>E<NN>` episode filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedEpisodeFile {
    pub series_name: String,
    pub season: u32,
    pub episode: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_title: Option<String>,
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
