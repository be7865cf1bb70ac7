use regex::Regex;
use std::sync::LazyLock;

use super::release::{scan_tokens, split_release_group};
use super::{normalize_display, split_extension};
use crate::elements::{AnimeEpisodeMetadata, ParsedEpisodeFile};
use crate::keyword;

// ── Regex patterns ──────────────────────────────────────────────

/// "S01E01", "s2e105".
static RE_SEASON_EPISODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)S(\d{1,2})E(\d{1,3})").unwrap());

/// Leading "[Group]".
static RE_LEADING_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[([^\]]+)\]").unwrap());

/// "- 05 [1080p]".
static RE_DASH_BRACKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\s*(\d+)\s*\[").unwrap());

/// Number right before a period or the end of the stem.
static RE_TRAILING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+)(?:\.|$)").unwrap());

/// Parse a scene-style episode filename carrying an `S<NN>E<NN>` marker.
///
/// Returns `None` when the marker is absent. Text before the marker is the
/// series name; text after is tokenized like a release filename and any
/// non-technical leftovers become the episode title.
pub fn parse_episode_name(filename: &str) -> Option<ParsedEpisodeFile> {
    let (stem, _) = split_extension(filename);
    let caps = RE_SEASON_EPISODE.captures(stem)?;
    let marker = caps.get(0)?;

    let season: u32 = caps[1].parse().ok()?;
    let episode: u32 = caps[2].parse().ok()?;

    let series_name = normalize_display(&stem[..marker.start()].replace(['.', '_'], " "))
        .trim_end_matches([' ', '-'])
        .to_string();

    let after = stem[marker.end()..].trim_start_matches(['.', ' ', '-']);
    let (body, release_group) = split_release_group(after);
    let scan = scan_tokens(&body);

    let title_words: Vec<&str> = scan
        .remaining
        .iter()
        .map(|(_, token)| token.as_str())
        .filter(|token| !keyword::is_technical(token))
        .collect();
    let episode_title = (!title_words.is_empty()).then(|| title_words.join(" "));

    Some(ParsedEpisodeFile {
        series_name,
        season,
        episode,
        episode_title,
        quality: scan.quality.map(str::to_string),
        source: scan.source.map(str::to_string),
        codec: scan.codec.map(str::to_string),
        release_group,
        is_dual_audio: scan.is_dual_audio,
    })
}

/// Parse a fansub-style anime episode filename such as
/// "[SubsPlease] Sousou no Frieren - 05 [1080p].mkv".
pub fn parse_anime_episode(filename: &str) -> AnimeEpisodeMetadata {
    let release_group = RE_LEADING_GROUP
        .captures(filename)
        .map(|caps| caps[1].trim().to_string());

    let is_dual_audio = filename.to_lowercase().contains("dual");

    if let Some(caps) = RE_DASH_BRACKET.captures(filename) {
        return AnimeEpisodeMetadata {
            release_group,
            episode: caps[1].parse().ok(),
            bracketed: true,
            is_dual_audio,
        };
    }

    let (stem, _) = split_extension(filename);
    let stem = RE_LEADING_GROUP.replace(stem, "");
    let episode = RE_TRAILING_NUMBER
        .captures(&stem)
        .and_then(|caps| caps[1].parse().ok());

    AnimeEpisodeMetadata {
        release_group,
        episode,
        bracketed: false,
        is_dual_audio,
    }
}
