use regex::Regex;
use std::sync::LazyLock;

use super::normalize_display;
use crate::elements::{AnimeFolderMetadata, AnimeKind, ParsedTitleMetadata};

// ── Regex patterns ──────────────────────────────────────────────

/// "A Hora do Mal [Weapons] (2025)".
static RE_DISPLAY_ORIGINAL_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)\s*\[([^\]]+)\]\s*\((\d{4})\)\s*$").unwrap()
});

/// "Avatar (2009)".
static RE_DISPLAY_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*\((\d{4})\)\s*$").unwrap());

/// Advisory item count appended to category folders: "Ação (152)".
static RE_COUNT_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s*\(\d+\)\s*$").unwrap());

static RE_LEADING_ORIGINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[([^\]]+)\]\s*(.*)$").unwrap());

static RE_TRAILING_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s*\((\d{4})\)\s*$").unwrap());

static RE_TRAILING_KIND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(.*?)\s*\((TV|OVA|ONA|Movie)\)\s*$").unwrap());

/// "2nd Season", "3rd Season".
static RE_NTH_SEASON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(.*?)\s+(\d{1,2})(?:st|nd|rd|th)\s+Season$").unwrap());

/// "Season 2".
static RE_SEASON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(.*?)\s+Season\s+(\d{1,2})$").unwrap());

/// "Part 2".
static RE_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(.*?)\s+Part\s+(\d{1,2})$").unwrap());

/// Bare trailing number: "Overlord 4".
static RE_BARE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s+(\d{1,2})$").unwrap());

/// Parse a movie or series title folder.
///
/// Tries "Display [Original] (Year)", then "Display (Year)", then falls
/// back to the bare name.
pub fn parse_movie_folder(name: &str) -> ParsedTitleMetadata {
    let name = normalize_display(name);

    if let Some(caps) = RE_DISPLAY_ORIGINAL_YEAR.captures(&name) {
        return ParsedTitleMetadata {
            display_name: caps[1].trim().to_string(),
            original_name: Some(caps[2].trim().to_string()),
            year: caps[3].parse().ok(),
        };
    }

    if let Some(caps) = RE_DISPLAY_YEAR.captures(&name) {
        return ParsedTitleMetadata {
            display_name: caps[1].trim().to_string(),
            original_name: None,
            year: caps[2].parse().ok(),
        };
    }

    ParsedTitleMetadata {
        display_name: name,
        original_name: None,
        year: None,
    }
}

/// Parse an anime title folder.
///
/// Each step consumes its match and hands the remainder to the next:
/// leading "[Original]", trailing "(Year)", trailing "(TV|OVA|ONA|Movie)",
/// then a trailing season indicator.
pub fn parse_anime_folder(name: &str) -> AnimeFolderMetadata {
    let mut rest = normalize_display(name);
    let mut original_name = None;
    let mut year = None;
    let mut kind = None;

    if let Some(caps) = RE_LEADING_ORIGINAL.captures(&rest) {
        original_name = Some(caps[1].trim().to_string());
        rest = caps[2].trim().to_string();
    }

    if let Some(caps) = RE_TRAILING_YEAR.captures(&rest) {
        year = caps[2].parse().ok();
        rest = caps[1].trim().to_string();
    }

    if let Some(caps) = RE_TRAILING_KIND.captures(&rest) {
        kind = AnimeKind::from_tag(&caps[2]);
        rest = caps[1].trim().to_string();
    }

    let (rest, season) = match extract_trailing_season(&rest) {
        Some((remaining, number)) => (remaining, Some(number)),
        None => (rest, None),
    };

    let display_name = if rest.is_empty() {
        original_name.clone().unwrap_or_else(|| normalize_display(name))
    } else {
        rest
    };

    AnimeFolderMetadata {
        display_name,
        original_name,
        year,
        kind,
        season,
    }
}

fn extract_trailing_season(text: &str) -> Option<(String, u32)> {
    [&RE_NTH_SEASON, &RE_SEASON_WORD, &RE_PART, &RE_BARE_NUMBER]
        .iter()
        .find_map(|re| {
            let caps = re.captures(text)?;
            let number: u32 = caps[2].parse().ok()?;
            Some((caps[1].trim().to_string(), number))
        })
}

/// Strip the advisory "(<count>)" suffix from a category folder name.
pub fn strip_count_suffix(name: &str) -> String {
    let name = normalize_display(name);
    match RE_COUNT_SUFFIX.captures(&name) {
        Some(caps) if !caps[1].trim().is_empty() => caps[1].trim().to_string(),
        _ => name,
    }
}
