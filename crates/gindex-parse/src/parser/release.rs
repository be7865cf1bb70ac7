use regex::Regex;
use std::sync::LazyLock;

use super::split_extension;
use crate::elements::{ParsedReleaseFile, ParsedReleaseMetadata};
use crate::keyword::{
    self, KeywordKind, KeywordScope, Tier, CODEC_TIERS, DUAL_AUDIO_POINTS, QUALITY_TIERS,
    SOURCE_TIERS,
};

/// First parenthesized block: "(Judas)".
static RE_PARENTHESIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]+)\)").unwrap());

// ── Release folders ─────────────────────────────────────────────

/// Score a release folder such as "Erai-raws (1080p) BD HEVC Dual Audio".
///
/// Keywords match case-insensitively on word boundaries; within each table
/// the best tier wins. The score is only meaningful relative to sibling
/// releases of the same title.
pub fn parse_release_folder(name: &str) -> ParsedReleaseMetadata {
    let upper = name.to_uppercase();

    let quality = best_tier(&upper, QUALITY_TIERS);
    let source = best_tier(&upper, SOURCE_TIERS);
    let codec = best_tier(&upper, CODEC_TIERS);
    let is_dual_audio = upper.contains("DUAL");

    let score = keyword::points(QUALITY_TIERS, quality)
        + keyword::points(SOURCE_TIERS, source)
        + keyword::points(CODEC_TIERS, codec)
        + if is_dual_audio { DUAL_AUDIO_POINTS } else { 0 };

    tracing::trace!(name, score, "Scored release folder");

    ParsedReleaseMetadata {
        quality: quality.map(str::to_string),
        source: source.map(str::to_string),
        codec: codec.map(str::to_string),
        release_group: folder_release_group(name),
        is_dual_audio,
        score,
    }
}

fn best_tier(upper: &str, tiers: &[Tier]) -> Option<&'static str> {
    tiers
        .iter()
        .find(|tier| tier.aliases.iter().any(|alias| contains_keyword(upper, alias)))
        .map(|tier| tier.canonical)
}

/// True when `keyword` occurs in `haystack` with no alphanumeric neighbours.
fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    haystack.match_indices(keyword).any(|(start, matched)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Leading text before the first "(" or "-", else the first parenthesized block.
fn folder_release_group(name: &str) -> Option<String> {
    if let Some(cut) = name.find(['(', '-']) {
        let lead = name[..cut].trim();
        if !lead.is_empty() {
            return Some(lead.to_string());
        }
    }
    RE_PARENTHESIZED
        .captures(name)
        .map(|caps| caps[1].trim().to_string())
        .filter(|group| !group.is_empty())
}

// ── Release filenames ───────────────────────────────────────────

/// Result of classifying the dot-delimited tokens of a release name.
#[derive(Debug, Default)]
pub(crate) struct TokenScan {
    pub year: Option<u32>,
    pub year_index: Option<usize>,
    pub quality: Option<&'static str>,
    pub source: Option<&'static str>,
    pub codec: Option<&'static str>,
    pub is_dual_audio: bool,
    /// Unconsumed tokens with their original positions.
    pub remaining: Vec<(usize, String)>,
}

/// Classify tokens by exact match against the keyword tables.
///
/// Quality, source and codec tokens are removed from the stream; the
/// first match of each kind wins.
pub(crate) fn scan_tokens(body: &str) -> TokenScan {
    let mut scan = TokenScan::default();

    for (index, token) in body.split('.').filter(|t| !t.is_empty()).enumerate() {
        if scan.year.is_none() {
            if let Some(year) = as_year(token) {
                scan.year = Some(year);
                scan.year_index = Some(index);
                continue;
            }
        }

        if token.eq_ignore_ascii_case("DUAL") {
            scan.is_dual_audio = true;
            continue;
        }

        if let Some(entry) = keyword::lookup(token, KeywordScope::FILENAME) {
            let slot = match entry.kind {
                KeywordKind::Quality => &mut scan.quality,
                KeywordKind::Source => &mut scan.source,
                KeywordKind::Codec => &mut scan.codec,
            };
            if slot.is_none() {
                *slot = Some(entry.canonical);
            }
            continue;
        }

        scan.remaining.push((index, token.to_string()));
    }

    scan
}

fn as_year(token: &str) -> Option<u32> {
    if token.len() != 4 || !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    token.parse().ok().filter(|y| (1900..=2100).contains(y))
}

/// Split a trailing "-GROUP" off the last dot-token of a release stem.
///
/// Dashes that belong to a keyword ("WEB-DL") are not group separators.
pub(crate) fn split_release_group(stem: &str) -> (String, Option<String>) {
    let (head, last) = match stem.rsplit_once('.') {
        Some((head, last)) => (Some(head), last),
        None => (None, stem),
    };

    if keyword::lookup(last, KeywordScope::FILENAME).is_some() {
        return (stem.to_string(), None);
    }

    match last.rsplit_once('-') {
        Some((token, group)) if !group.is_empty() && !group.contains(' ') => {
            let body = match head {
                Some(head) if token.is_empty() => head.to_string(),
                Some(head) => format!("{head}.{token}"),
                None => token.to_string(),
            };
            (body, Some(group.to_string()))
        }
        _ => (stem.to_string(), None),
    }
}

/// Parse a dot-delimited movie release filename such as
/// "Avatar.2009.1080p.BluRay.DUAL.x264-GROUP.mkv".
pub fn parse_release_filename(filename: &str) -> ParsedReleaseFile {
    let (stem, extension) = split_extension(filename);
    let (body, release_group) = split_release_group(stem);
    let scan = scan_tokens(&body);

    let title = scan.year_index.and_then(|year_index| {
        let words: Vec<&str> = scan
            .remaining
            .iter()
            .filter(|(index, _)| *index < year_index)
            .map(|(_, token)| token.as_str())
            .collect();
        (!words.is_empty()).then(|| words.join(" "))
    });

    ParsedReleaseFile {
        title,
        year: scan.year,
        quality: scan.quality.map(str::to_string),
        source: scan.source.map(str::to_string),
        codec: scan.codec.map(str::to_string),
        release_group,
        is_dual_audio: scan.is_dual_audio,
        extension: extension.map(str::to_string),
        remaining: scan.remaining.into_iter().map(|(_, token)| token).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_scoring() {
        let parsed = parse_release_folder("Erai-raws (1080p) BD HEVC Dual Audio");
        assert_eq!(parsed.quality.as_deref(), Some("1080p"));
        assert_eq!(parsed.source.as_deref(), Some("BluRay"));
        assert_eq!(parsed.codec.as_deref(), Some("HEVC"));
        assert!(parsed.is_dual_audio);
        assert_eq!(parsed.release_group.as_deref(), Some("Erai"));
        assert_eq!(parsed.score, 30 + 20 + 10 + 15);
    }

    #[test]
    fn test_folder_ranking() {
        let remux = parse_release_folder("Judas (2160p) BDRemux x265");
        let web = parse_release_folder("SubsPlease (1080p) WEB-DL x264");
        let bare = parse_release_folder("Releases");
        assert!(remux.score > web.score);
        assert!(web.score > bare.score);
        assert_eq!(bare.score, 0);
        assert_eq!(remux.source.as_deref(), Some("BDRemux"));
    }

    #[test]
    fn test_folder_keyword_boundaries() {
        // "BD" inside a word is not a source tag.
        let parsed = parse_release_folder("ABDUL Collection");
        assert_eq!(parsed.source, None);
        let parsed = parse_release_folder("Show [4K]");
        assert_eq!(parsed.quality.as_deref(), Some("2160p"));
    }

    #[test]
    fn test_folder_group_from_parentheses() {
        let parsed = parse_release_folder("(Judas) 1080p");
        assert_eq!(parsed.release_group.as_deref(), Some("Judas"));
        assert_eq!(parse_release_folder("SubsPlease 1080p").release_group, None);
    }

    #[test]
    fn test_release_filename() {
        let parsed = parse_release_filename("Avatar.2009.1080p.BluRay.DUAL.x264-GROUP.mkv");
        assert_eq!(parsed.title.as_deref(), Some("Avatar"));
        assert_eq!(parsed.year, Some(2009));
        assert_eq!(parsed.quality.as_deref(), Some("1080p"));
        assert_eq!(parsed.source.as_deref(), Some("BluRay"));
        assert_eq!(parsed.codec.as_deref(), Some("x264"));
        assert_eq!(parsed.release_group.as_deref(), Some("GROUP"));
        assert!(parsed.is_dual_audio);
        assert_eq!(parsed.extension.as_deref(), Some("mkv"));
        assert!(parsed.remaining.contains(&"Avatar".to_string()));
    }

    #[test]
    fn test_release_filename_year_bounds() {
        let parsed = parse_release_filename("Blade.Runner.2049.2017.2160p.WEB-DL.mkv");
        assert_eq!(parsed.year, Some(2049));
        assert_eq!(parsed.title.as_deref(), Some("Blade Runner"));

        let parsed = parse_release_filename("Movie.1850.720p.mkv");
        assert_eq!(parsed.year, None);
    }

    #[test]
    fn test_keyword_dash_is_not_group() {
        let parsed = parse_release_filename("Movie.2020.1080p.WEB-DL.mkv");
        assert_eq!(parsed.release_group, None);
        assert_eq!(parsed.source.as_deref(), Some("WEB-DL"));
    }

    #[test]
    fn test_split_release_group() {
        assert_eq!(
            split_release_group("A.2020.x264-ZMG"),
            ("A.2020.x264".to_string(), Some("ZMG".to_string()))
        );
        assert_eq!(split_release_group("A.2020"), ("A.2020".to_string(), None));
    }
}
