use bitflags::bitflags;
use phf::{phf_map, phf_set};

bitflags! {
    /// Where a keyword is allowed to match.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KeywordScope: u8 {
        /// Free-form release folder names ("Erai-raws (1080p) BD HEVC").
        const FOLDER = 0b0000_0001;
        /// Exact dot-delimited tokens of a release filename.
        /// Streaming tags such as "NF" only make sense here.
        const FILENAME = 0b0000_0010;
    }
}

/// The category a keyword belongs to, determining which field it populates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordKind {
    Quality,
    Source,
    Codec,
}

/// A keyword entry with its kind, canonical spelling and scope.
#[derive(Debug, Clone, Copy)]
pub struct KeywordEntry {
    pub kind: KeywordKind,
    pub canonical: &'static str,
    pub scope: KeywordScope,
}

impl KeywordEntry {
    const fn new(kind: KeywordKind, canonical: &'static str) -> Self {
        Self {
            kind,
            canonical,
            scope: KeywordScope::all(),
        }
    }

    const fn filename(kind: KeywordKind, canonical: &'static str) -> Self {
        Self {
            kind,
            canonical,
            scope: KeywordScope::FILENAME,
        }
    }
}

/// Compile-time token lookup table.
/// All keys are UPPERCASE for case-insensitive matching.
pub static KEYWORDS: phf::Map<&'static str, KeywordEntry> = phf_map! {
    // ── Quality ──────────────────────────────────────────────────
    "2160P" => KeywordEntry::new(KeywordKind::Quality, "2160p"),
    "4K" => KeywordEntry::new(KeywordKind::Quality, "2160p"),
    "1080P" => KeywordEntry::new(KeywordKind::Quality, "1080p"),
    "720P" => KeywordEntry::new(KeywordKind::Quality, "720p"),
    "480P" => KeywordEntry::new(KeywordKind::Quality, "480p"),

    // ── Source ───────────────────────────────────────────────────
    "BDREMUX" => KeywordEntry::new(KeywordKind::Source, "BDRemux"),
    "REMUX" => KeywordEntry::new(KeywordKind::Source, "BDRemux"),
    "BLURAY" => KeywordEntry::new(KeywordKind::Source, "BluRay"),
    "BD" => KeywordEntry::new(KeywordKind::Source, "BluRay"),
    "WEB-DL" => KeywordEntry::new(KeywordKind::Source, "WEB-DL"),
    "WEBDL" => KeywordEntry::new(KeywordKind::Source, "WEB-DL"),
    "WEBRIP" => KeywordEntry::new(KeywordKind::Source, "WEBRip"),
    "HDTV" => KeywordEntry::new(KeywordKind::Source, "HDTV"),

    // ── Streaming sources (filenames only) ───────────────────────
    "NF" => KeywordEntry::filename(KeywordKind::Source, "NF"),
    "AMZN" => KeywordEntry::filename(KeywordKind::Source, "AMZN"),
    "DSNP" => KeywordEntry::filename(KeywordKind::Source, "DSNP"),
    "HMAX" => KeywordEntry::filename(KeywordKind::Source, "HMAX"),
    "ATVP" => KeywordEntry::filename(KeywordKind::Source, "ATVP"),
    "PCOK" => KeywordEntry::filename(KeywordKind::Source, "PCOK"),
    "HULU" => KeywordEntry::filename(KeywordKind::Source, "HULU"),
    "GLBP" => KeywordEntry::filename(KeywordKind::Source, "GLBP"),
    "CR" => KeywordEntry::filename(KeywordKind::Source, "CR"),

    // ── Codec ────────────────────────────────────────────────────
    "HEVC" => KeywordEntry::new(KeywordKind::Codec, "HEVC"),
    "X265" => KeywordEntry::new(KeywordKind::Codec, "HEVC"),
    "H.265" => KeywordEntry::new(KeywordKind::Codec, "HEVC"),
    "H265" => KeywordEntry::new(KeywordKind::Codec, "HEVC"),
    "X264" => KeywordEntry::new(KeywordKind::Codec, "x264"),
    "H.264" => KeywordEntry::new(KeywordKind::Codec, "x264"),
    "H264" => KeywordEntry::new(KeywordKind::Codec, "x264"),
};

/// Look up an exact token, honouring the requested scope.
pub fn lookup(token: &str, scope: KeywordScope) -> Option<&'static KeywordEntry> {
    KEYWORDS
        .get(token.to_ascii_uppercase().as_str())
        .filter(|entry| entry.scope.contains(scope))
}

/// One rung of a ranked keyword table.
#[derive(Debug, Clone, Copy)]
pub struct Tier {
    pub canonical: &'static str,
    /// UPPERCASE spellings that select this tier.
    pub aliases: &'static [&'static str],
    pub points: u32,
}

/// Quality tiers, best first.
pub const QUALITY_TIERS: &[Tier] = &[
    Tier { canonical: "2160p", aliases: &["2160P", "4K"], points: 40 },
    Tier { canonical: "1080p", aliases: &["1080P"], points: 30 },
    Tier { canonical: "720p", aliases: &["720P"], points: 20 },
    Tier { canonical: "480p", aliases: &["480P"], points: 10 },
];

/// Source tiers, best first.
pub const SOURCE_TIERS: &[Tier] = &[
    Tier { canonical: "BDRemux", aliases: &["BDREMUX", "REMUX"], points: 25 },
    Tier { canonical: "BluRay", aliases: &["BLURAY", "BD"], points: 20 },
    Tier { canonical: "WEB-DL", aliases: &["WEB-DL", "WEBDL"], points: 15 },
    Tier { canonical: "WEBRip", aliases: &["WEBRIP"], points: 10 },
    Tier { canonical: "HDTV", aliases: &["HDTV"], points: 5 },
];

/// Codec tiers, best first.
pub const CODEC_TIERS: &[Tier] = &[
    Tier { canonical: "HEVC", aliases: &["HEVC", "X265", "H.265", "H265"], points: 10 },
    Tier { canonical: "x264", aliases: &["X264", "H.264", "H264"], points: 5 },
];

/// Bonus for releases carrying both original and dubbed audio.
pub const DUAL_AUDIO_POINTS: u32 = 15;

/// Points awarded to a canonical value, or 0 when it is not ranked.
pub fn points(tiers: &[Tier], canonical: Option<&str>) -> u32 {
    canonical
        .and_then(|c| tiers.iter().find(|t| t.canonical == c))
        .map(|t| t.points)
        .unwrap_or(0)
}

/// Technical terms never treated as part of an episode title.
/// Bare integers and all-caps acronyms are rejected separately.
pub static TECHNICAL_TERMS: phf::Set<&'static str> = phf_set! {
    // codecs
    "X264", "X265", "H264", "H265", "H.264", "H.265", "HEVC", "AVC", "AV1",
    "XVID", "DIVX", "10BIT", "8BIT", "HDR", "HDR10", "DV", "SDR",
    // audio
    "AAC", "AAC2", "AC3", "EAC3", "DD", "DDP", "DD5", "DDP5", "DD2", "DDP2",
    "DTS", "DTS-HD", "TRUEHD", "ATMOS", "FLAC", "OPUS", "MP3", "DUAL", "MULTI",
    // sources
    "WEB", "WEB-DL", "WEBDL", "WEBRIP", "BLURAY", "BDRIP", "BRRIP", "BDREMUX",
    "REMUX", "HDTV", "DVDRIP", "NF", "AMZN", "DSNP", "HMAX", "ATVP", "PCOK",
    "HULU", "GLBP", "CR",
    // resolution
    "2160P", "1080P", "720P", "480P", "4K", "UHD",
    // release flags
    "REPACK", "PROPER", "INTERNAL", "EXTENDED", "UNCUT",
};

/// True when a token is technical noise rather than episode-title text.
pub fn is_technical(token: &str) -> bool {
    if token.is_empty() {
        return true;
    }
    if token.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    let upper = token.to_ascii_uppercase();
    if TECHNICAL_TERMS.contains(upper.as_str()) {
        return true;
    }
    is_acronym(token)
}

/// Bare all-caps acronym: at least two characters, no lowercase letters,
/// at least one uppercase letter ("NF", "DD5", "PT-BR").
fn is_acronym(token: &str) -> bool {
    token.chars().count() >= 2
        && token.chars().any(|c| c.is_ascii_uppercase())
        && token
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '+')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let entry = lookup("web-dl", KeywordScope::FILENAME).unwrap();
        assert_eq!(entry.kind, KeywordKind::Source);
        assert_eq!(entry.canonical, "WEB-DL");
    }

    #[test]
    fn test_streaming_tags_are_filename_only() {
        assert!(lookup("NF", KeywordScope::FILENAME).is_some());
        assert!(lookup("NF", KeywordScope::FOLDER).is_none());
        assert!(lookup("1080p", KeywordScope::FOLDER).is_some());
    }

    #[test]
    fn test_points() {
        assert_eq!(points(QUALITY_TIERS, Some("1080p")), 30);
        assert_eq!(points(SOURCE_TIERS, Some("NF")), 0);
        assert_eq!(points(CODEC_TIERS, None), 0);
    }

    #[test]
    fn test_is_technical() {
        assert!(is_technical("x264"));
        assert!(is_technical("DD5"));
        assert!(is_technical("1"));
        assert!(is_technical("REPACK"));
        assert!(!is_technical("Pilot"));
        assert!(!is_technical("I"));
        assert!(!is_technical("Tale"));
    }
}
