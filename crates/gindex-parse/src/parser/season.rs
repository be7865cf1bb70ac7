use regex::Regex;
use std::sync::LazyLock;

// ── Regex patterns ──────────────────────────────────────────────

/// "S02" as the whole name.
static RE_S_EXACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*S(\d{1,2})\s*$").unwrap());

/// "Season 2" / "Season 02" as the whole name.
static RE_SEASON_EXACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*Season\s*(\d{1,2})\s*$").unwrap());

/// "Show.S02.1080p".
static RE_S_DOTTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.S(\d{1,2})\.").unwrap());

/// "S02" anywhere, not followed by another digit.
static RE_S_ANYWHERE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)S(\d{1,2})(?:\D|$)").unwrap());

/// "S02" as a whole word: "Dark S03 Complete" but not "DTS5.1".
static RE_S_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bS(\d{1,2})\b").unwrap());

/// Season number of a season folder; 1 when no marker is found.
pub fn parse_season_number(name: &str) -> u32 {
    try_extract(name).unwrap_or(1)
}

/// Try all season extraction strategies in priority order.
fn try_extract(name: &str) -> Option<u32> {
    [&RE_S_EXACT, &RE_SEASON_EXACT, &RE_S_DOTTED, &RE_S_ANYWHERE]
        .iter()
        .find_map(|re| re.captures(name)?[1].parse().ok())
}

/// Season number only when the name carries an unambiguous season marker.
///
/// Used to tell season folders from release folders, whose audio and
/// codec tags ("DTS5.1", "AACs2") would satisfy the looser forms.
pub fn marked_season(name: &str) -> Option<u32> {
    [&RE_S_EXACT, &RE_SEASON_EXACT, &RE_S_DOTTED, &RE_S_WORD]
        .iter()
        .find_map(|re| re.captures(name)?[1].parse().ok())
}
