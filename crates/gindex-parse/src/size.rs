use regex::Regex;
use std::sync::LazyLock;

/// "<number> <unit>" with an optional, case-insensitive unit.
static RE_SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(\d+(?:[.,]\d+)?)\s*(GB|MB|KB|B)?\s*$").unwrap());

/// Parse a human-readable size such as "7.59 GB" into bytes.
///
/// Units are binary multiples (1 KB = 1024 B). A bare number is taken as
/// bytes. Returns `None` for anything else.
pub fn parse_file_size(s: &str) -> Option<u64> {
    let caps = RE_SIZE.captures(s)?;
    let value: f64 = caps[1].replace(',', ".").parse().ok()?;

    let multiplier: f64 = match caps.get(2).map(|m| m.as_str().to_ascii_uppercase()) {
        Some(unit) => match unit.as_str() {
            "GB" => 1024.0 * 1024.0 * 1024.0,
            "MB" => 1024.0 * 1024.0,
            "KB" => 1024.0,
            _ => 1.0,
        },
        None => 1.0,
    };

    Some((value * multiplier).round() as u64)
}
