pub mod episode;
pub mod release;
pub mod season;
pub mod title;

use unicode_normalization::UnicodeNormalization;

/// Video file extensions to consider playable.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "m4v", "ts", "webm", "wmv", "mov", "flv", "ogm", "mpg", "mpeg",
];

/// Extensions stripped before tokenizing (videos plus sidecar subtitles).
const KNOWN_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "m4v", "ts", "webm", "wmv", "mov", "flv", "ogm", "mpg", "mpeg", "srt",
    "ass", "ssa", "sub",
];

/// NFC-normalize, collapse runs of whitespace and trim.
///
/// Drive listings frequently come back decomposed (NFD), which would make
/// "Ação" and "Ação" two different categories.
pub fn normalize_display(s: &str) -> String {
    let composed: String = s.nfc().collect();
    composed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when the filename carries a known video extension.
pub fn is_video_file(name: &str) -> bool {
    split_extension(name)
        .1
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Split `name` into stem and known extension (without the dot).
pub(crate) fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && KNOWN_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) =>
        {
            (stem, Some(ext))
        }
        _ => (name, None),
    }
}
