//! Convention-based metadata extraction for remote index folder and file names.
//!
//! Everything in this crate is pure: no I/O, no clocks, no randomness. The
//! same input always yields the same output, which is what lets the sync
//! layer derive stable identities and rank releases reproducibly.

pub mod elements;
pub mod id;
pub mod keyword;
pub mod parser;
pub mod size;

pub use elements::{
    AnimeEpisodeMetadata, AnimeFolderMetadata, AnimeKind, ParsedEpisodeFile,
    ParsedReleaseFile, ParsedReleaseMetadata, ParsedTitleMetadata,
};
pub use id::stable_id;
pub use parser::episode::{parse_anime_episode, parse_episode_name};
pub use parser::release::{parse_release_filename, parse_release_folder};
pub use parser::season::parse_season_number;
pub use parser::title::{parse_anime_folder, parse_movie_folder, strip_count_suffix};
pub use parser::{is_video_file, normalize_display};
pub use size::parse_file_size;
