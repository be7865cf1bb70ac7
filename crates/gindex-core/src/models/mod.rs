mod catalog;
mod entity;

pub use catalog::{
    CatalogCounts, Category, CategoryKind, EpisodeRecord, MovieRecord, ReleaseInfo,
    SeasonRecord, SeriesDetail, SeriesRecord, UpsertStats,
};
pub use entity::{EntityKey, EntityKind, StoredUrl};
