//! Catalog discovery and persistence on top of the remote index client.
//!
//! The [`scraper`] walks the remote hierarchy, [`sync`] turns a pass into
//! idempotent upserts and orphan cleanup, and [`url_cache`] hands out
//! signed download links with a durable fallback.

pub mod config;
pub mod error;
pub mod models;
pub mod scraper;
pub mod storage;
pub mod store;
pub mod sync;
pub mod url_cache;
