use std::time::Duration;

use gindex_api::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("signed URL unavailable for {key}: {reason}")]
    Unavailable { key: String, reason: String },

    #[error("store is no longer running")]
    StoreClosed,
}
