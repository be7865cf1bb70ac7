//! HTTP client for drive-index style remote indexes.
//!
//! [`EndpointManager`] tracks per-mirror health, [`IndexClient`] issues
//! requests with retry, backoff and failover, and [`RequestPacer`] spaces
//! requests so the shared upstream is not overrun.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod pacing;
pub mod types;

pub use client::{encode_path, FolderPages, IndexClient, RetryPolicy};
pub use endpoint::{
    BreakerConfig, CircuitState, Endpoint, EndpointConfig, EndpointManager, EndpointStatus,
};
pub use error::ApiError;
pub use pacing::RequestPacer;
pub use types::{EntryKind, FileInfo, FolderPage, RemoteEntry, FOLDER_MIME};
