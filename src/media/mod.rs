//! Media pipeline
//!
//! Two stages behind two bounded pools: [`download`] pulls every referenced
//! image exactly once per filename (widest requested width wins) through the
//! shared disk cache, and [`optimize`] shrinks the downloaded files with the
//! usual external tools.

pub mod download;
pub mod optimize;

pub use download::MediaDownloader;
pub use optimize::{optimize_file, ImageFormat};

use thiserror::Error;

/// Errors that can occur in the media pipeline
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("coordination store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("cache error: {0}")]
    Cache(#[from] crate::cache::CacheError),

    #[error("download error: {0}")]
    Fetch(#[from] crate::crawler::FetchError),

    #[error("optimizer `{tool}` failed: {message}")]
    Tool { tool: &'static str, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for media operations
pub type MediaResult<T> = Result<T, MediaError>;
