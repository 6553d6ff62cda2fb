//! wikimir: an offline mirror builder for MediaWiki-family wikis
//!
//! This crate crawls a wiki through its HTTP API, rewrites every article's
//! HTML for offline reading, downloads and optimizes the referenced media,
//! and hands the resulting file tree to `zimwriterfs` for packaging.

pub mod cache;
pub mod config;
pub mod crawler;
pub mod media;
pub mod naming;
pub mod output;
pub mod rewrite;
pub mod store;

use thiserror::Error;

/// Main error type for wikimir operations
#[derive(Debug, Error)]
pub enum WikimirError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Coordination store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("Disk cache error: {0}")]
    Cache(#[from] cache::CacheError),

    #[error("HTTP error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Wiki API error: {0}")]
    Api(String),

    #[error("Login failed: {0}")]
    Login(String),

    #[error("HTML rewrite error for {title}: {message}")]
    Rewrite { title: String, message: String },

    #[error("Media pipeline error: {0}")]
    Media(#[from] media::MediaError),

    #[error("Archive builder exited with status {status}")]
    ArchiveBuilder { status: i32 },

    #[error("Required binary not found: {0}")]
    MissingBinary(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid admin email: {0}")]
    InvalidEmail(String),
}

/// Result type alias for wikimir operations
pub type Result<T> = std::result::Result<T, WikimirError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::RunContext;
pub use naming::{article_base, canonical_title, DumpVariant};
