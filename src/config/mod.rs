//! Configuration module for wikimir
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files.
//!
//! # Example
//!
//! ```no_run
//! use wikimir::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Mirroring {} at speed {}", config.wiki.url, config.speed());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{ArchiveConfig, Config, ContactConfig, CrawlConfig, OutputConfig, WikiConfig};

// Re-export parser and validation entry points
pub use parser::load_config;
pub use validation::{ensure_binaries, validate, validate_email};
