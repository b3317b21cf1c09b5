//! Kumo-Frontier: a polite URL frontier service
//!
//! This crate implements the coordination service behind a distributed web
//! crawler: it accepts streams of discovered URLs, deduplicates and persists
//! them per (crawl, queue) pair, and serves URLs back to consumers while
//! enforcing per-queue politeness delays and round-robin fairness.

pub mod config;
pub mod engine;
pub mod service;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Kumo-Frontier operations
#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] storage::StoreError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Wire encoding error: {0}")]
    Wire(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine is in read-only mode after a fatal storage failure")]
    ReadOnly,

    #[error("Unknown queue: {crawl_id}/{key}")]
    UnknownQueue { crawl_id: String, key: String },

    #[error("Server error: {0}")]
    Server(String),
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

    #[error("Unknown store backend: {0}")]
    UnknownBackend(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Empty URL")]
    Empty,

    #[error("URL exceeds maximum length: {0} bytes")]
    TooLong(usize),

    #[error("Missing crawl id")]
    MissingCrawlId,

    #[error("URL has no host or authority: {0}")]
    MissingAuthority(String),
}

/// Result type alias for Kumo-Frontier operations
pub type Result<T> = std::result::Result<T, FrontierError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use engine::{AckStatus, Engine, GetParams, UrlInfo, UrlItem};
pub use state::{QueueState, QueueStatus};
pub use crate::url::{queue_key, validate_url};
