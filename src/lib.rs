//! Sumi-Sweep: resumable, observer-driven site sweeps
//!
//! This crate crawls a bounded collection of site URIs in short, interruptible
//! windows. Each window is driven by a continuation message carrying a job id;
//! the crawl frontier is written through to SQLite so a later window (or a
//! later process) resumes exactly where the previous one stopped. Pluggable
//! observers vote on what gets fetched and aggregate results such as link
//! health counters and a full-text index.

pub mod bus;
pub mod config;
pub mod crawler;
pub mod frontier;
pub mod index;
pub mod job;
pub mod jobs;
pub mod observer;
pub mod output;
pub mod storage;
pub mod url;
pub mod worker;

use thiserror::Error;

/// Main error type for Sumi-Sweep operations
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job error: {0}")]
    Job(#[from] job::JobError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Observer error: {0}")]
    Observer(#[from] observer::ObserverError),

    #[error("Index sink error: {0}")]
    Sink(#[from] index::SinkError),

    #[error(
        "No known observer in {requested:?}; valid observer names are: {}",
        valid.join(", ")
    )]
    UnknownObservers {
        requested: Vec<String>,
        valid: Vec<String>,
    },

    #[error("Crawl session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid header for confidential scope: {0}")]
    InvalidHeader(String),

    #[error("Crawl task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
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
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Sumi-Sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use job::{Job, JobId, Owner, Status};
pub use jobs::Jobs;
pub use worker::{CrawlWorker, WindowOutcome};
