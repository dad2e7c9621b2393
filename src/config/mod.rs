//! Configuration module for Sumi-Sweep
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_sweep::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sweep.toml")).unwrap();
//! println!("Requests per window: {}", config.crawler.max_requests_per_window);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    CollectionConfig, Config, CrawlerConfig, ObserversConfig, OutputConfig, SiteEntry,
    UserAgentConfig,
};

pub use parser::{compute_config_hash, config_hash, load_config, load_config_with_hash, parse_config};
