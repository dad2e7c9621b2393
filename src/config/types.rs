use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for Sumi-Sweep
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub site: Vec<SiteEntry>,
    /// Headers only ever sent to hosts of the authoritative collection
    #[serde(default, rename = "confidential-headers")]
    pub confidential_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub observers: ObserversConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of requests issued in one execution window
    #[serde(rename = "max-requests-per-window")]
    pub max_requests_per_window: u32,

    /// Maximum number of requests in flight at once
    #[serde(rename = "max-concurrent-requests")]
    pub max_concurrent_requests: u32,

    /// Maximum link depth followed from the collection roots
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory receiving one CSV crawl report per completed job
    #[serde(rename = "report-dir")]
    pub report_dir: String,
}

/// Statically configured URIs crawled alongside the site roots
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionConfig {
    #[serde(rename = "extra-uris", default)]
    pub extra_uris: Vec<String>,
}

/// A top-level site root
#[derive(Debug, Clone, Deserialize)]
pub struct SiteEntry {
    pub root: String,

    /// Unpublished sites are left out of the collection
    #[serde(default = "default_published")]
    pub published: bool,
}

fn default_published() -> bool {
    true
}

/// Observer selection
#[derive(Debug, Clone, Deserialize)]
pub struct ObserversConfig {
    /// Observer names used when a job does not request its own subset
    pub enabled: Vec<String>,
}

impl Default for ObserversConfig {
    fn default() -> Self {
        Self {
            enabled: vec!["link-health".to_string(), "indexing".to_string()],
        }
    }
}
