//! HTTP client construction and request building
//!
//! This module handles:
//! - Building the HTTP client with the crawler's user agent string
//! - Scoping confidential headers to the hosts of the URI collection
//! - Classifying transport failures

use crate::config::UserAgentConfig;
use crate::url::UriCollection;
use crate::SweepError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect::Policy, Client, RequestBuilder};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// Redirects are never followed by the client; the engine enqueues the
/// `Location` target instead so that every hop is classified on its own.
///
/// # Example
///
/// ```no_run
/// use sumi_sweep::config::UserAgentConfig;
/// use sumi_sweep::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "SumiSweep".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, 30).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout_secs: u64,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent_string(config))
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(timeout_secs.min(10)))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Format: CrawlerName/Version (+ContactURL; ContactEmail)
pub fn user_agent_string(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// Sensitive headers and the hosts allowed to receive them
///
/// Only requests whose host (including an explicit port) belongs to the
/// authoritative collection carry the headers. Everything discovered
/// elsewhere is requested without them.
#[derive(Debug, Clone)]
pub struct HeaderScope {
    collection: Arc<UriCollection>,
    headers: HeaderMap,
}

impl HeaderScope {
    pub fn new(
        collection: Arc<UriCollection>,
        headers: &BTreeMap<String, String>,
    ) -> Result<Self, SweepError> {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| SweepError::InvalidHeader(name.clone()))?;
            let mut value = HeaderValue::from_str(value)
                .map_err(|_| SweepError::InvalidHeader(name.to_string()))?;
            value.set_sensitive(true);
            map.insert(name, value);
        }

        Ok(Self {
            collection,
            headers: map,
        })
    }

    /// A scope that never attaches anything
    pub fn empty(collection: Arc<UriCollection>) -> Self {
        Self {
            collection,
            headers: HeaderMap::new(),
        }
    }

    /// Headers to attach to a request for `url`, if any
    pub fn headers_for(&self, url: &Url) -> Option<&HeaderMap> {
        if self.headers.is_empty() || !self.collection.contains_host(url) {
            return None;
        }
        Some(&self.headers)
    }

    /// Builds a GET request for `url` with the headers it is entitled to
    pub fn get(&self, client: &Client, url: &Url) -> RequestBuilder {
        let request = client.get(url.clone());
        match self.headers_for(url) {
            Some(headers) => request.headers(headers.clone()),
            None => request,
        }
    }
}

/// Short human-readable cause of a transport failure
pub fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "Request timeout".to_string()
    } else if err.is_connect() {
        "Connection refused".to_string()
    } else if err.is_body() || err.is_decode() {
        format!("Failed to read body: {}", err)
    } else {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestSweeper".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    fn scope() -> HeaderScope {
        let collection =
            UriCollection::from_strings(["https://a.example/", "http://127.0.0.1:8080/"]).unwrap();
        let headers = BTreeMap::from([("authorization".to_string(), "Bearer s3cret".to_string())]);
        HeaderScope::new(Arc::new(collection), &headers).unwrap()
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&create_test_config(), 30).is_ok());
    }

    #[test]
    fn test_user_agent_format() {
        assert_eq!(
            user_agent_string(&create_test_config()),
            "TestSweeper/1.0 (+https://example.com/about; admin@example.com)"
        );
    }

    #[test]
    fn test_headers_only_for_collection_hosts() {
        let scope = scope();

        assert!(scope
            .headers_for(&Url::parse("https://a.example/deep/page").unwrap())
            .is_some());
        assert!(scope
            .headers_for(&Url::parse("http://127.0.0.1:8080/x").unwrap())
            .is_some());

        assert!(scope
            .headers_for(&Url::parse("https://evil.example/").unwrap())
            .is_none());
        assert!(scope
            .headers_for(&Url::parse("http://127.0.0.1:9999/x").unwrap())
            .is_none());
    }

    #[test]
    fn test_built_request_carries_scoped_headers() {
        let scope = scope();
        let client = build_http_client(&create_test_config(), 30).unwrap();

        let inside = scope
            .get(&client, &Url::parse("https://a.example/").unwrap())
            .build()
            .unwrap();
        assert_eq!(inside.headers()["authorization"], "Bearer s3cret");

        let outside = scope
            .get(&client, &Url::parse("https://b.example/").unwrap())
            .build()
            .unwrap();
        assert!(outside.headers().get("authorization").is_none());
    }

    #[test]
    fn test_rejects_invalid_header_name() {
        let collection = Arc::new(UriCollection::new());
        let headers = BTreeMap::from([("bad header".to_string(), "x".to_string())]);
        assert!(matches!(
            HeaderScope::new(collection, &headers),
            Err(SweepError::InvalidHeader(_))
        ));
    }
}
