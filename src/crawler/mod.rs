//! Crawl engine and session construction
//!
//! This module contains:
//! - The [`CrawlEngine`] / [`CrawlSession`] seams the execution loop drives
//! - [`HttpEngine`], the `reqwest` based engine
//! - HTML parsing and link extraction
//! - [`SessionFactory`], which builds the URI collection, resolves observers
//!   and scopes confidential headers

mod engine;
mod factory;
mod fetcher;
mod parser;

pub use engine::{EngineSettings, HttpEngine, HttpSession};
pub use factory::SessionFactory;
pub use fetcher::{build_http_client, user_agent_string, HeaderScope};
pub use parser::{parse_html, ParsedPage};

use crate::observer::Observer;
use crate::url::UriCollection;
use crate::SweepError;
use async_trait::async_trait;
use std::sync::Arc;

/// What one call to [`CrawlSession::run`] achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// The frontier is empty; nothing is left to crawl
    pub exhausted: bool,

    /// Requests issued in this window
    pub requested: u64,

    /// URIs dequeued over the whole session, this window included
    pub visited: u64,

    /// URIs still waiting in the frontier
    pub pending: u64,
}

/// A resumable crawl over one URI collection
#[async_trait]
pub trait CrawlSession: Send {
    /// Engine-assigned identifier; enough to resume the session later
    fn job_id(&self) -> &str;

    fn observers(&self) -> &[Arc<dyn Observer>];

    fn collection(&self) -> &UriCollection;

    /// Crawls until the frontier is exhausted or `max_requests` requests
    /// have been issued
    async fn run(&mut self, max_requests: u32) -> Result<RunOutcome, SweepError>;
}

/// Creates and resumes crawl sessions
pub trait CrawlEngine: Send + Sync {
    fn create_session(
        &self,
        collection: Arc<UriCollection>,
        headers: HeaderScope,
        observers: Vec<Arc<dyn Observer>>,
    ) -> Result<Box<dyn CrawlSession>, SweepError>;

    fn resume_session(
        &self,
        engine_job_id: &str,
        headers: HeaderScope,
        observers: Vec<Arc<dyn Observer>>,
    ) -> Result<Box<dyn CrawlSession>, SweepError>;

    /// The collection a session was created with
    fn session_collection(&self, engine_job_id: &str) -> Result<UriCollection, SweepError>;
}
