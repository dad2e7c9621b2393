//! Crawl observers
//!
//! Observers take part in every exchange of a crawl without knowing about
//! each other. For each URI they are asked, in order:
//!
//! 1. [`Observer::should_request`] - fetch it at all?
//! 2. [`Observer::needs_content`] - once headers and a first chunk are in,
//!    download the full body?
//! 3. [`Observer::on_last_chunk`] - the full exchange, only when some
//!    observer voted for the download
//!
//! [`Observer::on_exception`] replaces steps 2 and 3 when the request failed
//! or returned an error status. Votes are combined with [`decide_request`]
//! and [`decide_content`]: any explicit request or download wins and
//! abstentions are ignored.
//!
//! Observers are rebuilt for every execution window. [`Observer::result`]
//! reports what was aggregated in the current window only and
//! [`Observer::merge`] folds it into the totals of earlier windows.

mod indexing;
mod link_health;

pub use indexing::IndexingObserver;
pub use link_health::{LinkHealthCounts, LinkHealthObserver};

use crate::frontier::FrontierEntry;
use crate::index::{IndexSink, SinkError};
use crate::url::UriCollection;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Names of every observer this crate can build
pub const OBSERVER_NAMES: [&str; 2] = [LinkHealthObserver::NAME, IndexingObserver::NAME];

#[derive(Debug, Error)]
pub enum ObserverError {
    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("Failed to write crawl report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unreadable aggregate for observer '{observer}': {reason}")]
    Aggregate { observer: String, reason: String },
}

/// Vote on whether a URI is fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDecision {
    Request,
    Skip,
}

/// Vote on whether the full response body is downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentDecision {
    Download,
    DontNeed,
}

/// Status line and headers of a response
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: HeaderMap,
}

impl ResponseHead {
    /// Media type of the response, lowercased, without parameters
    pub fn media_type(&self) -> Option<String> {
        let value = self.headers.get(reqwest::header::CONTENT_TYPE)?.to_str().ok()?;
        let media = value.split(';').next()?.trim().to_ascii_lowercase();
        (!media.is_empty()).then_some(media)
    }

    pub fn is_html(&self) -> bool {
        self.media_type().as_deref() == Some("text/html")
    }
}

/// A completed exchange with its full body
#[derive(Debug, Clone)]
pub struct Exchange {
    pub entry: FrontierEntry,
    pub head: ResponseHead,
    pub body: String,
}

/// Why a request produced no usable response
#[derive(Debug, Clone)]
pub enum FetchFailure {
    /// The server answered with a 4xx/5xx status
    Status(ResponseHead),

    /// Connection, TLS, timeout or body read failure
    Transport(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(head) => write!(f, "HTTP {}", head.status),
            Self::Transport(cause) => write!(f, "{}", cause),
        }
    }
}

/// Everything an observer may need to be built for a session
#[derive(Clone)]
pub struct ObserverContext {
    pub collection: Arc<UriCollection>,
    pub sink: Arc<dyn IndexSink>,
    pub report_dir: PathBuf,
}

/// A participant in the crawl of one session
#[async_trait]
pub trait Observer: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` abstains
    fn should_request(&self, _entry: &FrontierEntry) -> Option<RequestDecision> {
        None
    }

    /// `None` abstains
    fn needs_content(
        &self,
        _entry: &FrontierEntry,
        _head: &ResponseHead,
        _first_chunk: &[u8],
    ) -> Option<ContentDecision> {
        None
    }

    async fn on_last_chunk(&self, _exchange: &Exchange) -> Result<(), ObserverError> {
        Ok(())
    }

    fn on_exception(&self, _entry: &FrontierEntry, _failure: &FetchFailure) {}

    /// Aggregate of the current window
    fn result(&self) -> Value;

    /// Combines an earlier aggregate with the current window's one
    fn merge(&self, previous: Option<&Value>, current: Value) -> Result<Value, ObserverError>;

    /// Called once when the frontier is exhausted, with the merged aggregate
    /// of every window
    async fn finished_crawling(&self, _job_id: &str, _aggregate: &Value) -> Result<(), ObserverError> {
        Ok(())
    }
}

/// Builds an observer by name
pub fn build_observer(name: &str, ctx: &ObserverContext) -> Option<Arc<dyn Observer>> {
    match name {
        LinkHealthObserver::NAME => Some(Arc::new(LinkHealthObserver::new(ctx.collection.clone()))),
        IndexingObserver::NAME => Some(Arc::new(IndexingObserver::new(
            ctx.sink.clone(),
            ctx.report_dir.clone(),
        ))),
        _ => None,
    }
}

/// Asks every observer whether to fetch `entry`
///
/// When nobody expresses an opinion the URI is fetched.
pub fn decide_request(observers: &[Arc<dyn Observer>], entry: &FrontierEntry) -> RequestDecision {
    let votes: Vec<_> = observers
        .iter()
        .filter_map(|o| o.should_request(entry))
        .collect();

    if votes.contains(&RequestDecision::Request) || votes.is_empty() {
        RequestDecision::Request
    } else {
        RequestDecision::Skip
    }
}

/// Asks every observer whether the full body is needed
pub fn decide_content(
    observers: &[Arc<dyn Observer>],
    entry: &FrontierEntry,
    head: &ResponseHead,
    first_chunk: &[u8],
) -> ContentDecision {
    let votes: Vec<_> = observers
        .iter()
        .filter_map(|o| o.needs_content(entry, head, first_chunk))
        .collect();

    if votes.contains(&ContentDecision::Download) {
        ContentDecision::Download
    } else {
        ContentDecision::DontNeed
    }
}
