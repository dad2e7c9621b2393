//! HTTP crawl engine
//!
//! An [`HttpSession`] drives one resumable crawl: it pops entries from the
//! tiered frontier, lets the observers vote, fetches with bounded
//! concurrency and feeds discovered links back into the frontier. Sessions
//! are persisted in the `crawl_sessions` table so a later window can pick
//! one up again from its id alone.

use crate::crawler::fetcher::{describe_transport_error, HeaderScope};
use crate::crawler::parser::parse_html;
use crate::crawler::{CrawlEngine, CrawlSession, RunOutcome};
use crate::frontier::{DurableQueue, FrontierEntry, Queue, TieredQueue};
use crate::observer::{
    decide_content, decide_request, ContentDecision, Exchange, FetchFailure, Observer,
    RequestDecision, ResponseHead,
};
use crate::storage::{SessionRecord, SharedStorage, Storage};
use crate::url::{normalize_url, UriCollection};
use crate::SweepError;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::header::LOCATION;
use reqwest::Client;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Engine-wide settings shared by every session
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_concurrent_requests: u32,
    pub max_depth: u32,
    /// Hash of the configuration the sessions were created under
    pub config_hash: String,
}

/// Crawl engine built on `reqwest`
pub struct HttpEngine {
    client: Client,
    storage: SharedStorage,
    settings: EngineSettings,
}

impl HttpEngine {
    pub fn new(client: Client, storage: SharedStorage, settings: EngineSettings) -> Self {
        Self {
            client,
            storage,
            settings,
        }
    }

    fn load_record(&self, engine_job_id: &str) -> Result<SessionRecord, SweepError> {
        self.storage
            .with(|s| s.get_session(engine_job_id))?
            .ok_or_else(|| SweepError::SessionNotFound(engine_job_id.to_string()))
    }

    fn session(
        &self,
        engine_job_id: String,
        collection: Arc<UriCollection>,
        headers: HeaderScope,
        observers: Vec<Arc<dyn Observer>>,
    ) -> HttpSession {
        let durable = DurableQueue::new(self.storage.clone(), engine_job_id.clone());
        let queue = TieredQueue::new(durable);

        HttpSession {
            engine_job_id,
            queue,
            shared: Arc::new(SessionShared {
                client: self.client.clone(),
                headers,
                collection,
                observers,
                max_depth: self.settings.max_depth,
            }),
            max_concurrent: self.settings.max_concurrent_requests.max(1) as usize,
        }
    }
}

impl CrawlEngine for HttpEngine {
    fn create_session(
        &self,
        collection: Arc<UriCollection>,
        headers: HeaderScope,
        observers: Vec<Arc<dyn Observer>>,
    ) -> Result<Box<dyn CrawlSession>, SweepError> {
        let record = SessionRecord {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            config_hash: self.settings.config_hash.clone(),
            collection: collection.to_strings(),
            observers: observers.iter().map(|o| o.name().to_string()).collect(),
        };
        self.storage.with(|s| s.create_session(&record))?;

        let mut session = self.session(record.id, collection.clone(), headers, observers);
        for uri in collection.uris() {
            session.queue.push(FrontierEntry::root(normalize_url(uri.as_str())?))?;
        }

        info!(
            session = %session.engine_job_id,
            roots = collection.len(),
            "Created crawl session"
        );
        Ok(Box::new(session))
    }

    fn resume_session(
        &self,
        engine_job_id: &str,
        headers: HeaderScope,
        observers: Vec<Arc<dyn Observer>>,
    ) -> Result<Box<dyn CrawlSession>, SweepError> {
        let collection = Arc::new(self.session_collection(engine_job_id)?);
        let session = self.session(engine_job_id.to_string(), collection, headers, observers);

        let pending = session.queue.pending()?;
        info!(session = engine_job_id, pending, "Resumed crawl session");
        Ok(Box::new(session))
    }

    fn session_collection(&self, engine_job_id: &str) -> Result<UriCollection, SweepError> {
        let record = self.load_record(engine_job_id)?;
        Ok(UriCollection::from_strings(&record.collection)?)
    }
}

/// State every in-flight exchange of a session needs
struct SessionShared {
    client: Client,
    headers: HeaderScope,
    collection: Arc<UriCollection>,
    observers: Vec<Arc<dyn Observer>>,
    max_depth: u32,
}

/// One resumable crawl
pub struct HttpSession {
    engine_job_id: String,
    queue: TieredQueue,
    shared: Arc<SessionShared>,
    max_concurrent: usize,
}

#[async_trait]
impl CrawlSession for HttpSession {
    fn job_id(&self) -> &str {
        &self.engine_job_id
    }

    fn observers(&self) -> &[Arc<dyn Observer>] {
        &self.shared.observers
    }

    fn collection(&self) -> &UriCollection {
        &self.shared.collection
    }

    async fn run(&mut self, max_requests: u32) -> Result<RunOutcome, SweepError> {
        let start_time = Instant::now();
        let mut requested: u64 = 0;
        let mut in_flight = JoinSet::new();
        let mut failure: Option<SweepError> = None;

        loop {
            while failure.is_none()
                && in_flight.len() < self.max_concurrent
                && requested < u64::from(max_requests)
            {
                let entry = match self.queue.pop() {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        failure = Some(e.into());
                        break;
                    }
                };

                match decide_request(&self.shared.observers, &entry) {
                    RequestDecision::Skip => {
                        debug!(url = %entry.url, "Not requested");
                    }
                    RequestDecision::Request => {
                        requested += 1;
                        let shared = self.shared.clone();
                        in_flight.spawn(async move {
                            let result = exchange(shared, entry.clone()).await;
                            (entry, result)
                        });
                    }
                }
            }

            // Keep draining on failure so nothing popped is silently lost
            let Some(joined) = in_flight.join_next().await else {
                break;
            };

            match joined {
                Ok((_, Ok(discovered))) => {
                    for entry in discovered {
                        if let Err(e) = self.queue.push(entry) {
                            failure.get_or_insert(e.into());
                        }
                    }
                }
                Ok((entry, Err(e))) => {
                    warn!(
                        session = %self.engine_job_id,
                        url = %entry.url,
                        error = %e,
                        "Exchange failed, returning entry to the frontier"
                    );
                    if let Err(requeue_err) = self.queue.requeue(&entry) {
                        warn!(url = %entry.url, error = %requeue_err, "Could not requeue entry");
                    }
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    failure.get_or_insert(e.into());
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        let pending = self.queue.pending()?;
        let outcome = RunOutcome {
            exhausted: pending == 0,
            requested,
            visited: self.queue.visited()?,
            pending,
        };

        info!(
            session = %self.engine_job_id,
            requested = outcome.requested,
            visited = outcome.visited,
            pending = outcome.pending,
            "Window finished in {:?}",
            start_time.elapsed()
        );

        Ok(outcome)
    }
}

/// Fetches one URI and walks the observers through it
///
/// Returns the frontier entries discovered on the way.
async fn exchange(
    shared: Arc<SessionShared>,
    entry: FrontierEntry,
) -> Result<Vec<FrontierEntry>, SweepError> {
    let observers = &shared.observers;

    let mut response = match shared.headers.get(&shared.client, &entry.url).send().await {
        Ok(response) => response,
        Err(e) => {
            let failure = FetchFailure::Transport(describe_transport_error(&e));
            observers.iter().for_each(|o| o.on_exception(&entry, &failure));
            return Ok(Vec::new());
        }
    };

    let head = ResponseHead {
        status: response.status().as_u16(),
        headers: response.headers().clone(),
    };

    if head.status >= 400 {
        let failure = FetchFailure::Status(head);
        observers.iter().for_each(|o| o.on_exception(&entry, &failure));
        return Ok(Vec::new());
    }

    let mut discovered = Vec::new();
    if (300..400).contains(&head.status) {
        if let Some(target) = redirect_target(&entry.url, &head) {
            push_discovered(&mut discovered, &shared, &entry, target);
        }
    }

    let mut body = match response.chunk().await {
        Ok(chunk) => chunk.map(|c| c.to_vec()).unwrap_or_default(),
        Err(e) => {
            let failure = FetchFailure::Transport(describe_transport_error(&e));
            observers.iter().for_each(|o| o.on_exception(&entry, &failure));
            return Ok(discovered);
        }
    };

    let decision = decide_content(observers, &entry, &head, &body);
    let follow_links = head.status < 300
        && head.is_html()
        && shared.collection.contains_host(&entry.url)
        && entry.depth < shared.max_depth;

    if decision == ContentDecision::DontNeed && !follow_links {
        return Ok(discovered);
    }

    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => body.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(e) => {
                let failure = FetchFailure::Transport(describe_transport_error(&e));
                observers.iter().for_each(|o| o.on_exception(&entry, &failure));
                return Ok(discovered);
            }
        }
    }
    let body = String::from_utf8_lossy(&body).into_owned();

    if follow_links {
        for link in parse_html(&body, &entry.url).links {
            push_discovered(&mut discovered, &shared, &entry, link);
        }
    }

    if decision == ContentDecision::Download {
        let exchange = Exchange { entry, head, body };
        for observer in observers {
            observer.on_last_chunk(&exchange).await?;
        }
    }

    Ok(discovered)
}

fn redirect_target(from: &Url, head: &ResponseHead) -> Option<Url> {
    let location = head.headers.get(LOCATION)?.to_str().ok()?;
    from.join(location).ok()
}

fn push_discovered(
    discovered: &mut Vec<FrontierEntry>,
    shared: &SessionShared,
    parent: &FrontierEntry,
    link: Url,
) {
    if parent.depth >= shared.max_depth {
        return;
    }

    match normalize_url(link.as_str()) {
        Ok(url) => discovered.push(FrontierEntry::discovered(url, parent)),
        Err(e) => debug!(url = %link, error = %e, "Dropping unnormalizable link"),
    }
}
