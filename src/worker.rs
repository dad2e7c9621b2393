//! Crawl execution loop
//!
//! A [`CrawlWorker`] advances one job by one window per continuation
//! message: it opens (or resumes) the job's crawl session, runs it under the
//! per-window request budget, folds the observers' results into the job and
//! either completes the job or schedules the next continuation.

use crate::bus::{ContinueCrawl, MessageBus};
use crate::config::Config;
use crate::crawler::{CrawlSession, RunOutcome, SessionFactory};
use crate::job::{Job, JobId};
use crate::jobs::Jobs;
use crate::observer::Observer;
use crate::SweepError;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Metadata key holding the engine session id of a job
pub const META_ENGINE_JOB_ID: &str = "engine_job_id";

/// Metadata key holding the observer names a job runs with
pub const META_OBSERVERS: &str = "observers";

/// Metadata key holding merged observer results, keyed by observer name
pub const META_OBSERVER_RESULTS: &str = "observer_results";

/// Result of handling one continuation message
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowOutcome {
    /// The job was absent or already completed
    Skipped,

    /// Work remains; a continuation was scheduled
    Pending { progress: f64 },

    Completed,
}

/// Progress after a window that left work behind
///
/// The denominator is the larger of the collection size and everything the
/// session has seen so far, so discovered URIs only ever slow progress down.
/// The value stays below 100 while work remains and never drops under
/// `previous`.
pub fn compute_progress(visited: u64, pending: u64, collection_len: usize, previous: f64) -> f64 {
    let total = (collection_len as u64).max(visited + pending);
    if total == 0 {
        return previous;
    }

    let raw = visited as f64 / total as f64 * 100.0;
    raw.min(99.0).max(previous).min(100.0)
}

/// Observer names stored on the job, if it has any
pub fn observers_of(job: &Job) -> Option<Vec<String>> {
    let value = job.metadata_value(META_OBSERVERS)?;
    match serde_json::from_value(value.clone()) {
        Ok(names) => Some(names),
        Err(e) => {
            warn!(job = %job.id(), error = %e, "Ignoring malformed observer list");
            None
        }
    }
}

pub struct CrawlWorker {
    jobs: Jobs,
    factory: SessionFactory,
    bus: Arc<dyn MessageBus>,
    max_requests: u32,
    default_observers: Vec<String>,
}

impl CrawlWorker {
    pub fn new(jobs: Jobs, factory: SessionFactory, bus: Arc<dyn MessageBus>, config: &Config) -> Self {
        Self {
            jobs,
            factory,
            bus,
            max_requests: config.crawler.max_requests_per_window,
            default_observers: config.observers.enabled.clone(),
        }
    }

    /// Runs one window for the job named in `message`
    ///
    /// A missing or completed job is a silent no-op. When the window fails
    /// the job is persisted as pending with a warning and the error is
    /// returned; no continuation is scheduled in that case.
    pub async fn handle(&self, message: ContinueCrawl) -> Result<WindowOutcome, SweepError> {
        let Some(job) = self.jobs.get_by_uuid(message.job_id)? else {
            debug!(job = %message.job_id, "Job no longer exists");
            return Ok(WindowOutcome::Skipped);
        };
        if job.status().is_terminal() {
            debug!(job = %job.id(), "Job already completed");
            return Ok(WindowOutcome::Skipped);
        }

        let mut job = job;
        match self.run_window(&mut job).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(job = %job.id(), error = %e, "Crawl window failed");
                let failed = job
                    .mark_pending()?
                    .with_warning(format!("Crawl window failed: {}", e));
                self.jobs.persist(&failed)?;
                Err(e)
            }
        }
    }

    /// Handles queued continuations until the bus is empty or `max_messages`
    /// have been processed
    ///
    /// Failed windows are logged and do not stop the drain. Returns the
    /// number of messages taken off the bus.
    pub async fn drain(&self, max_messages: Option<u32>) -> Result<u32, SweepError> {
        let mut handled = 0;

        while max_messages.map_or(true, |max| handled < max) {
            let Some(message) = self.bus.receive()? else {
                break;
            };
            handled += 1;

            if let Err(e) = self.handle(message).await {
                warn!(job = %message.job_id, error = %e, "Leaving job for manual resume");
            }
        }

        Ok(handled)
    }

    /// Drives one window; `job` always holds the latest snapshot, so the
    /// caller can persist it when this fails
    async fn run_window(&self, job: &mut Job) -> Result<WindowOutcome, SweepError> {
        let mut session = self.open_session(job)?;

        let run = session.run(self.max_requests).await;
        *job = merge_observer_results(job, session.as_ref())?;
        let outcome = run?;

        if outcome.exhausted {
            self.complete(job, session.observers()).await
        } else {
            self.reschedule(job, session.as_ref(), outcome)
        }
    }

    fn open_session(&self, job: &mut Job) -> Result<Box<dyn CrawlSession>, SweepError> {
        let observers = observers_of(job).unwrap_or_else(|| self.default_observers.clone());

        if let Some(engine_job_id) = job.metadata_value(META_ENGINE_JOB_ID).and_then(Value::as_str) {
            return self.factory.resume_session(engine_job_id, &observers);
        }

        let collection = self.factory.build_collection()?;
        let session = self.factory.create_session(collection, &observers)?;

        // Recorded before the first request so a crash can still resume
        *job = job
            .with_metadata(META_ENGINE_JOB_ID, Value::from(session.job_id()))
            .with_metadata(META_OBSERVERS, Value::from(observers));
        self.jobs.persist(job)?;

        info!(job = %job.id(), session = session.job_id(), "Started crawl session");
        Ok(session)
    }

    async fn complete(
        &self,
        job: &mut Job,
        observers: &[Arc<dyn Observer>],
    ) -> Result<WindowOutcome, SweepError> {
        let aggregates = results_of(job);
        let job_id = job.id().to_string();

        for observer in observers {
            let aggregate = aggregates.get(observer.name()).cloned().unwrap_or(Value::Null);
            observer.finished_crawling(&job_id, &aggregate).await?;
        }

        // `job` stays pending until the completed snapshot is stored
        let completed = job.mark_completed();
        self.jobs.persist(&completed)?;
        *job = completed;

        info!(job = %job.id(), "Crawl completed");
        Ok(WindowOutcome::Completed)
    }

    fn reschedule(
        &self,
        job: &mut Job,
        session: &dyn CrawlSession,
        outcome: RunOutcome,
    ) -> Result<WindowOutcome, SweepError> {
        let progress = compute_progress(
            outcome.visited,
            outcome.pending,
            session.collection().len(),
            job.progress(),
        );

        *job = job.mark_pending()?.with_progress(progress)?;
        self.jobs.persist(job)?;

        info!(
            job = %job.id(),
            progress,
            visited = outcome.visited,
            pending = outcome.pending,
            "Crawl window finished, work remains"
        );

        if let Err(e) = self.bus.dispatch(ContinueCrawl::new(job.id())) {
            error!(job = %job.id(), error = %e, "Failed to schedule continuation");
            *job = job.with_warning(format!("Continuation not scheduled: {}", e));
            if let Err(e) = self.jobs.persist(job) {
                error!(job = %job.id(), error = %e, "Failed to record continuation warning");
            }
        }

        Ok(WindowOutcome::Pending { progress })
    }

    pub fn jobs(&self) -> &Jobs {
        &self.jobs
    }

    /// Runs a single window for `job_id` outside the bus (manual resume)
    pub async fn resume(&self, job_id: JobId) -> Result<WindowOutcome, SweepError> {
        self.handle(ContinueCrawl::new(job_id)).await
    }
}

fn results_of(job: &Job) -> Map<String, Value> {
    match job.metadata_value(META_OBSERVER_RESULTS) {
        Some(Value::Object(results)) => results.clone(),
        _ => Map::new(),
    }
}

/// Folds this window's observer results into the job's stored aggregates
fn merge_observer_results(job: &Job, session: &dyn CrawlSession) -> Result<Job, SweepError> {
    let mut results = results_of(job);

    for observer in session.observers() {
        let merged = observer.merge(results.get(observer.name()), observer.result())?;
        results.insert(observer.name().to_string(), merged);
    }

    Ok(job.with_metadata(META_OBSERVER_RESULTS, Value::Object(results)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SqliteMessageBus;
    use crate::config::parse_config;
    use crate::crawler::{EngineSettings, HttpEngine};
    use crate::index::SqliteIndexSink;
    use crate::job::Status;
    use crate::storage::{SharedStorage, SqliteStorage, StorageError, StorageResult};
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct UnreachableBus;

    impl MessageBus for UnreachableBus {
        fn dispatch(&self, _message: ContinueCrawl) -> StorageResult<()> {
            Err(StorageError::Database("bus unreachable".to_string()))
        }

        fn receive(&self) -> StorageResult<Option<ContinueCrawl>> {
            Ok(None)
        }
    }

    fn config(uris: &[String], report_dir: &TempDir) -> Config {
        let extras: Vec<String> = uris.iter().map(|u| format!("\"{}/\"", u)).collect();
        parse_config(&format!(
            r#"
[crawler]
max-requests-per-window = 1
max-concurrent-requests = 1
max-depth = 0

[user-agent]
crawler-name = "TestSweeper"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[output]
database-path = "unused.db"
report-dir = "{}"

[collection]
extra-uris = [{}]

[observers]
enabled = ["link-health"]
"#,
            report_dir.path().display(),
            extras.join(", ")
        ))
        .unwrap()
    }

    fn worker(storage: &SharedStorage, config: &Config, bus: Arc<dyn MessageBus>) -> CrawlWorker {
        let engine = HttpEngine::new(
            reqwest::Client::new(),
            storage.clone(),
            EngineSettings {
                max_concurrent_requests: 1,
                max_depth: 0,
                config_hash: "test".to_string(),
            },
        );
        let factory = SessionFactory::new(
            Arc::new(config.clone()),
            Arc::new(engine),
            Arc::new(SqliteIndexSink::new(storage.clone())),
        );
        CrawlWorker::new(Jobs::system(storage.clone()), factory, bus, config)
    }

    async fn page_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<p>ok</p>", "text/html"))
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_progress_uses_collection_as_floor() {
        assert_eq!(compute_progress(1, 1, 2, 0.0), 50.0);
        assert_eq!(compute_progress(1, 0, 4, 0.0), 25.0);
        assert_eq!(compute_progress(1, 3, 2, 0.0), 25.0);
    }

    #[test]
    fn test_progress_never_decreases() {
        let first = compute_progress(2, 2, 2, 0.0);
        // New discoveries grow the denominator
        let second = compute_progress(3, 7, 2, first);
        assert_eq!(first, 50.0);
        assert_eq!(second, first);
    }

    #[test]
    fn test_progress_stays_below_100_while_pending() {
        assert_eq!(compute_progress(999, 1, 2, 0.0), 99.0);
        assert_eq!(compute_progress(0, 0, 0, 12.5), 12.5);
    }

    #[tokio::test]
    async fn test_absent_and_completed_jobs_are_skipped() {
        let storage = SharedStorage::new(SqliteStorage::new_in_memory().unwrap());
        let dir = TempDir::new().unwrap();
        let config = config(&[], &dir);
        let bus = Arc::new(SqliteMessageBus::new(storage.clone()));
        let worker = worker(&storage, &config, bus.clone());

        let absent = worker.handle(ContinueCrawl::new(JobId::new_v4())).await.unwrap();
        assert_eq!(absent, WindowOutcome::Skipped);

        let job = worker.jobs().create_job("crawl").unwrap().mark_completed();
        worker.jobs().persist(&job).unwrap();
        let done = worker.handle(ContinueCrawl::new(job.id())).await.unwrap();
        assert_eq!(done, WindowOutcome::Skipped);
        assert_eq!(bus.backlog().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_dispatch_keeps_progress() {
        let a = page_server().await;
        let b = page_server().await;
        let storage = SharedStorage::new(SqliteStorage::new_in_memory().unwrap());
        let dir = TempDir::new().unwrap();
        let config = config(&[a.uri(), b.uri()], &dir);
        let worker = worker(&storage, &config, Arc::new(UnreachableBus));

        let job = worker.jobs().create_job("crawl").unwrap();
        let outcome = worker.handle(ContinueCrawl::new(job.id())).await.unwrap();
        assert_eq!(outcome, WindowOutcome::Pending { progress: 50.0 });

        let stored = worker.jobs().get_by_uuid(job.id()).unwrap().unwrap();
        assert_eq!(stored.status(), Status::Pending);
        assert_eq!(stored.progress(), 50.0);
        assert_eq!(stored.warnings().len(), 1);
        assert!(stored.warnings()[0].contains("Continuation not scheduled"));
        assert!(stored.metadata_value(META_ENGINE_JOB_ID).is_some());
        assert_eq!(
            stored.metadata_value(META_OBSERVER_RESULTS),
            Some(&json!({"link-health": {"ok": 1, "error": 0}}))
        );
    }

    #[tokio::test]
    async fn test_missing_session_marks_job_pending_with_warning() {
        let storage = SharedStorage::new(SqliteStorage::new_in_memory().unwrap());
        let dir = TempDir::new().unwrap();
        let config = config(&[], &dir);
        let bus = Arc::new(SqliteMessageBus::new(storage.clone()));
        let worker = worker(&storage, &config, bus.clone());

        let job = worker
            .jobs()
            .create_job("crawl")
            .unwrap()
            .with_metadata(META_ENGINE_JOB_ID, json!("gone"));
        worker.jobs().persist(&job).unwrap();

        let err = worker.handle(ContinueCrawl::new(job.id())).await.unwrap_err();
        assert!(matches!(err, SweepError::SessionNotFound(_)));

        let stored = worker.jobs().get_by_uuid(job.id()).unwrap().unwrap();
        assert_eq!(stored.status(), Status::Pending);
        assert_eq!(stored.warnings().len(), 1);
        assert_eq!(bus.backlog().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_completion_write_keeps_job_pending() {
        let a = page_server().await;
        let storage = SharedStorage::new(SqliteStorage::new_in_memory().unwrap());
        let dir = TempDir::new().unwrap();
        let config = config(&[a.uri()], &dir);
        let bus = Arc::new(SqliteMessageBus::new(storage.clone()));
        let worker = worker(&storage, &config, bus.clone());

        let job = worker.jobs().create_job("crawl").unwrap();
        storage
            .with(|s| {
                s.execute_batch(
                    "CREATE TRIGGER reject_completion BEFORE UPDATE ON jobs
                     WHEN NEW.status = 'completed'
                     BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
                )
            })
            .unwrap();

        let err = worker.handle(ContinueCrawl::new(job.id())).await.unwrap_err();
        assert!(matches!(err, SweepError::Storage(_)));

        let stored = worker.jobs().get_by_uuid(job.id()).unwrap().unwrap();
        assert_eq!(stored.status(), Status::Pending);
        assert_eq!(stored.warnings().len(), 1);
        assert!(stored.warnings()[0].contains("disk full"));
        assert_eq!(bus.backlog().unwrap(), 0);
    }
}
