//! Integration tests for the crawl execution loop
//!
//! These tests use wiremock to create mock HTTP servers and drive jobs
//! through full windows against an on-disk database.

use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use sumi_sweep::bus::{ContinueCrawl, MessageBus, SqliteMessageBus};
use sumi_sweep::config::{parse_config, Config};
use sumi_sweep::crawler::{EngineSettings, HttpEngine, SessionFactory};
use sumi_sweep::index::{Document, IndexSink, SinkError, SqliteIndexSink};
use sumi_sweep::job::{JobId, Status};
use sumi_sweep::output::report_path;
use sumi_sweep::storage::{open_storage, SharedStorage};
use sumi_sweep::worker::META_OBSERVER_RESULTS;
use sumi_sweep::{CrawlWorker, Jobs, WindowOutcome};
use tempfile::TempDir;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration whose collection is the given servers
fn create_test_config(dir: &TempDir, servers: &[&MockServer], budget: u32, extra: &str) -> Config {
    let uris: Vec<String> = servers.iter().map(|s| format!("\"{}/\"", s.uri())).collect();

    parse_config(&format!(
        r#"
[crawler]
max-requests-per-window = {budget}
max-concurrent-requests = 2
max-depth = 1

[user-agent]
crawler-name = "TestSweeper"
crawler-version = "1.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[output]
database-path = "{db}"
report-dir = "{reports}"

[collection]
extra-uris = [{uris}]

{extra}
"#,
        budget = budget,
        db = dir.path().join("sweep.db").display(),
        reports = dir.path().join("reports").display(),
        uris = uris.join(", "),
        extra = extra,
    ))
    .expect("Failed to parse test config")
}

fn open(config: &Config) -> SharedStorage {
    SharedStorage::new(
        open_storage(Path::new(&config.output.database_path)).expect("Failed to open database"),
    )
}

/// Builds a worker the way the binary does
fn create_worker(config: &Config, storage: &SharedStorage) -> CrawlWorker {
    create_worker_with_sink(config, storage, Arc::new(SqliteIndexSink::new(storage.clone())))
}

fn create_worker_with_sink(
    config: &Config,
    storage: &SharedStorage,
    sink: Arc<dyn IndexSink>,
) -> CrawlWorker {
    let engine = HttpEngine::new(
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap(),
        storage.clone(),
        EngineSettings {
            max_concurrent_requests: config.crawler.max_concurrent_requests,
            max_depth: config.crawler.max_depth,
            config_hash: "test".to_string(),
        },
    );
    let factory = SessionFactory::new(
        Arc::new(config.clone()),
        Arc::new(engine),
        sink,
    );
    let bus = Arc::new(SqliteMessageBus::new(storage.clone()));

    CrawlWorker::new(Jobs::system(storage.clone()), factory, bus, config)
}

/// Queues a fresh crawl job
fn enqueue_job(storage: &SharedStorage) -> JobId {
    let job = Jobs::system(storage.clone()).create_job("crawl").unwrap();
    SqliteMessageBus::new(storage.clone())
        .dispatch(ContinueCrawl::new(job.id()))
        .unwrap();
    job.id()
}

async fn page_server(body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body.to_string())
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_two_windows_with_budget_of_one() {
    let a = page_server("<html><head><title>A</title></head><body>A</body></html>").await;
    let b = page_server("<html><head><title>B</title></head><body>B</body></html>").await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &[&a, &b], 1, "");
    let storage = open(&config);
    let worker = create_worker(&config, &storage);
    let bus = SqliteMessageBus::new(storage.clone());

    let job_id = enqueue_job(&storage);

    // Window 1
    assert_eq!(worker.drain(Some(1)).await.unwrap(), 1);
    let job = worker.jobs().get_by_uuid(job_id).unwrap().unwrap();
    assert_eq!(job.status(), Status::Pending);
    assert_eq!(job.progress(), 50.0);
    assert_eq!(bus.backlog().unwrap(), 1);

    // Window 2
    assert_eq!(worker.drain(Some(1)).await.unwrap(), 1);
    let job = worker.jobs().get_by_uuid(job_id).unwrap().unwrap();
    assert_eq!(job.status(), Status::Completed);
    assert_eq!(job.progress(), 100.0);
    assert_eq!(bus.backlog().unwrap(), 0);
    assert!(job.warnings().is_empty());

    // Nothing left to drain
    assert_eq!(worker.drain(None).await.unwrap(), 0);

    let report = std::fs::read_to_string(report_path(
        Path::new(&config.output.report_dir),
        &job_id.to_string(),
    ))
    .expect("Report should be written on completion");
    assert_eq!(report.lines().count(), 3);
    assert!(report.contains(&format!("200,{}/,0,", a.uri())));
    assert!(report.contains(&format!("200,{}/,0,", b.uri())));
}

#[tokio::test]
async fn test_single_window_with_large_budget() {
    let a = page_server("<p>A</p>").await;
    let b = page_server("<p>B</p>").await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &[&a, &b], 5, "");
    let storage = open(&config);
    let worker = create_worker(&config, &storage);

    let job_id = Jobs::system(storage.clone()).create_job("crawl").unwrap().id();
    let outcome = worker.resume(job_id).await.unwrap();

    assert_eq!(outcome, WindowOutcome::Completed);
    let job = worker.jobs().get_by_uuid(job_id).unwrap().unwrap();
    assert_eq!(job.status(), Status::Completed);
    assert_eq!(job.progress(), 100.0);
    assert_eq!(SqliteMessageBus::new(storage).backlog().unwrap(), 0);
}

#[tokio::test]
async fn test_absent_or_completed_job_is_untouched() {
    let a = page_server("<p>A</p>").await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &[&a], 5, "");
    let storage = open(&config);
    let worker = create_worker(&config, &storage);
    let bus = SqliteMessageBus::new(storage.clone());

    let outcome = worker.resume(JobId::new_v4()).await.unwrap();
    assert_eq!(outcome, WindowOutcome::Skipped);

    let completed = Jobs::system(storage.clone())
        .create_job("crawl")
        .unwrap()
        .mark_completed();
    worker.jobs().persist(&completed).unwrap();

    let outcome = worker.resume(completed.id()).await.unwrap();
    assert_eq!(outcome, WindowOutcome::Skipped);
    assert_eq!(
        worker.jobs().get_by_uuid(completed.id()).unwrap().unwrap(),
        completed
    );
    assert_eq!(bus.backlog().unwrap(), 0);

    // No request was made for either message
    assert!(a.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_confidential_headers_stay_on_collection_hosts() {
    let c = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header_exists("x-api-key"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&c)
        .await;
    Mock::given(method("GET"))
        .and(path("/elsewhere"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html"))
        .expect(1)
        .mount(&c)
        .await;

    let collection_page = |body: String| {
        ResponseTemplate::new(200)
            .set_body_string(body)
            .insert_header("content-type", "text/html")
    };

    let a = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("x-api-key", "s3cret"))
        .respond_with(collection_page(format!(
            r#"<a href="{}/elsewhere">C</a>"#,
            c.uri()
        )))
        .expect(1)
        .mount(&a)
        .await;

    let b = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("x-api-key", "s3cret"))
        .respond_with(collection_page("<p>B</p>".to_string()))
        .expect(1)
        .mount(&b)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(
        &dir,
        &[&a, &b],
        10,
        "[confidential-headers]\nx-api-key = \"s3cret\"\n",
    );
    let storage = open(&config);
    let worker = create_worker(&config, &storage);

    let job_id = Jobs::system(storage.clone()).create_job("crawl").unwrap().id();
    assert_eq!(worker.resume(job_id).await.unwrap(), WindowOutcome::Completed);

    a.verify().await;
    b.verify().await;
    c.verify().await;

    let job = worker.jobs().get_by_uuid(job_id).unwrap().unwrap();
    assert_eq!(
        job.metadata_value(META_OBSERVER_RESULTS).unwrap()["link-health"],
        json!({"ok": 3, "error": 0})
    );
}

#[tokio::test]
async fn test_link_health_counts_survive_restart() {
    let a = page_server("<p>A</p>").await;
    let b = page_server("<p>B</p>").await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(
        &dir,
        &[&a, &b],
        1,
        "[observers]\nenabled = [\"link-health\"]\n",
    );

    let job_id = {
        let storage = open(&config);
        let worker = create_worker(&config, &storage);
        let job_id = enqueue_job(&storage);
        worker.drain(Some(1)).await.unwrap();

        let job = worker.jobs().get_by_uuid(job_id).unwrap().unwrap();
        assert_eq!(
            job.metadata_value(META_OBSERVER_RESULTS).unwrap()["link-health"],
            json!({"ok": 1, "error": 0})
        );
        job_id
    };

    // A new process picks the continuation up from the same database
    let storage = open(&config);
    let worker = create_worker(&config, &storage);
    worker.drain(None).await.unwrap();

    let job = worker.jobs().get_by_uuid(job_id).unwrap().unwrap();
    assert_eq!(job.status(), Status::Completed);
    assert_eq!(
        job.metadata_value(META_OBSERVER_RESULTS).unwrap()["link-health"],
        json!({"ok": 2, "error": 0})
    );
    assert_eq!(a.received_requests().await.unwrap().len(), 1);
    assert_eq!(b.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_broken_links_are_counted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<a href="/gone">gone</a><a href="/ok">ok</a>"#)
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/plain"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &[&server], 10, "");
    let storage = open(&config);
    let worker = create_worker(&config, &storage);

    let job_id = Jobs::system(storage.clone()).create_job("crawl").unwrap().id();
    worker.resume(job_id).await.unwrap();

    let job = worker.jobs().get_by_uuid(job_id).unwrap().unwrap();
    assert_eq!(
        job.metadata_value(META_OBSERVER_RESULTS).unwrap()["link-health"],
        json!({"ok": 2, "error": 1})
    );
}

/// Index sink that is down for its first call
#[derive(Default)]
struct RecoveringSink {
    failed_once: AtomicBool,
    indexed: Mutex<Vec<String>>,
}

impl IndexSink for RecoveringSink {
    fn index(&self, document: &Document) -> Result<(), SinkError> {
        if !self.failed_once.swap(true, Ordering::SeqCst) {
            return Err(SinkError::Hard("index offline".to_string()));
        }
        self.indexed.lock().unwrap().push(document.url.clone());
        Ok(())
    }

    fn delete(&self, _document: &Document) -> Result<(), SinkError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_hard_sink_failure_is_retried_next_window() {
    let a = page_server("<html><head><title>A</title></head><body>A</body></html>").await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &[&a], 5, "[observers]\nenabled = [\"indexing\"]\n");
    let storage = open(&config);
    let sink = Arc::new(RecoveringSink::default());
    let worker = create_worker_with_sink(&config, &storage, sink.clone());

    let job_id = Jobs::system(storage.clone()).create_job("crawl").unwrap().id();

    // Window 1: the sink rejects the page
    assert!(worker.resume(job_id).await.is_err());
    let job = worker.jobs().get_by_uuid(job_id).unwrap().unwrap();
    assert_eq!(job.status(), Status::Pending);
    assert_eq!(job.warnings().len(), 1);
    assert!(job.warnings()[0].contains("index offline"));
    assert_eq!(
        job.metadata_value(META_OBSERVER_RESULTS).unwrap()["indexing"],
        json!([])
    );
    assert!(sink.indexed.lock().unwrap().is_empty());

    // Window 2: the page is fetched again and indexed
    assert_eq!(worker.resume(job_id).await.unwrap(), WindowOutcome::Completed);
    assert_eq!(*sink.indexed.lock().unwrap(), vec![format!("{}/", a.uri())]);
    assert_eq!(a.received_requests().await.unwrap().len(), 2);

    let report = std::fs::read_to_string(report_path(
        Path::new(&config.output.report_dir),
        &job_id.to_string(),
    ))
    .expect("Report should be written on completion");
    assert_eq!(report.lines().count(), 2);
    assert!(report.contains(&format!("200,{}/,0,", a.uri())));
}
