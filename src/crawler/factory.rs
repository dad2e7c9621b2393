use crate::config::Config;
use crate::crawler::{CrawlEngine, CrawlSession, HeaderScope};
use crate::index::IndexSink;
use crate::observer::{build_observer, Observer, ObserverContext, OBSERVER_NAMES};
use crate::url::UriCollection;
use crate::SweepError;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Builds crawl sessions for the execution loop
///
/// Owns the parts of a session that come from configuration: the
/// authoritative URI collection, the observer set and the confidential
/// headers, which are only ever sent to hosts of the collection.
#[derive(Clone)]
pub struct SessionFactory {
    config: Arc<Config>,
    engine: Arc<dyn CrawlEngine>,
    sink: Arc<dyn IndexSink>,
}

impl SessionFactory {
    pub fn new(config: Arc<Config>, engine: Arc<dyn CrawlEngine>, sink: Arc<dyn IndexSink>) -> Self {
        Self {
            config,
            engine,
            sink,
        }
    }

    /// Published site roots followed by the configured extra URIs
    ///
    /// A URI whose host is already in the collection is not added again.
    pub fn build_collection(&self) -> Result<UriCollection, SweepError> {
        let roots = self
            .config
            .site
            .iter()
            .filter(|site| site.published)
            .map(|site| site.root.as_str());
        let extras = self.config.collection.extra_uris.iter().map(String::as_str);

        let mut collection = UriCollection::new();
        for uri in roots.chain(extras) {
            if !collection.insert(Url::parse(uri)?) {
                debug!(uri, "Host already in collection");
            }
        }

        Ok(collection)
    }

    /// Known observer names among `requested`, in registry order
    ///
    /// Fails with the list of valid names when nothing known was requested.
    pub fn resolve_observer_names(requested: &[String]) -> Result<Vec<&'static str>, SweepError> {
        let resolved: Vec<&'static str> = OBSERVER_NAMES
            .iter()
            .copied()
            .filter(|name| requested.iter().any(|r| r.trim() == *name))
            .collect();

        if resolved.is_empty() {
            return Err(SweepError::UnknownObservers {
                requested: requested.to_vec(),
                valid: OBSERVER_NAMES.iter().map(|n| n.to_string()).collect(),
            });
        }

        Ok(resolved)
    }

    fn observers(
        &self,
        requested: &[String],
        collection: Arc<UriCollection>,
    ) -> Result<Vec<Arc<dyn Observer>>, SweepError> {
        let ctx = ObserverContext {
            collection,
            sink: self.sink.clone(),
            report_dir: PathBuf::from(&self.config.output.report_dir),
        };

        Ok(Self::resolve_observer_names(requested)?
            .into_iter()
            .filter_map(|name| build_observer(name, &ctx))
            .collect())
    }

    fn header_scope(&self, collection: Arc<UriCollection>) -> Result<HeaderScope, SweepError> {
        HeaderScope::new(collection, &self.config.confidential_headers)
    }

    /// Starts a fresh session over `collection`
    pub fn create_session(
        &self,
        collection: UriCollection,
        requested_observers: &[String],
    ) -> Result<Box<dyn CrawlSession>, SweepError> {
        let collection = Arc::new(collection);
        let observers = self.observers(requested_observers, collection.clone())?;
        let headers = self.header_scope(collection.clone())?;

        self.engine.create_session(collection, headers, observers)
    }

    /// Picks up an existing session by its engine id
    pub fn resume_session(
        &self,
        engine_job_id: &str,
        requested_observers: &[String],
    ) -> Result<Box<dyn CrawlSession>, SweepError> {
        let collection = Arc::new(self.engine.session_collection(engine_job_id)?);
        let observers = self.observers(requested_observers, collection.clone())?;
        let headers = self.header_scope(collection)?;

        self.engine.resume_session(engine_job_id, headers, observers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::crawler::{EngineSettings, HttpEngine};
    use crate::index::SqliteIndexSink;
    use crate::storage::{SharedStorage, SqliteStorage};

    const CONFIG: &str = r#"
[crawler]
max-requests-per-window = 10
max-concurrent-requests = 2
max-depth = 2

[user-agent]
crawler-name = "TestSweeper"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[output]
database-path = "./test.db"
report-dir = "./reports"

[collection]
extra-uris = ["https://docs.example.com/", "https://example.com/duplicate-host"]

[[site]]
root = "https://example.com/"

[[site]]
root = "https://draft.example.com/"
published = false
"#;

    fn factory() -> SessionFactory {
        let config = Arc::new(parse_config(CONFIG).unwrap());
        let storage = SharedStorage::new(SqliteStorage::new_in_memory().unwrap());
        let engine = HttpEngine::new(
            reqwest::Client::new(),
            storage.clone(),
            EngineSettings {
                max_concurrent_requests: 2,
                max_depth: 2,
                config_hash: "test".to_string(),
            },
        );
        SessionFactory::new(
            config,
            Arc::new(engine),
            Arc::new(SqliteIndexSink::new(storage)),
        )
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_collection_is_published_roots_plus_extras() {
        let collection = factory().build_collection().unwrap();
        assert_eq!(
            collection.to_strings(),
            vec!["https://example.com/", "https://docs.example.com/"]
        );
    }

    #[test]
    fn test_resolves_known_observers() {
        let resolved =
            SessionFactory::resolve_observer_names(&names(&["indexing", "bogus"])).unwrap();
        assert_eq!(resolved, vec!["indexing"]);
    }

    #[test]
    fn test_unknown_observers_list_valid_names() {
        let err = SessionFactory::resolve_observer_names(&names(&["bogus"])).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("link-health"));
        assert!(message.contains("indexing"));

        assert!(matches!(
            SessionFactory::resolve_observer_names(&[]),
            Err(SweepError::UnknownObservers { .. })
        ));
    }

    #[test]
    fn test_create_session_attaches_observers() {
        let factory = factory();
        let collection = factory.build_collection().unwrap();
        let session = factory
            .create_session(collection, &names(&["link-health", "indexing"]))
            .unwrap();

        let attached: Vec<_> = session.observers().iter().map(|o| o.name()).collect();
        assert_eq!(attached, vec!["link-health", "indexing"]);
        assert_eq!(session.collection().len(), 2);
    }

    #[test]
    fn test_resume_session_restores_collection() {
        let factory = factory();
        let collection = factory.build_collection().unwrap();
        let created = factory
            .create_session(collection, &names(&["link-health"]))
            .unwrap();

        let resumed = factory
            .resume_session(created.job_id(), &names(&["link-health"]))
            .unwrap();
        assert_eq!(resumed.job_id(), created.job_id());
        assert_eq!(resumed.collection(), created.collection());
    }
}
