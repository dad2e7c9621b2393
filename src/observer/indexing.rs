use crate::frontier::FrontierEntry;
use crate::index::{Document, IndexSink};
use crate::observer::{
    ContentDecision, Exchange, FetchFailure, Observer, ObserverError, ResponseHead,
};
use crate::output::{write_report, ReportRow};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Full-text indexer
///
/// Never votes on fetching. Asks for the body of HTML responses, submits
/// them to the index sink and keeps one report row per accepted page. Pages
/// that answer with a client error are removed from the index.
pub struct IndexingObserver {
    sink: Arc<dyn IndexSink>,
    report_dir: PathBuf,
    rows: Mutex<Vec<ReportRow>>,
}

impl IndexingObserver {
    pub const NAME: &'static str = "indexing";

    pub fn new(sink: Arc<dyn IndexSink>, report_dir: PathBuf) -> Self {
        Self {
            sink,
            report_dir,
            rows: Mutex::new(Vec::new()),
        }
    }

    fn rows_of(value: &Value) -> Result<Vec<ReportRow>, ObserverError> {
        serde_json::from_value(value.clone()).map_err(|e| ObserverError::Aggregate {
            observer: Self::NAME.to_string(),
            reason: e.to_string(),
        })
    }

    fn push_row(&self, row: ReportRow) {
        match self.rows.lock() {
            Ok(mut rows) => rows.push(row),
            Err(poisoned) => poisoned.into_inner().push(row),
        }
    }
}

fn header_map(head: &ResponseHead) -> BTreeMap<String, String> {
    head.headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

#[async_trait]
impl Observer for IndexingObserver {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn needs_content(
        &self,
        _entry: &FrontierEntry,
        head: &ResponseHead,
        _first_chunk: &[u8],
    ) -> Option<ContentDecision> {
        head.is_html().then_some(ContentDecision::Download)
    }

    async fn on_last_chunk(&self, exchange: &Exchange) -> Result<(), ObserverError> {
        if !exchange.head.is_html() {
            return Ok(());
        }

        let entry = &exchange.entry;
        let document = Document {
            url: entry.url.to_string(),
            status: exchange.head.status,
            headers: header_map(&exchange.head),
            body: exchange.body.clone(),
        };

        match self.sink.index(&document) {
            Ok(()) => {}
            Err(e) if e.is_warning() => warn!(url = %entry.url, "{}", e),
            Err(e) => return Err(e.into()),
        }

        self.push_row(ReportRow {
            status_code: exchange.head.status,
            uri: document.url,
            depth: entry.depth,
            found_on: entry.found_on.as_ref().map(|u| u.to_string()),
        });
        Ok(())
    }

    /// Drops a previously indexed page that now answers with a client error
    fn on_exception(&self, entry: &FrontierEntry, failure: &FetchFailure) {
        let FetchFailure::Status(head) = failure else {
            return;
        };
        if !(400..500).contains(&head.status) {
            return;
        }

        let document = Document {
            url: entry.url.to_string(),
            status: head.status,
            headers: header_map(head),
            body: String::new(),
        };
        match self.sink.delete(&document) {
            Ok(()) => info!(url = %entry.url, status = head.status, "Removed document from index"),
            Err(e) if e.is_warning() => debug!(url = %entry.url, "{}", e),
            Err(e) => warn!(url = %entry.url, error = %e, "Could not remove document from index"),
        }
    }

    fn result(&self) -> Value {
        let rows = match self.rows.lock() {
            Ok(rows) => rows.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        serde_json::to_value(rows).unwrap_or(Value::Null)
    }

    fn merge(&self, previous: Option<&Value>, current: Value) -> Result<Value, ObserverError> {
        let mut rows = match previous {
            Some(value) => Self::rows_of(value)?,
            None => Vec::new(),
        };
        rows.extend(Self::rows_of(&current)?);

        serde_json::to_value(rows).map_err(|e| ObserverError::Aggregate {
            observer: Self::NAME.to_string(),
            reason: e.to_string(),
        })
    }

    async fn finished_crawling(&self, job_id: &str, aggregate: &Value) -> Result<(), ObserverError> {
        let rows = Self::rows_of(aggregate)?;
        let path = write_report(&self.report_dir, job_id, &rows)?;
        info!(job = job_id, rows = rows.len(), path = %path.display(), "Wrote crawl report");
        Ok(())
    }
}
