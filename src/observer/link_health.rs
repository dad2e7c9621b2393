use crate::frontier::FrontierEntry;
use crate::observer::{
    ContentDecision, FetchFailure, Observer, ObserverError, RequestDecision, ResponseHead,
};
use crate::url::UriCollection;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// ok/error totals reported by [`LinkHealthObserver`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkHealthCounts {
    pub ok: u64,
    pub error: u64,
}

/// Broken-link checker
///
/// Follows links on collection pages one hop outward, classifies every
/// response by its status line and never downloads a body.
pub struct LinkHealthObserver {
    collection: Arc<UriCollection>,
    ok: AtomicU64,
    error: AtomicU64,
}

impl LinkHealthObserver {
    pub const NAME: &'static str = "link-health";

    pub fn new(collection: Arc<UriCollection>) -> Self {
        Self {
            collection,
            ok: AtomicU64::new(0),
            error: AtomicU64::new(0),
        }
    }

    pub fn counts(&self) -> LinkHealthCounts {
        LinkHealthCounts {
            ok: self.ok.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
        }
    }

    fn record_error(&self, entry: &FrontierEntry, cause: &dyn std::fmt::Display) {
        self.error.fetch_add(1, Ordering::Relaxed);
        error!(
            url = %entry.url,
            found_on = entry.found_on.as_ref().map(|u| u.as_str()).unwrap_or("-"),
            "Broken link: {}",
            cause
        );
    }

    fn parse(&self, value: &Value) -> Result<LinkHealthCounts, ObserverError> {
        serde_json::from_value(value.clone()).map_err(|e| ObserverError::Aggregate {
            observer: Self::NAME.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl Observer for LinkHealthObserver {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn should_request(&self, entry: &FrontierEntry) -> Option<RequestDecision> {
        let on_collection = self.collection.contains_host(&entry.url);
        let found_on_collection = entry
            .found_on
            .as_ref()
            .is_some_and(|parent| self.collection.contains_host(parent));

        if on_collection || found_on_collection {
            Some(RequestDecision::Request)
        } else {
            debug!(
                url = %entry.url,
                "Skipping: neither the URI nor the page it was found on belongs to the collection"
            );
            Some(RequestDecision::Skip)
        }
    }

    fn needs_content(
        &self,
        entry: &FrontierEntry,
        head: &ResponseHead,
        _first_chunk: &[u8],
    ) -> Option<ContentDecision> {
        if (200..400).contains(&head.status) {
            self.ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.record_error(entry, &format!("HTTP {}", head.status));
        }
        Some(ContentDecision::DontNeed)
    }

    fn on_exception(&self, entry: &FrontierEntry, failure: &FetchFailure) {
        self.record_error(entry, failure);
    }

    fn result(&self) -> Value {
        serde_json::to_value(self.counts()).unwrap_or(Value::Null)
    }

    fn merge(&self, previous: Option<&Value>, current: Value) -> Result<Value, ObserverError> {
        let current = self.parse(&current)?;
        let previous = match previous {
            Some(value) => self.parse(value)?,
            None => LinkHealthCounts::default(),
        };

        let merged = LinkHealthCounts {
            ok: previous.ok + current.ok,
            error: previous.error + current.error,
        };
        Ok(serde_json::to_value(merged).unwrap_or(Value::Null))
    }
}
