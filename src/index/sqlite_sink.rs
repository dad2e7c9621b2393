use crate::crawler::parse_html;
use crate::index::{Document, IndexSink, SinkError};
use crate::storage::{DocumentRecord, DocumentWrite, SharedStorage, Storage};
use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

/// Index sink writing into the `documents` table
#[derive(Clone)]
pub struct SqliteIndexSink {
    storage: SharedStorage,
}

impl SqliteIndexSink {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }
}

fn checksum(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

impl IndexSink for SqliteIndexSink {
    fn index(&self, document: &Document) -> Result<(), SinkError> {
        let base = Url::parse(&document.url)
            .map_err(|e| SinkError::Warning(format!("unindexable URI {}: {}", document.url, e)))?;
        let parsed = parse_html(&document.body, &base);

        let record = DocumentRecord {
            url: document.url.clone(),
            status_code: document.status,
            headers: document.headers.clone(),
            title: parsed.title,
            body_text: parsed.text,
            checksum: checksum(&document.body),
            indexed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };

        match self.storage.with(|s| s.upsert_document(&record))? {
            DocumentWrite::Unchanged => Err(SinkError::Warning(format!(
                "{} unchanged since last index",
                document.url
            ))),
            write => {
                debug!(url = %document.url, ?write, "Indexed document");
                Ok(())
            }
        }
    }

    fn delete(&self, document: &Document) -> Result<(), SinkError> {
        if self.storage.with(|s| s.delete_document(&document.url))? {
            Ok(())
        } else {
            Err(SinkError::Warning(format!("{} was not indexed", document.url)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;
    use std::collections::BTreeMap;

    fn sink() -> (SqliteIndexSink, SharedStorage) {
        let storage = SharedStorage::new(SqliteStorage::new_in_memory().unwrap());
        (SqliteIndexSink::new(storage.clone()), storage)
    }

    fn document(body: &str) -> Document {
        Document {
            url: "https://example.com/".to_string(),
            status: 200,
            headers: BTreeMap::from([("content-type".to_string(), "text/html".to_string())]),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_index_stores_title_and_text() {
        let (sink, storage) = sink();
        sink.index(&document(
            "<html><head><title>Home</title></head><body>Welcome</body></html>",
        ))
        .unwrap();

        let stored = storage
            .with(|s| s.get_document("https://example.com/"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.title.as_deref(), Some("Home"));
        assert_eq!(stored.body_text, "Welcome");
        assert_eq!(stored.checksum.len(), 64);
    }

    #[test]
    fn test_unchanged_document_is_warning() {
        let (sink, _) = sink();
        let doc = document("<p>same</p>");

        sink.index(&doc).unwrap();
        let err = sink.index(&doc).unwrap_err();
        assert!(err.is_warning());

        assert!(sink.index(&document("<p>changed</p>")).is_ok());
    }

    #[test]
    fn test_delete() {
        let (sink, _) = sink();
        let doc = document("<p>x</p>");

        assert!(sink.delete(&doc).unwrap_err().is_warning());
        sink.index(&doc).unwrap();
        assert!(sink.delete(&doc).is_ok());
    }
}
