use crate::url::domain::authority;
use std::collections::HashSet;
use url::Url;

/// The authoritative set of URIs a crawl starts from
///
/// At most one URI per host (see [`authority`]) is kept; the set of hosts
/// doubles as the confidentiality scope of the crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UriCollection {
    uris: Vec<Url>,
    hosts: HashSet<String>,
}

impl UriCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a URI unless its host is already represented
    ///
    /// Returns `true` if the URI was added.
    pub fn insert(&mut self, uri: Url) -> bool {
        let Some(host) = authority(&uri) else {
            return false;
        };
        if !self.hosts.insert(host) {
            return false;
        }
        self.uris.push(uri);
        true
    }

    /// Whether the URI's host belongs to the collection
    pub fn contains_host(&self, uri: &Url) -> bool {
        authority(uri)
            .map(|host| self.hosts.contains(&host))
            .unwrap_or(false)
    }

    pub fn uris(&self) -> &[Url] {
        &self.uris
    }

    pub fn len(&self) -> usize {
        self.uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }

    /// String form used when the collection is persisted with a session
    pub fn to_strings(&self) -> Vec<String> {
        self.uris.iter().map(|u| u.to_string()).collect()
    }

    /// Rebuilds a collection from its persisted string form
    pub fn from_strings<I, S>(uris: I) -> Result<Self, url::ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut collection = Self::new();
        for uri in uris {
            collection.insert(Url::parse(uri.as_ref())?);
        }
        Ok(collection)
    }
}
