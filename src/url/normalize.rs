use crate::UrlError;
use url::Url;

/// Query parameters that only carry click or campaign tracking
///
/// Any `utm_*` parameter is dropped as well.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "ref", "source"];

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

/// Canonical form of a discovered link, used as the frontier's dedup key
///
/// Parsing already lowercases the host, resolves dot segments and turns an
/// empty path into `/`. On top of that the fragment is dropped, runs of
/// slashes collapse into one (a trailing slash is kept), tracking parameters
/// are removed and the remaining query pairs are sorted. Scheme and port are
/// left alone so that different sites on one host stay apart.
///
/// # Examples
///
/// ```
/// use sumi_sweep::url::normalize_url;
///
/// let url = normalize_url("https://EXAMPLE.COM/a/../page/#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/page/");
/// ```
pub fn normalize_url(raw: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(raw).map_err(|e| UrlError::Parse(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlError::InvalidScheme(other.to_string())),
    }
    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }

    url.set_fragment(None);

    let path = collapse_slashes(url.path());
    url.set_path(&path);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    Ok(url)
}

fn collapse_slashes(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut collapsed = format!("/{}", segments.join("/"));
    if !segments.is_empty() && path.ends_with('/') {
        collapsed.push('/');
    }
    collapsed
}
