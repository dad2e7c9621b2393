//! HTML parsing for link discovery and indexing
//!
//! This module extracts from an HTML page:
//! - Links to follow (from `<a>` tags, canonical links and frames)
//! - The page title
//! - The visible body text submitted to the index

use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

/// Elements whose text never reaches the index
const INVISIBLE: &[&str] = &["script", "style", "noscript", "template", "head"];

/// What a page contributes to the crawl
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub title: Option<String>,

    /// Absolute http(s) URLs with fragments removed, in document order
    pub links: Vec<Url>,

    /// Visible text with whitespace collapsed
    pub text: String,
}

/// Parses an HTML document
///
/// Links are resolved against `base_url`. `javascript:`, `mailto:`, `tel:`
/// and `data:` links, fragment-only anchors and `<a download>` links are
/// dropped. `rel="nofollow"` is ignored: broken-link checks must see every
/// link a visitor could click.
///
/// # Example
///
/// ```
/// use sumi_sweep::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links[0].as_str(), "https://example.com/page");
/// ```
pub fn parse_html(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document),
        links: extract_links(&document, base_url),
        text: extract_text(&document),
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<Url> {
    let sources = [
        ("a[href]", "href"),
        ("link[rel='canonical'][href]", "href"),
        ("iframe[src]", "src"),
        ("frame[src]", "src"),
    ];

    let mut links = Vec::new();
    for (css, attr) in sources {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };

        for element in document.select(&selector) {
            if element.value().name() == "a" && element.value().attr("download").is_some() {
                continue;
            }

            if let Some(url) = element
                .value()
                .attr(attr)
                .and_then(|href| resolve_link(href, base_url))
            {
                if !links.contains(&url) {
                    links.push(url);
                }
            }
        }
    }

    links
}

/// Resolves a link to an absolute http(s) URL without fragment
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let mut absolute = base_url.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }
    absolute.set_fragment(None);
    Some(absolute)
}

fn extract_text(document: &Html) -> String {
    let mut out = String::new();
    collect_text(document.root_element(), &mut out);
    collapse_whitespace(&out)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    if INVISIBLE.contains(&element.value().name()) {
        return;
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, out);
                }
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
