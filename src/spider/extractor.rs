// src/spider/extractor.rs

use std::collections::HashSet;
use std::sync::OnceLock;

use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

static LINK_SELECTOR: OnceLock<Selector> = OnceLock::new();

fn link_selector() -> &'static Selector {
    LINK_SELECTOR.get_or_init(|| Selector::parse("a[href]").expect("static selector is valid"))
}

/// Returns the `href` of every anchor whose value ends with `extension`,
/// compared case-insensitively, in document order.
pub fn extract_document_links(markup: &str, extension: &str) -> Vec<String> {
    if markup.trim().is_empty() {
        warn!("No markup to extract links from");
        return Vec::new();
    }

    let document = Html::parse_document(markup);
    if !document.errors.is_empty() {
        debug!("Markup parsed with {} recoverable errors", document.errors.len());
    }

    let suffix = extension.to_lowercase();
    document
        .select(link_selector())
        .filter_map(|element| element.value().attr("href"))
        .map(str::trim)
        .filter(|href| href.to_lowercase().ends_with(&suffix))
        .map(String::from)
        .collect()
}

/// Keeps the first occurrence of each link, preserving order.
pub fn dedup_links<I>(links: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    links
        .into_iter()
        .filter(|link| seen.insert(link.clone()))
        .collect()
}

/// Makes `link` absolute. Links that already carry a host are returned
/// untouched; anything else is resolved against `base`.
pub fn normalize_link(link: &str, base: &Url) -> Option<String> {
    match Url::parse(link) {
        Ok(url) if url.has_host() => Some(link.to_string()),
        _ => base
            .join(link)
            .ok()
            .filter(|url| url.has_host())
            .map(|url| url.to_string()),
    }
}
