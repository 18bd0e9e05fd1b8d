// src/downloader/sanitize.rs

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static UNSAFE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9._-]+").expect("static regex is valid"));

/// Turns a link into a lowercase filename made only of `[a-z0-9._-]`.
///
/// The name is the last path segment, percent-decoded when it decodes to valid
/// UTF-8. Every run of other characters collapses to a single `_`. Returns an
/// empty string when the link does not parse or its path ends in `/`.
pub fn sanitize_filename(link: &str) -> String {
    let Some(url) = parse_link(link) else {
        return String::new();
    };

    let segment = url.path().rsplit('/').next().unwrap_or_default();
    let decoded = match urlencoding::decode(segment) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => segment.to_string(),
    };

    UNSAFE_RUN
        .replace_all(&decoded.to_lowercase(), "_")
        .into_owned()
}

/// Site-relative links are resolved against a placeholder origin so only
/// their path matters.
fn parse_link(link: &str) -> Option<Url> {
    match Url::parse(link) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse("http://localhost/").ok()?.join(link).ok()
        }
        Err(_) => None,
    }
}
