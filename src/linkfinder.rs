// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! LinkFinder-style endpoint extraction from JS and HTML bodies.
//!
//! Returns relative/absolute path strings plus the synthetic requests the
//! JS scanner recovered from the same body. Paths are raw; the caller
//! normalises them against the response URL and then the crawl site.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::js_scanner;
use crate::request::SyntheticRequest;

// Quoted-string endpoint pattern in the xnLinkFinder family: absolute
// URLs, rooted or dotted relative paths, and bare file paths with an
// extension or query.
static LINK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?:"|')(((?:[a-zA-Z]{1,10}://|//)[^"'/]{1,}\.[a-zA-Z]{2,}[^"']{0,})|((?:/|\.\./|\./)[^"'><,;| *()(%%$^/\\\[\]][^"'><,;|()]{1,})|([a-zA-Z0-9_\-/]{1,}/[a-zA-Z0-9_\-/]{1,}\.(?:[a-zA-Z]{1,4}|action)(?:[\?|#][^"|']{0,}|))|([a-zA-Z0-9_\-/]{1,}/[a-zA-Z0-9_\-/]{3,}(?:[\?|#][^"|']{0,}|))|([a-zA-Z0-9_\-]{1,}\.(?:php|asp|aspx|jsp|json|action|html|js|txt|xml)(?:[\?|#][^"|']{0,}|)))(?:"|')"#,
    )
    .expect("invalid linkfinder pattern")
});

const SKIP_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff", ".woff2", ".ttf", ".otf", ".eot",
    ".mp3", ".mp4", ".webm", ".css",
];

/// `(paths, js_requests)` discovered in `source`.
pub fn link_finder(source: &str, base: Option<&Url>) -> (Vec<String>, Vec<SyntheticRequest>) {
    let mut paths: Vec<String> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for caps in LINK_REGEX.captures_iter(source) {
        let Some(m) = caps.get(1) else { continue };
        let candidate = m.as_str().trim();
        if candidate.is_empty() || candidate.len() > 2048 {
            continue;
        }
        let lower = candidate.to_lowercase();
        if lower.starts_with("javascript:")
            || lower.starts_with("mailto:")
            || lower.starts_with("data:")
            || lower.starts_with("text/")
            || lower.starts_with("application/")
        {
            continue;
        }
        if SKIP_EXTENSIONS.iter().any(|ext| {
            lower
                .split(&['?', '#'][..])
                .next()
                .map(|p| p.ends_with(ext))
                .unwrap_or(false)
        }) {
            continue;
        }
        if seen.insert(candidate.to_string()) {
            paths.push(candidate.to_string());
        }
    }

    let requests = js_scanner::extract_js_requests(source, base);

    (paths, requests)
}
