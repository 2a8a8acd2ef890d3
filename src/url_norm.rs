// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Verkko - URL Normaliser
 * Resolves crawl candidates against a base URL and filters out traps:
 * pseudo-schemes, path loops, recursive queries, static-asset noise.
 */
use url::Url;

const LINK_EXCLUSION_FRAGMENTS: &[&str] = &[
    "wp-content",
    "wp-includes",
    "woocommerce",
    "captcha",
    "node_modules",
    "spinner.gif",
    "fontawesome",
    "gravatar",
    "schema.org",
    "gstatic.com",
    "cloudfront.net/static",
];

const FILE_EXTENSION_EXCLUSIONS: &[&str] = &[
    ".zip", ".dmg", ".rpm", ".deb", ".gz", ".tar", ".tar.gz", ".jpg", ".jpeg", ".png", ".gif",
    ".svg", ".bmp", ".ico", ".woff", ".woff2", ".ttf", ".otf", ".eot", ".mp3", ".mp4", ".avi",
    ".mov", ".mpeg", ".css", ".scss", ".less", ".exe",
];

const MAX_PATH_LEN: usize = 2048;
const MAX_SEGMENTS: usize = 128;
const MAX_QUERY_LEN: usize = 4096;
const REPEAT_THRESHOLD: usize = 3;

/// Resolves `candidate` against `base` and returns the normalised absolute
/// URL, or None when the candidate is rejected.
pub fn normalize_url(base: Option<&Url>, candidate: &str) -> Option<String> {
    let mut candidate = candidate.trim().to_string();
    if candidate.is_empty() {
        return None;
    }

    let lower = candidate.to_lowercase();
    if lower.starts_with("javascript:") || lower.starts_with("mailto:") || lower.starts_with("data:") {
        return None;
    }

    if candidate.starts_with("//") {
        let scheme = base.map(|b| b.scheme()).unwrap_or("http");
        candidate = format!("{}:{}", scheme, candidate);
    }

    let candidate = candidate.trim_matches(|c| "\"'<>[](){} ".contains(c));
    if candidate.is_empty() {
        return None;
    }

    let mut resolved = match base {
        Some(b) => b.join(candidate).ok()?,
        None => Url::parse(candidate).ok()?,
    };

    if resolved.host_str().map(|h| h.is_empty()).unwrap_or(true) {
        return None;
    }

    resolved.set_fragment(None);
    let cleaned = clean_path(resolved.path())?;
    resolved.set_path(&cleaned);

    if has_recursive_query(&resolved) {
        return None;
    }
    if should_exclude(&resolved) {
        return None;
    }

    Some(resolved.to_string())
}

fn clean_path(p: &str) -> Option<String> {
    let p = p.trim();
    if p.is_empty() {
        return Some("/".to_string());
    }

    let mut p = p.replace('\\', "/");
    while p.contains("//") {
        p = p.replace("//", "/");
    }

    let trailing_slash = p.ends_with('/');
    let trimmed = p.trim_matches('/');
    if trimmed.is_empty() {
        return Some("/".to_string());
    }

    let mut segments: Vec<&str> = Vec::new();
    for part in trimmed.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Some("/".to_string());
    }
    if has_path_loops(&segments) {
        return None;
    }

    let mut normalized = format!("/{}", segments.join("/"));
    if normalized.len() > MAX_PATH_LEN {
        return None;
    }
    if trailing_slash && normalized != "/" {
        normalized.push('/');
    }
    Some(normalized)
}

fn has_path_loops(segments: &[&str]) -> bool {
    if segments.len() > MAX_SEGMENTS {
        return true;
    }

    let lower: Vec<String> = segments.iter().map(|s| s.to_lowercase()).collect();

    let mut repeat = 1usize;
    for i in 1..lower.len() {
        if lower[i] == lower[i - 1] {
            repeat += 1;
            if repeat >= REPEAT_THRESHOLD {
                return true;
            }
        } else {
            repeat = 1;
        }
    }

    for cycle_len in 2..=4usize {
        if cycle_len * REPEAT_THRESHOLD > lower.len() {
            break;
        }
        if has_repeated_cycle(&lower, cycle_len, REPEAT_THRESHOLD) {
            return true;
        }
    }

    false
}

fn has_repeated_cycle(segments: &[String], cycle_len: usize, threshold: usize) -> bool {
    if segments.len() < cycle_len * threshold {
        return false;
    }
    for start in 0..=segments.len() - cycle_len * threshold {
        let mut repeats = 1usize;
        let mut pos = start + cycle_len;
        while pos + cycle_len <= segments.len() {
            if segments[start..start + cycle_len] == segments[pos..pos + cycle_len] {
                repeats += 1;
                if repeats >= threshold {
                    return true;
                }
            } else {
                break;
            }
            pos += cycle_len;
        }
    }
    false
}

fn has_recursive_query(u: &Url) -> bool {
    let raw_query = match u.query() {
        Some(q) if !q.is_empty() => q,
        _ => return false,
    };

    if raw_query.len() > MAX_QUERY_LEN {
        return true;
    }

    let host_lower = u.host_str().unwrap_or("").to_lowercase();
    let raw_lower = raw_query.to_lowercase();
    if !host_lower.is_empty() && count_occurrences(&raw_lower, &host_lower) >= REPEAT_THRESHOLD {
        return true;
    }

    let encoded_http = count_occurrences(&raw_lower, "http%3a%2f%2f")
        + count_occurrences(&raw_lower, "https%3a%2f%2f");
    if encoded_http >= REPEAT_THRESHOLD {
        return true;
    }

    let decoded: String = url::form_urlencoded::parse(raw_query.as_bytes())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let decoded_lower = decoded.to_lowercase();
    if !host_lower.is_empty() && count_occurrences(&decoded_lower, &host_lower) >= REPEAT_THRESHOLD {
        return true;
    }
    if count_occurrences(&decoded_lower, "http://") >= REPEAT_THRESHOLD
        || count_occurrences(&decoded_lower, "https://") >= REPEAT_THRESHOLD
        || count_occurrences(&decoded_lower, "404;") >= REPEAT_THRESHOLD
    {
        return true;
    }

    false
}

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}

fn should_exclude(u: &Url) -> bool {
    let path_lower = u.path().to_lowercase();
    if LINK_EXCLUSION_FRAGMENTS
        .iter()
        .any(|frag| path_lower.contains(frag))
    {
        return true;
    }

    let ext = crate::utils::ext_type(u.path());
    !ext.is_empty() && FILE_EXTENSION_EXCLUSIONS.contains(&ext.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://target.example/app/").unwrap()
    }

    #[test]
    fn rejects_pseudo_schemes() {
        for bad in ["javascript:alert(1)", "JavaScript:void(0)", "mailto:a@b.c", "data:text/html,x"] {
            assert!(normalize_url(Some(&base()), bad).is_none(), "{}", bad);
        }
    }

    #[test]
    fn resolves_relative_against_base() {
        assert_eq!(
            normalize_url(Some(&base()), "../login").unwrap(),
            "https://target.example/login"
        );
        assert_eq!(
            normalize_url(Some(&base()), "//cdn.target.example/x").unwrap(),
            "https://cdn.target.example/x"
        );
    }

    #[test]
    fn strips_wrapping_quotes_and_fragment() {
        assert_eq!(
            normalize_url(None, "\"https://t.example/a#frag\"").unwrap(),
            "https://t.example/a"
        );
    }

    #[test]
    fn rejects_consecutive_segment_runs() {
        assert!(normalize_url(None, "http://t.example/a/a/a/b").is_none());
        assert!(normalize_url(None, "http://t.example/a/A/a").is_none());
        assert!(normalize_url(None, "http://t.example/a/b/a").is_some());
    }

    #[test]
    fn rejects_repeated_cycles() {
        assert!(normalize_url(None, "http://t.example/a/b/a/b/a/b/c").is_none());
        assert!(normalize_url(None, "http://t.example/x/y/z/x/y/z/x/y/z").is_none());
        assert!(normalize_url(None, "http://t.example/a/b/a/b/c").is_some());
    }

    #[test]
    fn rejects_oversized_paths() {
        let long = format!("http://t.example/{}", "x".repeat(3000));
        assert!(normalize_url(None, &long).is_none());
    }

    #[test]
    fn rejects_recursive_queries() {
        let u = "http://t.example/p?next=http://evil/&a=http://evil/&b=http://evil/";
        assert!(normalize_url(None, u).is_none());
        let host_echo = "http://t.example/p?a=t.example&b=t.example&c=t.example";
        assert!(normalize_url(None, host_echo).is_none());
    }

    #[test]
    fn applies_exclusion_lists() {
        assert!(normalize_url(None, "http://t.example/wp-content/x.php").is_none());
        assert!(normalize_url(None, "http://t.example/logo.png").is_none());
        assert!(normalize_url(None, "http://t.example/api/data.json").is_some());
    }

    #[test]
    fn preserves_trailing_slash() {
        assert_eq!(
            normalize_url(None, "http://t.example/dir/sub/").unwrap(),
            "http://t.example/dir/sub/"
        );
    }
}
