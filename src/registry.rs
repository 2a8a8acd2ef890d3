// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Verkko - Request Registry
 * Process-wide duplicate gate over canonical (method, url, body-hash) keys,
 * plus a response body-hash map that suppresses re-emission of identical
 * content for the same request.
 */
use std::collections::HashMap;
use std::sync::Mutex;

use sha1::{Digest, Sha1};
use url::Url;

use crate::netutil;
use crate::stringset::StringFilter;

pub struct RequestRegistry {
    filter: StringFilter,
    resp_hashes: Mutex<HashMap<String, String>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self {
            filter: StringFilter::new(),
            resp_hashes: Mutex::new(HashMap::new()),
        }
    }

    /// True when a request with the same canonical key was seen before;
    /// records the key otherwise. Atomic across concurrent callers.
    pub fn duplicate_request(&self, method: &str, raw_url: &str, body: &str) -> bool {
        let key = canonical_request_key(method, raw_url, body);
        if key.is_empty() {
            return false;
        }
        self.filter.duplicate(&key)
    }

    pub fn duplicate_url(&self, raw_url: &str) -> bool {
        self.duplicate_request("GET", raw_url, "")
    }

    /// Records the response body hash for the request (keyed without the
    /// body) and reports whether it is identical to the previous one.
    pub fn mark_response(&self, method: &str, raw_url: &str, body: &str) -> bool {
        let key = canonical_request_key(method, raw_url, "");
        if key.is_empty() {
            return false;
        }
        let hash = hash_trimmed(body);
        if hash.is_empty() {
            return false;
        }
        let mut hashes = self.resp_hashes.lock().unwrap_or_else(|e| e.into_inner());
        if hashes.get(&key).map(|prev| prev == &hash).unwrap_or(false) {
            return true;
        }
        hashes.insert(key, hash);
        false
    }
}

impl Default for RequestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic dedup key: `METHOD canonical-url[ body:<sha1>]`.
///
/// Canonicalisation lower-cases scheme and host, drops default ports and
/// the fragment, cleans the path, and rewrites the query with sorted keys
/// and sorted, deduplicated values. Unparseable URLs fall back to the
/// trimmed raw string.
pub fn canonical_request_key(method: &str, raw_url: &str, body: &str) -> String {
    let mut method = method.trim().to_uppercase();
    if method.is_empty() {
        method = "GET".to_string();
    }
    if raw_url.is_empty() {
        return String::new();
    }

    let mut parsed = match Url::parse(raw_url) {
        Ok(u) => u,
        Err(_) => return format!("{} {}", method, raw_url.trim()),
    };

    parsed.set_fragment(None);
    normalize_host_port(&mut parsed);
    let clean = netutil::normalize_path_component(parsed.path());
    parsed.set_path(&clean);
    if let Some(query) = parsed.query() {
        if !query.is_empty() {
            let normalized = netutil::normalize_query(query);
            parsed.set_query(Some(&normalized));
        }
    }

    let canonical_url = netutil::normalize_display_url(parsed.as_str());

    let hash = hash_trimmed(body);
    if hash.is_empty() {
        format!("{} {}", method, canonical_url)
    } else {
        format!("{} {} body:{}", method, canonical_url, hash)
    }
}

fn normalize_host_port(u: &mut Url) {
    // Url already lower-cases scheme and host; only default ports need
    // stripping.
    let strip = match (u.scheme(), u.port()) {
        ("http", Some(80)) | ("https", Some(443)) => true,
        _ => false,
    };
    if strip {
        let _ = u.set_port(None);
    }
}

/// SHA-1 hex of the trimmed content; empty content hashes to the empty
/// string.
pub fn hash_trimmed(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let mut hasher = Sha1::new();
    hasher.update(trimmed.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_key_ignores_fragment_case_and_default_port() {
        let a = canonical_request_key("get", "https://EX.com:443/a?b=2&a=1#frag", "");
        let b = canonical_request_key("GET", "https://ex.com/a?a=1&b=2", "");
        assert_eq!(a, b);
    }

    #[test]
    fn canonical_key_sorts_and_dedupes_query_values() {
        let a = canonical_request_key("GET", "https://t/p?x=2&x=1&x=2", "");
        let b = canonical_request_key("GET", "https://t/p?x=1&x=2", "");
        assert_eq!(a, b);
    }

    #[test]
    fn canonical_key_appends_body_hash() {
        let with_body = canonical_request_key("POST", "https://t/p", "a=1");
        assert!(with_body.contains(" body:"));
        let trimmed = canonical_request_key("POST", "https://t/p", "  a=1  ");
        assert_eq!(with_body, trimmed);
    }

    #[test]
    fn duplicate_request_is_sticky() {
        let registry = RequestRegistry::new();
        assert!(!registry.duplicate_request("GET", "https://EX.com:443/a?b=2&a=1#frag", ""));
        assert!(registry.duplicate_request("GET", "https://ex.com/a/?a=1&b=2", ""));
        assert!(registry.duplicate_request("get", "https://ex.com/a?b=2&a=1", ""));
    }

    #[test]
    fn mark_response_reports_identical_bodies_only() {
        let registry = RequestRegistry::new();
        assert!(!registry.mark_response("GET", "https://t/p", "hello"));
        assert!(registry.mark_response("GET", "https://t/p", "hello"));
        assert!(!registry.mark_response("GET", "https://t/p", "changed"));
        assert!(registry.mark_response("GET", "https://t/p", "changed"));
        assert!(!registry.mark_response("GET", "https://t/p", ""));
    }
}
