// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Synthetic requests produced by the form extractor, JS scanner,
//! linkfinder and hybrid transitions.

use std::collections::BTreeMap;

use url::Url;

/// A request synthesised from page content rather than followed links.
/// Never mutated after creation except by [`normalize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyntheticRequest {
    pub method: String,
    pub raw_url: String,
    pub body: String,
    /// Header names are canonicalised (`Content-Type` form) on normalise.
    pub headers: BTreeMap<String, String>,
    pub content_type: String,
    /// Snippet or URL the request was derived from.
    pub source: String,
    /// DOM event names associated with the originating element.
    pub events: Vec<String>,
}

impl SyntheticRequest {
    pub fn new(method: &str, raw_url: &str) -> Self {
        Self {
            method: method.to_string(),
            raw_url: raw_url.to_string(),
            ..Default::default()
        }
    }

    pub fn method_or_get(&self) -> &str {
        if self.method.is_empty() {
            "GET"
        } else {
            &self.method
        }
    }
}

/// Canonical `Key-Name` form of an HTTP header, e.g. `content-type` →
/// `Content-Type`.
pub fn canonical_header_key(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// In-memory dedup key for generated requests:
/// `METHOD URL BODY k=v … ct=<content-type>` with header keys lower-cased
/// and sorted.
pub fn build_request_key(req: &SyntheticRequest) -> String {
    let mut key = String::with_capacity(64);
    key.push_str(&req.method);
    key.push(' ');
    key.push_str(&req.raw_url);
    key.push(' ');
    key.push_str(&req.body);

    if !req.headers.is_empty() {
        let mut pairs: Vec<(String, &String)> = req
            .headers
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        pairs.sort();
        for (k, v) in pairs {
            key.push(' ');
            key.push_str(&k);
            key.push('=');
            key.push_str(v);
        }
    }

    if !req.content_type.is_empty() {
        key.push_str(" ct=");
        key.push_str(&req.content_type);
    }

    key
}

/// Normalisation pass applied once before a generated request is deduped
/// and scheduled: upper-case method (default GET), URL resolved against the
/// origin (falling back to the site), trimmed body, canonical header keys,
/// content-type inherited from headers.
pub fn normalize(req: SyntheticRequest, origin: &str, site: Option<&Url>) -> Option<SyntheticRequest> {
    let mut normalized = req;

    normalized.method = normalized.method.trim().to_uppercase();
    if normalized.method.is_empty() {
        normalized.method = "GET".to_string();
    }

    if normalized.source.trim().is_empty() {
        normalized.source = origin.to_string();
    } else {
        normalized.source = normalized.source.trim().to_string();
    }

    let mut raw = normalized.raw_url.trim().to_string();
    if raw.is_empty() {
        raw = origin.to_string();
    }
    if raw.is_empty() {
        return None;
    }

    let base = Url::parse(origin).ok().or_else(|| site.cloned());
    normalized.raw_url = match base {
        Some(b) => b.join(&raw).ok()?.to_string(),
        None => raw,
    };

    normalized.body = normalized.body.trim().to_string();

    if !normalized.headers.is_empty() {
        let canonical: BTreeMap<String, String> = normalized
            .headers
            .iter()
            .map(|(k, v)| (canonical_header_key(k), v.clone()))
            .collect();
        normalized.headers = canonical;
    }

    if normalized.content_type.is_empty() {
        if let Some(ct) = normalized.headers.get("Content-Type") {
            normalized.content_type = ct.clone();
        }
    }

    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_keys_are_canonicalised() {
        assert_eq!(canonical_header_key("content-type"), "Content-Type");
        assert_eq!(canonical_header_key("X-CSRF-TOKEN"), "X-Csrf-Token");
    }

    #[test]
    fn request_key_is_invariant_under_header_case_and_order() {
        let mut a = SyntheticRequest::new("POST", "https://t/api");
        a.body = "x=1".into();
        a.headers.insert("Accept".into(), "*/*".into());
        a.headers.insert("Content-Type".into(), "text/plain".into());

        let mut b = SyntheticRequest::new("POST", "https://t/api");
        b.body = "x=1".into();
        b.headers.insert("content-type".into(), "text/plain".into());
        b.headers.insert("accept".into(), "*/*".into());

        assert_eq!(build_request_key(&a), build_request_key(&b));
    }

    #[test]
    fn normalize_resolves_relative_urls_and_inherits_content_type() {
        let mut req = SyntheticRequest::new("post", "/api/v1");
        req.headers.insert("content-type".into(), "application/json".into());
        let got = normalize(req, "https://t.example/page", None).unwrap();
        assert_eq!(got.method, "POST");
        assert_eq!(got.raw_url, "https://t.example/api/v1");
        assert_eq!(got.content_type, "application/json");
        assert!(got.headers.contains_key("Content-Type"));
    }

    #[test]
    fn normalize_rejects_empty_targets() {
        let req = SyntheticRequest::new("GET", "");
        assert!(normalize(req, "", None).is_none());
    }
}
