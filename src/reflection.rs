// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Verkko - Reflection Engine
 * Pairs each synthesised request (baseline) with mutated variants that
 * inject sentinel payloads into query params, urlencoded bodies, JSON
 * leaves or multipart fields, then evaluates responses for reflection
 * evidence. A finding is emitted at most once per request key.
 */
use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::payloads::REFLECTED_PARAM_NAME;
use crate::registry::hash_trimmed;
use crate::request::SyntheticRequest;
use crate::utils::{html_escape, query_escape};

static TEMPLATE_MARKER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[object [^\]]+\]([0-9]+)\[object [^\]]+\]").unwrap());

/// Partial reflection state for one request key. Both slots must be
/// populated before evaluation can emit.
#[derive(Debug, Default)]
pub struct ReflectionEntry {
    baseline_set: bool,
    mutated_set: bool,
    baseline_hash: String,
    mutated_hash: String,
    mutated_status: u16,
    mutated_len: usize,
    mutated_contains: bool,
    mutated_markers: Vec<String>,
    url: String,
    method: String,
    origin: String,
    param: String,
    payload: String,
    emitted: bool,
}

#[derive(Debug, Clone)]
pub struct ReflectionFinding {
    pub url: String,
    pub method: String,
    pub origin: String,
    pub status: u16,
    pub length: usize,
    pub param: String,
    pub payload: String,
    pub reasons: Vec<String>,
}

/// A mutated request plus the parameter and payload it carries.
#[derive(Debug, Clone)]
pub struct ReflectionMutation {
    pub request: SyntheticRequest,
    pub param: String,
    pub payload: String,
}

impl ReflectionEntry {
    fn evaluate(&mut self) -> Option<ReflectionFinding> {
        if !self.baseline_set || !self.mutated_set || self.emitted {
            return None;
        }

        let mut reasons: Vec<String> = Vec::new();
        if self.mutated_contains && self.mutated_markers.is_empty() {
            push_unique(&mut reasons, "payload-reflected");
        }
        for marker in &self.mutated_markers {
            push_unique(&mut reasons, marker);
        }
        if self.baseline_hash != self.mutated_hash {
            push_unique(&mut reasons, "body-delta");
        }
        if reasons.is_empty() {
            return None;
        }

        self.emitted = true;
        Some(ReflectionFinding {
            url: self.url.clone(),
            method: self.method.clone(),
            origin: self.origin.clone(),
            status: self.mutated_status,
            length: self.mutated_len,
            param: self.param.clone(),
            payload: self.payload.clone(),
            reasons,
        })
    }
}

fn push_unique(list: &mut Vec<String>, marker: &str) {
    if !list.iter().any(|m| m == marker) {
        list.push(marker.to_string());
    }
}

/// Keyed store of reflection entries; one mutex around the map.
pub struct ReflectionStore {
    sentinel: String,
    entries: Mutex<HashMap<String, ReflectionEntry>>,
}

/// Response-side fields the store needs to fill a baseline or mutated slot.
pub struct ObservedResponse<'a> {
    pub body: &'a str,
    pub status: u16,
    pub url: &'a str,
    pub method: &'a str,
    pub origin: &'a str,
    pub param: &'a str,
    pub payload: &'a str,
}

impl ReflectionStore {
    pub fn new(sentinel: &str) -> Self {
        Self {
            sentinel: sentinel.to_string(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Pre-registers the param/payload a mutation carries so findings can
    /// report them even when the mutated response arrives first.
    pub fn register_mutation(&self, key: &str, param: &str, payload: &str) {
        if key.is_empty() {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.entry(key.to_string()).or_default();
        if !param.is_empty() {
            entry.param = param.to_string();
        }
        if !payload.is_empty() {
            entry.payload = payload.to_string();
        }
    }

    /// Records a baseline (unmutated) response.
    pub fn observe_baseline(&self, key: &str, resp: &ObservedResponse) -> Option<ReflectionFinding> {
        if key.is_empty() {
            return None;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.entry(key.to_string()).or_default();
        entry.baseline_set = true;
        entry.baseline_hash = hash_trimmed(resp.body);
        if entry.method.is_empty() {
            entry.method = resp.method.to_string();
        }
        if entry.origin.is_empty() {
            entry.origin = resp.origin.to_string();
        }
        if entry.param.is_empty() {
            entry.param = resp.param.to_string();
        }
        if entry.payload.is_empty() {
            entry.payload = resp.payload.to_string();
        }
        entry.evaluate()
    }

    /// Records a mutated response, computing evidence markers.
    pub fn observe_mutated(&self, key: &str, resp: &ObservedResponse) -> Option<ReflectionFinding> {
        if key.is_empty() {
            return None;
        }
        let payload = if resp.payload.is_empty() {
            self.sentinel.as_str()
        } else {
            resp.payload
        };

        let mut reasons = find_encoded_payloads(resp.body, payload, &self.sentinel);
        let mut contains = !reasons.is_empty();
        if TEMPLATE_MARKER_REGEX.is_match(resp.body) {
            contains = true;
            push_unique(&mut reasons, "template-marker");
        }

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.entry(key.to_string()).or_default();
        entry.mutated_set = true;
        entry.mutated_hash = hash_trimmed(resp.body);
        entry.mutated_status = resp.status;
        entry.mutated_len = resp.body.len();
        entry.mutated_contains = contains;
        entry.mutated_markers = reasons;
        entry.url = resp.url.to_string();
        if entry.method.is_empty() {
            entry.method = resp.method.to_string();
        }
        if entry.origin.is_empty() {
            entry.origin = resp.origin.to_string();
        }
        if !resp.param.is_empty() {
            entry.param = resp.param.to_string();
        }
        if !payload.is_empty() {
            entry.payload = payload.to_string();
        }
        entry.evaluate()
    }
}

/// Evidence markers for payload/sentinel presence in a body, all matched
/// case-insensitively against plain, HTML-escaped and URL-encoded forms.
pub fn find_encoded_payloads(body: &str, payload: &str, sentinel: &str) -> Vec<String> {
    let mut reasons: Vec<String> = Vec::with_capacity(6);
    let lower_body = body.to_lowercase();

    if !payload.is_empty() {
        let lower_payload = payload.to_lowercase();
        if lower_body.contains(&lower_payload) {
            push_unique(&mut reasons, "payload-reflected");
        }
        let html_encoded = html_escape(payload).to_lowercase();
        if html_encoded != lower_payload && lower_body.contains(&html_encoded) {
            push_unique(&mut reasons, "payload-html-encoded");
        }
        let url_encoded = query_escape(payload).to_lowercase();
        if url_encoded != lower_payload && lower_body.contains(&url_encoded) {
            push_unique(&mut reasons, "payload-url-encoded");
        }
    }

    if !sentinel.is_empty() {
        let lower_sentinel = sentinel.to_lowercase();
        if !payload.eq_ignore_ascii_case(sentinel) && lower_body.contains(&lower_sentinel) {
            push_unique(&mut reasons, "payload-sentinel");
        }
        let html_sentinel = html_escape(sentinel).to_lowercase();
        if html_sentinel != lower_sentinel && lower_body.contains(&html_sentinel) {
            push_unique(&mut reasons, "payload-sentinel-html");
        }
        let url_sentinel = query_escape(sentinel).to_lowercase();
        if url_sentinel != lower_sentinel && lower_body.contains(&url_sentinel) {
            push_unique(&mut reasons, "payload-sentinel-url");
        }
    }

    reasons
}

/// Builds the mutated variants for a request given a payload budget.
/// `payloads` is the pre-rendered, pre-sampled payload sequence.
pub fn build_reflected_requests(
    req: &SyntheticRequest,
    payloads: &[String],
    budget: usize,
) -> Vec<ReflectionMutation> {
    if payloads.is_empty() {
        return Vec::new();
    }

    let mut remaining = if budget == 0 || budget > payloads.len() {
        payloads.len()
    } else {
        budget
    };
    let mut index = 0usize;
    let mut next_payload = |remaining: &mut usize| -> Option<String> {
        if *remaining == 0 {
            return None;
        }
        let payload = payloads[index % payloads.len()].clone();
        index += 1;
        *remaining -= 1;
        Some(payload)
    };

    let mut mutations: Vec<ReflectionMutation> = Vec::new();
    let method = req.method_or_get().to_uppercase();

    if let Ok(parsed) = Url::parse(&req.raw_url) {
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        for key in unique_keys(&pairs) {
            if key.trim().is_empty() {
                continue;
            }
            let Some(payload) = next_payload(&mut remaining) else {
                break;
            };
            let mut mutated_url = parsed.clone();
            {
                let mut serializer = mutated_url.query_pairs_mut();
                serializer.clear();
                let mut replaced = false;
                for (k, v) in &pairs {
                    if *k == key {
                        if !replaced {
                            serializer.append_pair(k, &payload);
                            replaced = true;
                        }
                    } else {
                        serializer.append_pair(k, v);
                    }
                }
            }
            let mut mutated = req.clone();
            mutated.raw_url = mutated_url.to_string();
            mutations.push(ReflectionMutation {
                request: mutated,
                param: key,
                payload,
            });
        }
    }

    let mut content_type = req.content_type.to_lowercase();
    if content_type.is_empty() {
        for key in ["Content-Type", "content-type"] {
            if let Some(ct) = req.headers.get(key) {
                content_type = ct.to_lowercase();
                break;
            }
        }
    }

    if remaining > 0 && content_type.contains("application/x-www-form-urlencoded") {
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(req.body.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        for key in unique_keys(&pairs) {
            if key.trim().is_empty() {
                continue;
            }
            let Some(payload) = next_payload(&mut remaining) else {
                break;
            };
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            let mut replaced = false;
            for (k, v) in &pairs {
                if *k == key {
                    if !replaced {
                        serializer.append_pair(k, &payload);
                        replaced = true;
                    }
                } else {
                    serializer.append_pair(k, v);
                }
            }
            let mut mutated = req.clone();
            mutated.body = serializer.finish();
            if mutated.content_type.is_empty() {
                mutated.content_type = "application/x-www-form-urlencoded".to_string();
            }
            mutations.push(ReflectionMutation {
                request: mutated,
                param: key,
                payload,
            });
        }
    }

    if remaining > 0 && (content_type.contains("application/json") || looks_like_json(&req.body)) {
        mutations.extend(fuzz_json_body(req, &mut next_payload, &mut remaining));
    }

    if remaining > 0 && content_type.contains("multipart/form-data") {
        mutations.extend(fuzz_multipart_body(
            req,
            &content_type,
            &mut next_payload,
            &mut remaining,
        ));
    }

    if mutations.is_empty() {
        if let Some(payload) = next_payload(&mut remaining) {
            let mut mutated = req.clone();
            let param = REFLECTED_PARAM_NAME.to_string();
            match method.as_str() {
                "GET" | "HEAD" => {
                    if let Ok(mut parsed) = Url::parse(&mutated.raw_url) {
                        parsed.query_pairs_mut().append_pair(&param, &payload);
                        mutated.raw_url = parsed.to_string();
                    } else {
                        let separator = if mutated.raw_url.contains('?') { "&" } else { "?" };
                        mutated.raw_url = format!(
                            "{}{}{}={}",
                            mutated.raw_url,
                            separator,
                            param,
                            query_escape(&payload)
                        );
                    }
                }
                _ => {
                    if content_type.contains("application/x-www-form-urlencoded")
                        || content_type.is_empty()
                    {
                        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
                        for (k, v) in url::form_urlencoded::parse(mutated.body.as_bytes()) {
                            if k != param.as_str() {
                                serializer.append_pair(&k, &v);
                            }
                        }
                        serializer.append_pair(&param, &payload);
                        mutated.body = serializer.finish();
                        if mutated.content_type.is_empty() {
                            mutated.content_type =
                                "application/x-www-form-urlencoded".to_string();
                        }
                    } else if mutated.body.is_empty() {
                        mutated.body = payload.clone();
                    } else {
                        mutated.body =
                            format!("{}&{}={}", mutated.body, param, query_escape(&payload));
                    }
                }
            }
            mutations.push(ReflectionMutation {
                request: mutated,
                param,
                payload,
            });
        }
    }

    mutations
}

fn unique_keys(pairs: &[(String, String)]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    pairs
        .iter()
        .filter(|(k, _)| seen.insert(k.clone()))
        .map(|(k, _)| k.clone())
        .collect()
}

fn looks_like_json(body: &str) -> bool {
    let trimmed = body.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

#[derive(Debug, Clone, PartialEq)]
enum JsonSegment {
    Key(String),
    Index(usize),
}

fn fuzz_json_body(
    req: &SyntheticRequest,
    next_payload: &mut dyn FnMut(&mut usize) -> Option<String>,
    remaining: &mut usize,
) -> Vec<ReflectionMutation> {
    if req.body.trim().is_empty() {
        return Vec::new();
    }
    let Ok(data) = serde_json::from_str::<serde_json::Value>(&req.body) else {
        return Vec::new();
    };
    let mut paths: Vec<Vec<JsonSegment>> = Vec::new();
    collect_json_paths(&data, &mut Vec::new(), &mut paths);
    if paths.is_empty() {
        return Vec::new();
    }

    let mut mutations = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(payload) = next_payload(remaining) else {
            break;
        };
        let mut clone = data.clone();
        set_json_value(&mut clone, &path, &payload);
        let Ok(body) = serde_json::to_string(&clone) else {
            continue;
        };
        let mut mutated = req.clone();
        mutated.body = body;
        if mutated.content_type.is_empty() {
            mutated.content_type = "application/json".to_string();
        }
        let mut param = format_json_path(&path);
        if param.is_empty() {
            param = REFLECTED_PARAM_NAME.to_string();
        }
        mutations.push(ReflectionMutation {
            request: mutated,
            param,
            payload,
        });
    }
    mutations
}

fn collect_json_paths(
    node: &serde_json::Value,
    prefix: &mut Vec<JsonSegment>,
    out: &mut Vec<Vec<JsonSegment>>,
) {
    match node {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                prefix.push(JsonSegment::Key(key.clone()));
                collect_json_paths(child, prefix, out);
                prefix.pop();
            }
        }
        serde_json::Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                prefix.push(JsonSegment::Index(idx));
                collect_json_paths(child, prefix, out);
                prefix.pop();
            }
        }
        _ => out.push(prefix.clone()),
    }
}

fn set_json_value(root: &mut serde_json::Value, path: &[JsonSegment], value: &str) {
    let mut current = root;
    for seg in &path[..path.len().saturating_sub(1)] {
        current = match seg {
            JsonSegment::Key(key) => match current.get_mut(key.as_str()) {
                Some(next) => next,
                None => return,
            },
            JsonSegment::Index(idx) => match current.get_mut(*idx) {
                Some(next) => next,
                None => return,
            },
        };
    }
    let Some(last) = path.last() else {
        return;
    };
    match last {
        JsonSegment::Key(key) => {
            if let serde_json::Value::Object(map) = current {
                map.insert(key.clone(), serde_json::Value::String(value.to_string()));
            }
        }
        JsonSegment::Index(idx) => {
            if let serde_json::Value::Array(items) = current {
                if *idx < items.len() {
                    items[*idx] = serde_json::Value::String(value.to_string());
                }
            }
        }
    }
}

fn format_json_path(path: &[JsonSegment]) -> String {
    let mut out = String::new();
    for seg in path {
        match seg {
            JsonSegment::Index(idx) => {
                out.push('[');
                out.push_str(&idx.to_string());
                out.push(']');
            }
            JsonSegment::Key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
        }
    }
    out
}

fn fuzz_multipart_body(
    req: &SyntheticRequest,
    content_type: &str,
    next_payload: &mut dyn FnMut(&mut usize) -> Option<String>,
    remaining: &mut usize,
) -> Vec<ReflectionMutation> {
    let boundary = match extract_boundary(content_type) {
        Some(b) if !b.is_empty() => b,
        _ => return Vec::new(),
    };
    let Some(payload) = next_payload(remaining) else {
        return Vec::new();
    };

    let terminator = format!("--{}--", boundary);
    let mut body = req
        .body
        .strip_suffix(&terminator)
        .unwrap_or(&req.body)
        .to_string();
    if !body.ends_with("\r\n") {
        body.push_str("\r\n");
    }

    body.push_str("--");
    body.push_str(&boundary);
    body.push_str("\r\nContent-Disposition: form-data; name=\"");
    body.push_str(REFLECTED_PARAM_NAME);
    body.push_str("\"\r\n\r\n");
    body.push_str(&payload);
    body.push_str("\r\n--");
    body.push_str(&boundary);
    body.push_str("--");

    let mut mutated = req.clone();
    mutated.body = body;
    if mutated.content_type.is_empty() {
        mutated.content_type = format!("multipart/form-data; boundary={}", boundary);
    }

    vec![ReflectionMutation {
        request: mutated,
        param: REFLECTED_PARAM_NAME.to_string(),
        payload,
    }]
}

fn extract_boundary(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let part = part.trim();
        part.strip_prefix("boundary=")
            .map(|b| b.trim_matches('"').to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::DEFAULT_REFLECTED_PAYLOAD;

    fn store() -> ReflectionStore {
        ReflectionStore::new(DEFAULT_REFLECTED_PAYLOAD)
    }

    fn observed<'a>(body: &'a str, status: u16, url: &'a str, payload: &'a str) -> ObservedResponse<'a> {
        ObservedResponse {
            body,
            status,
            url,
            method: "GET",
            origin: "https://t/",
            param: "q",
            payload,
        }
    }

    #[test]
    fn finding_requires_both_slots() {
        let store = store();
        let key = "GET https://t/?q=hello";
        assert!(store
            .observe_baseline(key, &observed("<p>hello</p>", 200, "https://t/?q=hello", ""))
            .is_none());
        let finding = store
            .observe_mutated(
                key,
                &observed(
                    "__gospider_reflected__",
                    200,
                    "https://t/?q=__gospider_reflected__",
                    DEFAULT_REFLECTED_PAYLOAD,
                ),
            )
            .expect("finding expected");
        assert_eq!(finding.param, "q");
        assert!(finding.reasons.iter().any(|r| r == "payload-reflected"));
    }

    #[test]
    fn finding_emits_at_most_once_per_key() {
        let store = store();
        let key = "GET https://t/?q=x";
        store.observe_baseline(key, &observed("base", 200, "https://t/?q=x", ""));
        let first = store.observe_mutated(
            key,
            &observed("__gospider_reflected__", 200, "https://t/?q=p", DEFAULT_REFLECTED_PAYLOAD),
        );
        assert!(first.is_some());
        let second = store.observe_mutated(
            key,
            &observed("__gospider_reflected__", 200, "https://t/?q=p", DEFAULT_REFLECTED_PAYLOAD),
        );
        assert!(second.is_none());
    }

    #[test]
    fn body_delta_alone_is_a_reason() {
        let store = store();
        let key = "GET https://t/?a=1";
        store.observe_baseline(key, &observed("alpha", 200, "https://t/?a=1", ""));
        let finding = store
            .observe_mutated(key, &observed("beta", 200, "https://t/?a=p", "unseen-payload"))
            .expect("body delta should emit");
        assert_eq!(finding.reasons, vec!["body-delta".to_string()]);
    }

    #[test]
    fn encoded_forms_are_detected() {
        let reasons = find_encoded_payloads(
            "safe &lt;img&gt; output",
            "<img>",
            DEFAULT_REFLECTED_PAYLOAD,
        );
        assert!(reasons.iter().any(|r| r == "payload-html-encoded"));
    }

    #[test]
    fn template_marker_counts_as_evidence() {
        let store = store();
        let key = "GET https://t/?t=1";
        store.observe_baseline(key, &observed("x", 200, "https://t/?t=1", ""));
        let finding = store
            .observe_mutated(
                key,
                &observed("[object Object]123[object Object]x", 200, "https://t/?t=p", "zzz"),
            )
            .expect("marker should emit");
        assert!(finding.reasons.iter().any(|r| r == "template-marker"));
    }

    #[test]
    fn query_params_are_mutated_one_payload_each() {
        let req = SyntheticRequest::new("GET", "https://t/search?a=1&b=2");
        let payloads = vec!["P1".to_string(), "P2".to_string(), "P3".to_string()];
        let mutations = build_reflected_requests(&req, &payloads, 3);
        assert_eq!(mutations.len(), 2);
        assert!(mutations.iter().any(|m| m.param == "a" && m.request.raw_url.contains("a=P")));
        assert!(mutations.iter().any(|m| m.param == "b"));
    }

    #[test]
    fn urlencoded_bodies_are_mutated() {
        let mut req = SyntheticRequest::new("POST", "https://t/login");
        req.body = "user=a&pass=b".into();
        req.content_type = "application/x-www-form-urlencoded".into();
        let payloads = vec!["PAY".to_string()];
        let mutations = build_reflected_requests(&req, &payloads, 4);
        assert!(!mutations.is_empty());
        assert!(mutations[0].request.body.contains("PAY"));
    }

    #[test]
    fn json_leaves_are_mutated() {
        let mut req = SyntheticRequest::new("POST", "https://t/api");
        req.body = r#"{"user":{"name":"a"},"tags":["x"]}"#.into();
        req.content_type = "application/json".into();
        let payloads = vec!["P".to_string(), "P".to_string()];
        let mutations = build_reflected_requests(&req, &payloads, 2);
        assert_eq!(mutations.len(), 2);
        let params: Vec<&str> = mutations.iter().map(|m| m.param.as_str()).collect();
        assert!(params.contains(&"user.name"));
        assert!(params.contains(&"tags[0]"));
    }

    #[test]
    fn multipart_variant_appends_valid_part() {
        let mut req = SyntheticRequest::new("POST", "https://t/upload");
        req.content_type = "multipart/form-data; boundary=gospider-1".into();
        req.body = "--gospider-1\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--gospider-1--".into();
        let payloads = vec!["P".to_string()];
        let mutations = build_reflected_requests(&req, &payloads, 1);
        assert_eq!(mutations.len(), 1);
        let body = &mutations[0].request.body;
        assert!(body.contains("name=\"gospider_ref\"\r\n\r\nP\r\n"));
        assert!(body.ends_with("--gospider-1--"));
        assert!(!body.contains("\\r\\n"));
    }

    #[test]
    fn parameterless_requests_get_synthetic_param() {
        let req = SyntheticRequest::new("GET", "https://t/plain");
        let payloads = vec!["P".to_string()];
        let mutations = build_reflected_requests(&req, &payloads, 1);
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].param, REFLECTED_PARAM_NAME);
        assert!(mutations[0].request.raw_url.contains("gospider_ref=P"));
    }
}
