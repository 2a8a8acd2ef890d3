// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Verkko - DOM Structural Deduplication
 * SimHash-style 64-bit signatures over tag/attribute/text-presence
 * features; near-duplicate documents within a Hamming threshold are
 * skipped per registered domain.
 */
use std::collections::HashMap;
use std::sync::Mutex;

use scraper::{Html, Selector};

const MAX_FEATURES: usize = 2048;

pub struct DomDeduper {
    threshold: u32,
    buckets: Mutex<HashMap<String, Vec<u64>>>,
}

impl DomDeduper {
    pub fn new(threshold: u32) -> Self {
        let threshold = if threshold == 0 { 6 } else { threshold };
        Self {
            threshold,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Computes the DOM signature and reports whether it is within the
    /// Hamming threshold of any signature already seen for the domain.
    /// New signatures are recorded.
    pub fn should_skip(&self, domain: &str, body: &str) -> (bool, u64) {
        if body.trim().is_empty() {
            return (false, 0);
        }
        let sig = compute_dom_signature(body);
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let seen = buckets.entry(domain.to_string()).or_default();
        for existing in seen.iter() {
            if hamming_distance(*existing, sig) <= self.threshold {
                return (true, sig);
            }
        }
        seen.push(sig);
        (false, sig)
    }
}

/// SimHash signature over the parsed document. Invariant under script and
/// style content changes and whitespace-only text edits.
pub fn compute_dom_signature(body: &str) -> u64 {
    let document = Html::parse_document(body);
    let all = Selector::parse("*").unwrap();

    let mut features: Vec<String> = Vec::with_capacity(256);
    'outer: for element in document.select(&all) {
        let tag = element.value().name().to_lowercase();
        if tag.is_empty() {
            continue;
        }
        features.push(format!("tag:{}", tag));
        for (name, _) in element.value().attrs() {
            let name = name.to_lowercase();
            if name.is_empty() || name.starts_with("data-") || name == "style" {
                continue;
            }
            features.push(format!("attr:{}", name));
        }
        if tag != "script" && tag != "style" {
            let has_text = element
                .text()
                .any(|t| !t.trim().is_empty());
            if has_text {
                features.push("text:present".to_string());
            }
        }
        if features.len() >= MAX_FEATURES {
            break 'outer;
        }
    }

    if features.is_empty() {
        features.push("empty".to_string());
    }
    simhash(&features)
}

fn simhash(features: &[String]) -> u64 {
    if features.is_empty() {
        return 0;
    }
    let mut weights = [0i64; 64];
    for feature in features {
        let sig = fnv1a(feature.as_bytes());
        for (i, weight) in weights.iter_mut().enumerate() {
            if (sig >> i) & 1 == 1 {
                *weight += 1;
            } else {
                *weight -= 1;
            }
        }
    }
    let mut result = 0u64;
    for (i, weight) in weights.iter().enumerate() {
        if *weight >= 0 {
            result |= 1 << i;
        }
    }
    result
}

fn fnv1a(data: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Content-Type plus body-prefix sniff for HTML documents.
pub fn is_likely_html(content_type: &str, body: &str) -> bool {
    let ct = content_type.trim().to_lowercase();
    if ct.contains("text/html") || ct.contains("application/xhtml") {
        return true;
    }
    let trimmed = body.trim_start();
    if trimmed.is_empty() {
        return false;
    }
    let lower: String = trimmed.chars().take(64).collect::<String>().to_lowercase();
    lower.starts_with("<!doctype html") || lower.starts_with("<html")
}

/// Content-Type plus body-prefix sniff for JavaScript bodies.
pub fn is_likely_js(content_type: &str, body: &str) -> bool {
    let ct = content_type.trim().to_lowercase();
    if ct.contains("javascript") || ct.contains("ecmascript") {
        return true;
    }
    let trimmed = body.trim_start();
    if trimmed.is_empty() {
        return false;
    }
    let head: String = trimmed.chars().take(64).collect::<String>().to_lowercase();
    head.starts_with("function") || head.starts_with("(()") || head.contains("var ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_invariant_under_script_and_whitespace_changes() {
        let a = "<html><body><p class=\"x\">Hello</p><script>var a=1;</script></body></html>";
        let b = "<html><body><p class=\"x\">  Hello  </p><script>console.log('other')</script></body></html>";
        assert_eq!(compute_dom_signature(a), compute_dom_signature(b));
    }

    #[test]
    fn hamming_distance_properties() {
        let sig = compute_dom_signature("<html><body><p>x</p></body></html>");
        assert_eq!(hamming_distance(sig, sig), 0);
        assert_eq!(hamming_distance(sig, !sig), 64);
        assert_eq!(hamming_distance(1, 2), hamming_distance(2, 1));
    }

    #[test]
    fn near_duplicates_are_skipped_per_domain() {
        let deduper = DomDeduper::new(6);
        let doc = "<html><body><div id=\"main\"><p>content</p></div></body></html>";
        let same_shape = "<html><body><div id=\"main\"><p>different words</p></div></body></html>";
        let (skip_first, _) = deduper.should_skip("example.com", doc);
        assert!(!skip_first);
        let (skip_second, _) = deduper.should_skip("example.com", same_shape);
        assert!(skip_second);
        let (other_domain, _) = deduper.should_skip("other.com", doc);
        assert!(!other_domain);
    }

    #[test]
    fn sniffers_detect_html_and_js() {
        assert!(is_likely_html("text/html; charset=utf-8", ""));
        assert!(is_likely_html("", "<!DOCTYPE html><html>"));
        assert!(is_likely_js("application/javascript", ""));
        assert!(is_likely_js("", "function boot() {}"));
        assert!(is_likely_js("", "var x = 1;"));
        assert!(!is_likely_html("application/json", "{}"));
    }
}
