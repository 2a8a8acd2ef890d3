// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Verkko - Application State Graph
 * DOM fingerprinting for hybrid crawling: normalised DOM -> SimHash +
 * SHA-256 digest -> state nodes with transitions keyed by action/details.
 */
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use ego_tree::NodeRef;
use scraper::{Html, Node};
use sha2::{Digest, Sha256};

use crate::dom_dedup::compute_dom_signature;

const SENSITIVE_ATTR_KEYS: &[&str] = &["csrf", "token", "nonce", "auth", "session", "timestamp"];
const DYNAMIC_VALUE_HINTS: &[&str] = &["eyj", "csrf", "token", "timestamp", "expires", "refresh"];

#[derive(Debug, Clone)]
pub struct DomStateNode {
    pub state_hash: String,
    pub primary_url: String,
    pub urls: HashSet<String>,
    pub signature: u64,
    pub digest: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub visit_count: u64,
    pub analyzed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StateTransition {
    /// `navigate`, `click` or `form`.
    pub action_type: String,
    pub details: HashMap<String, String>,
    pub destination_hash: String,
}

pub struct ApplicationStateGraph {
    inner: RwLock<GraphInner>,
}

#[derive(Default)]
struct GraphInner {
    nodes: HashMap<String, DomStateNode>,
    transitions: HashMap<String, HashMap<String, StateTransition>>,
}

impl ApplicationStateGraph {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(GraphInner::default()),
        }
    }

    /// `<16-hex simhash>-<first 8 hex of sha256>` over the normalised DOM.
    pub fn calculate_dom_fingerprint(&self, dom: &str) -> (String, u64, String) {
        let normalized = normalize_dom(dom);
        let signature = compute_dom_signature(&normalized);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        let digest = hex::encode(&hasher.finalize()[..8]);
        (format!("{:016x}-{}", signature, digest), signature, digest)
    }

    /// Registers an observation of a state. Returns true iff the state is
    /// new to the graph.
    pub fn add_state(&self, state_hash: &str, url: &str, signature: u64, digest: &str) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        match inner.nodes.get_mut(state_hash) {
            Some(node) => {
                node.last_seen = now;
                node.visit_count += 1;
                if !url.is_empty() {
                    if node.primary_url.is_empty() {
                        node.primary_url = url.to_string();
                    }
                    node.urls.insert(url.to_string());
                }
                false
            }
            None => {
                let mut urls = HashSet::new();
                if !url.is_empty() {
                    urls.insert(url.to_string());
                }
                inner.nodes.insert(
                    state_hash.to_string(),
                    DomStateNode {
                        state_hash: state_hash.to_string(),
                        primary_url: url.to_string(),
                        urls,
                        signature,
                        digest: digest.to_string(),
                        first_seen: now,
                        last_seen: now,
                        visit_count: 1,
                        analyzed: false,
                    },
                );
                true
            }
        }
    }

    pub fn mark_analyzed(&self, state_hash: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(node) = inner.nodes.get_mut(state_hash) {
            node.analyzed = true;
        }
    }

    /// Registers transitions for a state, deduplicated by identity key.
    /// Returns the number actually added.
    pub fn register_transitions(&self, state_hash: &str, transitions: Vec<StateTransition>) -> usize {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let store = inner
            .transitions
            .entry(state_hash.to_string())
            .or_default();
        let mut added = 0;
        for transition in transitions {
            let key = transition_key(&transition);
            if key.is_empty() || store.contains_key(&key) {
                continue;
            }
            store.insert(key, transition);
            added += 1;
        }
        added
    }

    pub fn get_transitions(&self, state_hash: &str) -> Vec<StateTransition> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .transitions
            .get(state_hash)
            .map(|store| store.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn total_states(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .nodes
            .len()
    }

    pub fn get_state(&self, state_hash: &str) -> Option<DomStateNode> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .nodes
            .get(state_hash)
            .cloned()
    }
}

impl Default for ApplicationStateGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of a transition within a state:
/// `lower(action)|k1=v1|k2=v2…` with detail keys sorted.
pub fn transition_key(transition: &StateTransition) -> String {
    let action = transition.action_type.trim().to_lowercase();
    if action.is_empty() {
        return String::new();
    }
    let mut key = action;
    let mut detail_keys: Vec<&String> = transition.details.keys().collect();
    detail_keys.sort();
    for detail_key in detail_keys {
        key.push('|');
        key.push_str(&detail_key.to_lowercase());
        key.push('=');
        key.push_str(transition.details[detail_key].trim());
    }
    key
}

/// Normalises a DOM for fingerprinting: strips script/style/noscript/
/// template content, drops volatile attributes and dynamic-looking values,
/// collapses whitespace.
pub fn normalize_dom(dom: &str) -> String {
    if dom.trim().is_empty() {
        return String::new();
    }
    let document = Html::parse_document(dom);
    let mut out = String::with_capacity(dom.len());
    serialize_normalized(document.tree.root(), &mut out);
    normalize_whitespace(&out)
}

fn serialize_normalized(node: NodeRef<Node>, out: &mut String) {
    match node.value() {
        Node::Element(element) => {
            let tag = element.name().to_lowercase();
            out.push('<');
            out.push_str(&tag);
            let mut attrs: Vec<(String, String)> = element
                .attrs()
                .map(|(name, value)| (name.to_lowercase(), value.trim().to_string()))
                .collect();
            attrs.sort();
            for (name, value) in attrs {
                if SENSITIVE_ATTR_KEYS.iter().any(|k| name.contains(k)) {
                    continue;
                }
                out.push(' ');
                out.push_str(&name);
                out.push_str("=\"");
                if !looks_dynamic_value(&value) {
                    out.push_str(&value);
                }
                out.push('"');
            }
            out.push('>');
            if !matches!(tag.as_str(), "script" | "style" | "noscript" | "template") {
                for child in node.children() {
                    serialize_normalized(child, out);
                }
            }
            out.push_str("</");
            out.push_str(&tag);
            out.push('>');
        }
        Node::Text(text) => {
            let trimmed = text.text.trim();
            if !trimmed.is_empty() {
                out.push(' ');
                out.push_str(trimmed);
                out.push(' ');
            }
        }
        _ => {
            for child in node.children() {
                serialize_normalized(child, out);
            }
        }
    }
}

fn normalize_whitespace(input: &str) -> String {
    let mut condensed = input
        .replace('\r', " ")
        .replace('\n', " ")
        .replace('\t', " ");
    while condensed.contains("  ") {
        condensed = condensed.replace("  ", " ");
    }
    condensed.trim().to_string()
}

fn looks_dynamic_value(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return false;
    }
    if value.len() >= 12 {
        let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
        if digits >= value.len() / 2 {
            return true;
        }
    }
    if value.matches('-').count() >= 3 {
        return true;
    }
    if value.matches('=').count() >= 2 {
        return true;
    }
    let lower = value.to_lowercase();
    DYNAMIC_VALUE_HINTS.iter().any(|hint| lower.contains(hint))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_ignores_script_content_and_whitespace() {
        let graph = ApplicationStateGraph::new();
        let a = "<html><body><p>Hi</p><script>var x=1;</script></body></html>";
        let b = "<html><body>\n  <p>Hi</p>\n  <script>var y=2;</script>\n</body></html>";
        let (hash_a, _, _) = graph.calculate_dom_fingerprint(a);
        let (hash_b, _, _) = graph.calculate_dom_fingerprint(b);
        assert_eq!(hash_a, hash_b);
    }

    #[test]
    fn fingerprint_ignores_csrf_attributes() {
        let graph = ApplicationStateGraph::new();
        let a = r#"<html><body><form data-csrf-token="abc123"><input name="q"></form></body></html>"#;
        let b = r#"<html><body><form data-csrf-token="zzz999"><input name="q"></form></body></html>"#;
        let (hash_a, _, _) = graph.calculate_dom_fingerprint(a);
        let (hash_b, _, _) = graph.calculate_dom_fingerprint(b);
        assert_eq!(hash_a, hash_b);
    }

    #[test]
    fn add_state_reports_newness_and_tracks_visits() {
        let graph = ApplicationStateGraph::new();
        assert!(graph.add_state("h1-aaaa", "https://t/a", 1, "aaaa"));
        assert!(!graph.add_state("h1-aaaa", "https://t/b", 1, "aaaa"));
        let node = graph.get_state("h1-aaaa").unwrap();
        assert_eq!(node.visit_count, 2);
        assert_eq!(node.urls.len(), 2);
        assert_eq!(graph.total_states(), 1);
    }

    #[test]
    fn transitions_are_deduplicated_by_identity() {
        let graph = ApplicationStateGraph::new();
        let make = |target: &str| StateTransition {
            action_type: "navigate".into(),
            details: HashMap::from([("targetUrl".to_string(), target.to_string())]),
            ..Default::default()
        };
        assert_eq!(
            graph.register_transitions("h", vec![make("https://t/a"), make("https://t/a")]),
            1
        );
        assert_eq!(graph.register_transitions("h", vec![make("https://t/b")]), 1);
        assert_eq!(graph.get_transitions("h").len(), 2);
    }

    #[test]
    fn blank_action_transitions_are_rejected() {
        let graph = ApplicationStateGraph::new();
        let blank = StateTransition::default();
        assert_eq!(graph.register_transitions("h", vec![blank]), 0);
    }

    #[test]
    fn state_hash_format_is_simhash_dash_digest() {
        let graph = ApplicationStateGraph::new();
        let (hash, _, _) = graph.calculate_dom_fingerprint("<html><body>x</body></html>");
        let parts: Vec<&str> = hash.split('-').collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), 16);
        assert_eq!(parts[1].len(), 16);
    }
}
