// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Passive DOM sink analysis: regex rules flagging sink/source pairs in
//! HTML and JS bodies (innerHTML assignments, document.write, the eval
//! family, postMessage relays).

use std::collections::HashSet;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone)]
pub struct DomFinding {
    pub url: String,
    pub source: String,
    pub sink: String,
    pub snippet: String,
    pub confidence: &'static str,
}

struct DomRule {
    name: &'static str,
    confidence: &'static str,
    pattern: &'static Regex,
    sources: &'static [&'static str],
}

static INNER_HTML_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(innerHTML|outerHTML)\s*=\s*([^;\n]+)").unwrap());
static DOCUMENT_WRITE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)document\.(write|writeln)\s*\(([^)]*)\)").unwrap());
static EVAL_FAMILY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(eval|Function|setTimeout|setInterval)\s*\(([^)]*)\)").unwrap());
static POST_MESSAGE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(postMessage)\s*\(([^,]+),").unwrap());

fn rules() -> [DomRule; 4] {
    [
        DomRule {
            name: "innerHTML-assignment",
            confidence: "medium",
            pattern: &INNER_HTML_REGEX,
            sources: &[
                "location",
                r"document\.cookie",
                r"document\.url",
                r"document\.documenturi",
                r"document\.referrer",
                r"window\.name",
                "localstorage",
                "sessionstorage",
                "search",
                "hash",
            ],
        },
        DomRule {
            name: "document-write",
            confidence: "medium",
            pattern: &DOCUMENT_WRITE_REGEX,
            sources: &[
                "location",
                r"document\.cookie",
                r"document\.url",
                "hash",
                "search",
                "responsetext",
            ],
        },
        DomRule {
            name: "eval-family",
            confidence: "high",
            pattern: &EVAL_FAMILY_REGEX,
            sources: &[
                "location",
                r"document\.cookie",
                r"document\.url",
                "hash",
                "search",
                "innerhtml",
                "outerhtml",
            ],
        },
        DomRule {
            name: "postMessage-relay",
            confidence: "medium",
            pattern: &POST_MESSAGE_REGEX,
            sources: &["location", r"document\.url", "hash", "origin"],
        },
    ]
}

/// Scans HTML/JS for sink antipatterns. Stateful: findings already seen
/// for the same (url, rule, snippet) triple are suppressed.
pub struct DomAnalyzer {
    seen: Mutex<HashSet<String>>,
}

impl DomAnalyzer {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Runs the rule set over `code` and returns new findings.
    /// `source_label` is `html` or `javascript`.
    pub fn analyze(&self, url: &str, code: &str, source_label: &str) -> Vec<DomFinding> {
        let mut findings = Vec::new();
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());

        for rule in rules() {
            for caps in rule.pattern.captures_iter(code) {
                let whole = caps.get(0).map(|m| m.as_str()).unwrap_or("");
                let sink_name = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
                let rhs = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
                let snippet = whole.trim();
                if snippet.is_empty() {
                    continue;
                }
                if is_sanitized_snippet(snippet) {
                    continue;
                }
                if !references_suspicious_source(rhs, rule.sources) {
                    continue;
                }
                let key = format!("{}|{}|{}", url, rule.name, snippet);
                if !seen.insert(key) {
                    continue;
                }
                findings.push(DomFinding {
                    url: url.to_string(),
                    source: source_label.to_string(),
                    sink: sink_name.to_string(),
                    snippet: truncate(snippet, 200),
                    confidence: rule.confidence,
                });
            }
        }

        findings
    }
}

impl Default for DomAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn references_suspicious_source(snippet: &str, sources: &[&str]) -> bool {
    let lower = snippet.to_lowercase();
    sources.iter().any(|pattern| {
        Regex::new(pattern)
            .map(|re| re.is_match(&lower))
            .unwrap_or(false)
    })
}

fn is_sanitized_snippet(snippet: &str) -> bool {
    let lower = snippet.to_lowercase();
    if lower.contains("dompurify") || lower.contains("sanitize") {
        return true;
    }
    lower.contains(".replace(") && lower.contains('<')
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_inner_html_fed_by_location() {
        let analyzer = DomAnalyzer::new();
        let code = r#"el.innerHTML = location.hash.slice(1);"#;
        let findings = analyzer.analyze("https://t/p", code, "javascript");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].sink, "innerHTML");
        assert_eq!(findings[0].confidence, "medium");
    }

    #[test]
    fn eval_of_search_is_high_confidence() {
        let analyzer = DomAnalyzer::new();
        let code = r#"eval(window.location.search)"#;
        let findings = analyzer.analyze("https://t/p", code, "html");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].confidence, "high");
    }

    #[test]
    fn benign_assignments_and_sanitised_code_are_ignored() {
        let analyzer = DomAnalyzer::new();
        assert!(analyzer
            .analyze("https://t/p", r#"el.innerHTML = "<b>static</b>";"#, "html")
            .is_empty());
        assert!(analyzer
            .analyze(
                "https://t/p",
                r#"el.innerHTML = DOMPurify.sanitize(location.hash);"#,
                "html"
            )
            .is_empty());
    }

    #[test]
    fn repeated_findings_emit_once() {
        let analyzer = DomAnalyzer::new();
        let code = r#"document.write(location.href)"#;
        assert_eq!(analyzer.analyze("https://t/p", code, "html").len(), 1);
        assert!(analyzer.analyze("https://t/p", code, "html").is_empty());
    }
}
