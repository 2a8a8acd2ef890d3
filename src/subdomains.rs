// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Verkko - Subdomain Harvester & body miners
 * crt.sh certificate-transparency lookups plus regexes that mine crawled
 * bodies for in-scope subdomains, AWS S3 bucket references and archive
 * seeds.
 */
use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

static AWS_S3_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)([a-z0-9.\-]+\.s3(?:[.\-][a-z0-9\-]+)?\.amazonaws\.com|s3(?:[.\-][a-z0-9\-]+)?\.amazonaws\.com/[a-z0-9.\-_]+)",
    )
    .unwrap()
});

#[derive(Debug, Deserialize)]
struct CrtRecord {
    #[serde(rename = "name_value")]
    name: String,
}

/// Aggregates subdomains for a registered domain from crt.sh. The result
/// is a sorted, deduplicated set that always contains the domain itself.
pub async fn fetch_subdomains(domain: &str) -> Vec<String> {
    let domain = domain.trim().to_lowercase();
    if domain.is_empty() {
        return Vec::new();
    }

    let mut seen: BTreeSet<String> = BTreeSet::new();
    seen.insert(domain.clone());

    match fetch_crtsh_subdomains(&domain).await {
        Ok(records) => {
            seen.extend(records);
        }
        Err(err) => {
            debug!("crt.sh lookup failed: {}", err);
        }
    }

    seen.into_iter().collect()
}

async fn fetch_crtsh_subdomains(domain: &str) -> Result<Vec<String>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent("verkko/1.2")
        .build()
        .context("build crt.sh client")?;

    let endpoint = format!("https://crt.sh/?q=%25.{}&output=json", domain);
    let response = client
        .get(&endpoint)
        .send()
        .await
        .context("request crt.sh")?;

    if !response.status().is_success() {
        anyhow::bail!("crt.sh returned status {}", response.status());
    }

    let records: Vec<CrtRecord> = response.json().await.context("parse crt.sh json")?;

    let mut set: BTreeSet<String> = BTreeSet::new();
    for record in records {
        for candidate in record.name.split('\n') {
            let sub = clean_subdomain(candidate);
            if sub.is_empty() || !sub.ends_with(domain) {
                continue;
            }
            set.insert(sub);
        }
    }

    Ok(set.into_iter().collect())
}

/// Strips wildcard markers, schemes and ports from a certificate name.
pub fn clean_subdomain(raw: &str) -> String {
    let mut sub = raw.trim().to_lowercase();
    for prefix in ["*.", "http://", "https://"] {
        if let Some(stripped) = sub.strip_prefix(prefix) {
            sub = stripped.to_string();
        }
    }
    if let Some(idx) = sub.find(&[':', '/'][..]) {
        sub.truncate(idx);
    }
    if sub.contains('@') || sub.contains(' ') {
        return String::new();
    }
    sub.trim_matches('.').to_string()
}

/// Mines a response body for subdomains of the registered domain.
pub fn get_subdomains(body: &str, domain: &str) -> Vec<String> {
    if domain.is_empty() {
        return Vec::new();
    }
    let escaped = regex::escape(domain);
    let Ok(pattern) = Regex::new(&format!(r"(?i)(([a-zA-Z0-9\-_]+\.)+{})", escaped)) else {
        return Vec::new();
    };
    let mut seen = BTreeSet::new();
    for m in pattern.find_iter(body) {
        let sub = m.as_str().trim_matches('.').to_lowercase();
        if !sub.is_empty() {
            seen.insert(sub);
        }
    }
    seen.into_iter().collect()
}

/// Mines a response body for AWS S3 bucket references.
pub fn get_aws_s3(body: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    for m in AWS_S3_REGEX.find_iter(body) {
        seen.insert(m.as_str().to_lowercase());
    }
    seen.into_iter().collect()
}

/// Archive.org CDX seeds for a domain; the one implemented third-party
/// source behind `--other-source`.
pub async fn other_sources(domain: &str, include_subs: bool) -> Vec<String> {
    let domain = domain.trim().to_lowercase();
    if domain.is_empty() {
        return Vec::new();
    }
    let pattern = if include_subs {
        format!("*.{}/*", domain)
    } else {
        format!("{}/*", domain)
    };
    let endpoint = format!(
        "https://web.archive.org/cdx/search/cdx?url={}&output=text&fl=original&collapse=urlkey",
        pattern
    );

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent("verkko/1.2")
        .build()
    {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    let body = match client.get(&endpoint).send().await {
        Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
        Ok(resp) => {
            debug!("archive.org returned status {}", resp.status());
            return Vec::new();
        }
        Err(err) => {
            debug!("archive.org lookup failed: {}", err);
            return Vec::new();
        }
    };

    let mut seen = BTreeSet::new();
    for line in body.lines() {
        let line = line.trim();
        if !line.is_empty() {
            seen.insert(line.to_string());
        }
    }
    seen.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_subdomain_strips_wildcards_and_ports() {
        assert_eq!(clean_subdomain("*.api.example.com"), "api.example.com");
        assert_eq!(clean_subdomain("https://www.example.com/"), "www.example.com");
        assert_eq!(clean_subdomain("mail.example.com:443"), "mail.example.com");
        assert_eq!(clean_subdomain("user@example.com"), "");
    }

    #[test]
    fn body_mining_finds_unique_subdomains() {
        let body = "see https://api.example.com/v1 and static.example.com plus api.EXAMPLE.com";
        let subs = get_subdomains(body, "example.com");
        assert_eq!(
            subs,
            vec!["api.example.com".to_string(), "static.example.com".to_string()]
        );
    }

    #[test]
    fn aws_s3_patterns_match_both_forms() {
        let body = r#"
            <a href="https://assets-prod.s3.amazonaws.com/x.js"></a>
            fetch('https://s3.eu-west-1.amazonaws.com/backup-bucket/dump.sql')
        "#;
        let hits = get_aws_s3(body);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().any(|h| h.starts_with("assets-prod.s3")));
        assert!(hits.iter().any(|h| h.contains("/backup-bucket")));
    }
}
