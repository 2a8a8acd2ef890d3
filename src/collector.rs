// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Verkko - Async link collector plumbing
 * Scope filters, per-request contexts, the pending-request queue with
 * in-flight accounting for drain, and the cooperative stop signal.
 */
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::sync::{mpsc, watch};
use url::Url;

use crate::config::CrawlerConfig;
use crate::http_client::OutboundRequest;

/// Per-request metadata that survives the round-trip through the queue
/// and the transport. Immutable once attached.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub depth: usize,
    pub origin: String,
    pub request_key: String,
    pub reflected: bool,
    pub payload: String,
    pub param: String,
    pub events: Vec<String>,
}

#[derive(Debug)]
pub struct PendingRequest {
    pub request: OutboundRequest,
    pub ctx: RequestContext,
}

/// Include/exclude regex scope applied before a URL is queued.
pub struct ScopeFilters {
    url_filters: Vec<Regex>,
    disallowed: Vec<Regex>,
}

/// Static-asset extensions never worth a request.
const DISALLOWED_EXTENSION_REGEX: &str = r"(?i)\.(png|apng|bmp|gif|ico|cur|jpg|jpeg|jfif|pjp|pjpeg|svg|tif|tiff|webp|xbm|3gp|aac|flac|mpg|mpeg|mp3|mp4|m4a|m4v|m4p|oga|ogg|ogv|mov|wav|webm|eot|woff|woff2|ttf|otf|css)(\?|#|$)";

impl ScopeFilters {
    /// Builds the scope for one site: host-anchored in-scope pattern
    /// (`--subs` widens to a bare host substring), static-extension
    /// disallow list, user blacklist, and whitelist/whitelist-domain
    /// overrides.
    pub fn from_config(cfg: &CrawlerConfig, site: &Url) -> Result<Self> {
        let host_pattern = regex::escape(site.host_str().unwrap_or(""));
        let scope_pattern = if cfg.subs {
            format!("(?i){}", host_pattern)
        } else {
            format!("(?i)(?:https?://){}", host_pattern)
        };

        let mut url_filters =
            vec![Regex::new(&scope_pattern).context("invalid site scope pattern")?];

        let mut disallowed = vec![Regex::new(DISALLOWED_EXTENSION_REGEX)
            .context("invalid extension filter pattern")?];

        if !cfg.blacklist.is_empty() {
            disallowed.push(
                Regex::new(&cfg.blacklist)
                    .with_context(|| format!("invalid blacklist regex {}", cfg.blacklist))?,
            );
        }

        if !cfg.whitelist.is_empty() {
            url_filters = vec![Regex::new(&cfg.whitelist)
                .with_context(|| format!("invalid whitelist regex {}", cfg.whitelist))?];
        }

        if !cfg.whitelist_domain.is_empty() {
            url_filters = vec![Regex::new(&format!("http(s)?://{}", cfg.whitelist_domain))
                .with_context(|| {
                    format!("invalid whitelist domain {}", cfg.whitelist_domain)
                })?];
        }

        Ok(Self {
            url_filters,
            disallowed,
        })
    }

    /// A scope with no in-scope restriction, used by the JS collector:
    /// only the disallow lists (and any whitelist overrides) apply.
    pub fn unrestricted(cfg: &CrawlerConfig) -> Result<Self> {
        let mut url_filters = Vec::new();
        if !cfg.whitelist.is_empty() {
            url_filters.push(
                Regex::new(&cfg.whitelist)
                    .with_context(|| format!("invalid whitelist regex {}", cfg.whitelist))?,
            );
        }
        if !cfg.whitelist_domain.is_empty() {
            url_filters.push(
                Regex::new(&format!("http(s)?://{}", cfg.whitelist_domain)).with_context(
                    || format!("invalid whitelist domain {}", cfg.whitelist_domain),
                )?,
            );
        }
        let disallowed = vec![Regex::new(DISALLOWED_EXTENSION_REGEX)
            .context("invalid extension filter pattern")?];
        Ok(Self {
            url_filters,
            disallowed,
        })
    }

    pub fn allowed(&self, url: &str) -> bool {
        if self.disallowed.iter().any(|re| re.is_match(url)) {
            return false;
        }
        if self.url_filters.is_empty() {
            return true;
        }
        self.url_filters.iter().any(|re| re.is_match(url))
    }

    pub fn url_filters(&self) -> &[Regex] {
        &self.url_filters
    }
}

/// Cooperative stop signal shared by the scheduler, collectors and hybrid
/// workers. Latches once; `cancelled` never misses a stop that raced it.
#[derive(Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Unbounded request queue with in-flight accounting so the crawler can
/// drain: `wait_idle` resolves once every enqueued request has been
/// handled to completion.
pub struct FetchQueue {
    tx: mpsc::UnboundedSender<PendingRequest>,
    pending: Arc<AtomicI64>,
}

impl FetchQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PendingRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                pending: Arc::new(AtomicI64::new(0)),
            },
            rx,
        )
    }

    pub fn enqueue(&self, pending: PendingRequest) -> bool {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(pending).is_err() {
            self.task_done();
            return false;
        }
        true
    }

    /// Called exactly once per dequeued request after its handler ran.
    pub fn task_done(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn pending(&self) -> i64 {
        self.pending.load(Ordering::SeqCst)
    }

    pub async fn wait_idle(&self) {
        while self.pending() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> CrawlerConfig {
        CrawlerConfig::default()
    }

    #[test]
    fn scope_anchors_to_host() {
        let site = Url::parse("https://target.example/").unwrap();
        let scope = ScopeFilters::from_config(&cfg(), &site).unwrap();
        assert!(scope.allowed("https://target.example/a"));
        assert!(!scope.allowed("https://other.example/a"));
        // Without --subs a bare subdomain does not match the anchored form.
        assert!(!scope.allowed("https://sub.target.example/a"));
    }

    #[test]
    fn subs_widens_scope_to_subdomains() {
        let site = Url::parse("https://target.example/").unwrap();
        let mut config = cfg();
        config.subs = true;
        let scope = ScopeFilters::from_config(&config, &site).unwrap();
        assert!(scope.allowed("https://sub.target.example/a"));
    }

    #[test]
    fn static_extensions_are_disallowed() {
        let site = Url::parse("https://target.example/").unwrap();
        let scope = ScopeFilters::from_config(&cfg(), &site).unwrap();
        assert!(!scope.allowed("https://target.example/logo.png"));
        assert!(!scope.allowed("https://target.example/app.css?v=1"));
        assert!(scope.allowed("https://target.example/app.js"));
    }

    #[test]
    fn whitelist_replaces_site_scope() {
        let site = Url::parse("https://target.example/").unwrap();
        let mut config = cfg();
        config.whitelist = "(?i)https://allowed\\.example".into();
        let scope = ScopeFilters::from_config(&config, &site).unwrap();
        assert!(scope.allowed("https://allowed.example/x"));
        assert!(!scope.allowed("https://target.example/a"));
    }

    #[test]
    fn invalid_blacklist_is_a_config_error() {
        let site = Url::parse("https://target.example/").unwrap();
        let mut config = cfg();
        config.blacklist = "(unclosed".into();
        assert!(ScopeFilters::from_config(&config, &site).is_err());
    }

    #[tokio::test]
    async fn fetch_queue_counts_down_to_idle() {
        let (queue, mut rx) = FetchQueue::new();
        assert!(queue.enqueue(PendingRequest {
            request: OutboundRequest::default(),
            ctx: RequestContext::default(),
        }));
        assert_eq!(queue.pending(), 1);
        let _ = rx.recv().await.unwrap();
        queue.task_done();
        queue.wait_idle().await;
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn stop_signal_latches() {
        let stop = StopSignal::new();
        assert!(!stop.is_stopped());
        stop.stop();
        assert!(stop.is_stopped());
        stop.stop();
        assert!(stop.is_stopped());
    }
}
