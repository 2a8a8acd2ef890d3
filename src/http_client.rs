// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Verkko - Browser-mimicking HTTP transport
 * Wraps reqwest with rotating realistic User-Agents, proxy support,
 * default headers (Cookie, extra -H, Burp import) and a per-host token
 * bucket that halves its refill rate on 429/503.
 */
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use nonzero_ext::nonzero;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::config::CrawlerConfig;

/// Realistic desktop browser User-Agents.
const WEB_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

/// Realistic mobile browser User-Agents.
const MOBILE_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-G991B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Mobile Safari/537.36",
];

fn next_user_agent(pool: &[&'static str]) -> &'static str {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    pool[COUNTER.fetch_add(1, Ordering::Relaxed) % pool.len()]
}

/// Response shape handed to the crawler pipeline.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
    pub final_url: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(|s| s.as_str())
    }

    pub fn content_type(&self) -> String {
        let raw = self.header("content-type").unwrap_or("");
        raw.split(';').next().unwrap_or("").trim().to_lowercase()
    }
}

/// Maximum response body size (10MB) to prevent memory exhaustion.
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

struct HostBucket {
    current_rps: u32,
    limiter: Arc<DirectLimiter>,
}

impl HostBucket {
    fn new(rps: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(rps).unwrap_or(nonzero!(1u32)));
        Self {
            current_rps: rps,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

/// Per-host token buckets; refill rate halves on 429/503 down to 1 rps.
pub struct HostRateControl {
    default_rps: u32,
    buckets: RwLock<HashMap<String, HostBucket>>,
}

impl HostRateControl {
    pub fn new(default_rps: u32) -> Self {
        Self {
            default_rps: default_rps.max(1),
            buckets: RwLock::new(HashMap::new()),
        }
    }

    fn host_of(url: &str) -> String {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub async fn wait_for_slot(&self, url: &str) {
        let host = Self::host_of(url);
        let limiter = {
            let mut buckets = self.buckets.write().await;
            Arc::clone(
                &buckets
                    .entry(host)
                    .or_insert_with(|| HostBucket::new(self.default_rps))
                    .limiter,
            )
        };
        limiter.until_ready().await;
    }

    /// Halves the refill rate for the host; aggregate outbound rate
    /// declines under persistent 429.
    pub async fn record_rate_limit(&self, url: &str, status: u16) {
        let host = Self::host_of(url);
        let mut buckets = self.buckets.write().await;
        let bucket = buckets
            .entry(host.clone())
            .or_insert_with(|| HostBucket::new(self.default_rps));
        let reduced = (bucket.current_rps / 2).max(1);
        if reduced < bucket.current_rps {
            warn!(
                "Rate limited by {} (HTTP {}): {} -> {} req/s",
                host, status, bucket.current_rps, reduced
            );
            *bucket = HostBucket::new(reduced);
        }
    }
}

/// Outbound request descriptor for the collector.
#[derive(Debug, Clone, Default)]
pub struct OutboundRequest {
    pub method: String,
    pub url: String,
    pub body: String,
    pub headers: Vec<(String, String)>,
    pub content_type: String,
}

pub struct HttpClient {
    client: reqwest::Client,
    rate_control: HostRateControl,
    max_body_size: usize,
}

impl HttpClient {
    /// Builds the transport for one crawl site. `site_host` scopes the
    /// `--no-redirect` policy.
    pub fn new(cfg: &CrawlerConfig, site_host: &str) -> Result<Self> {
        let mut default_headers = HeaderMap::new();

        if cfg.stealth {
            // Browser-profile headers; full TLS/JA3 shaping lives in the
            // external anti-detection transport.
            default_headers.insert(
                reqwest::header::ACCEPT,
                HeaderValue::from_static(
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
                ),
            );
            default_headers.insert(
                reqwest::header::ACCEPT_LANGUAGE,
                HeaderValue::from_static("en-US,en;q=0.9"),
            );
            default_headers.insert(
                reqwest::header::UPGRADE_INSECURE_REQUESTS,
                HeaderValue::from_static("1"),
            );
        }

        let mut imported = burp_headers(&cfg.burp_file);
        if imported.is_empty() {
            if !cfg.cookie.is_empty() {
                if let Ok(value) = HeaderValue::from_str(&cfg.cookie) {
                    default_headers.insert(reqwest::header::COOKIE, value);
                }
            }
            for header in &cfg.headers {
                let Some((key, value)) = header.split_once(':') else {
                    continue;
                };
                let key = key.trim();
                let value = value.trim();
                if key.is_empty() {
                    continue;
                }
                if let (Ok(name), Ok(value)) =
                    (key.parse::<HeaderName>(), HeaderValue::from_str(value))
                {
                    default_headers.insert(name, value);
                }
            }
        } else {
            for (key, value) in imported.drain(..) {
                if let (Ok(name), Ok(value)) =
                    (key.parse::<HeaderName>(), HeaderValue::from_str(&value))
                {
                    default_headers.insert(name, value);
                }
            }
        }

        let user_agent = match cfg.user_agent.as_str() {
            "web" => next_user_agent(WEB_USER_AGENTS).to_string(),
            "mobi" => next_user_agent(MOBILE_USER_AGENTS).to_string(),
            custom => custom.to_string(),
        };

        let redirect_policy = if cfg.no_redirect {
            let host = site_host.to_string();
            Policy::custom(move |attempt| {
                let stays_on_host = attempt
                    .url()
                    .host_str()
                    .map(|h| h.contains(&host) || host.contains(h))
                    .unwrap_or(false);
                if stays_on_host && attempt.previous().len() <= 5 {
                    attempt.follow()
                } else {
                    attempt.stop()
                }
            })
        } else {
            Policy::limited(5)
        };

        let mut builder = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .user_agent(user_agent)
            .default_headers(default_headers)
            .redirect(redirect_policy)
            .danger_accept_invalid_certs(true)
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true);

        if !cfg.proxy.is_empty() {
            let proxy = reqwest::Proxy::all(&cfg.proxy)
                .with_context(|| format!("invalid proxy {}", cfg.proxy))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().context("failed to create HTTP client")?;

        Ok(Self {
            client,
            rate_control: HostRateControl::new(50),
            max_body_size: MAX_BODY_SIZE,
        })
    }

    /// Sends an outbound request: rate-limit slot first, then the wire.
    /// Non-2xx statuses are returned, not errors; only transport failures
    /// error out.
    pub async fn send(&self, request: &OutboundRequest) -> Result<HttpResponse> {
        self.rate_control.wait_for_slot(&request.url).await;

        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .unwrap_or(reqwest::Method::GET);

        let mut builder = self.client.request(method.clone(), &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if !request.content_type.is_empty()
            && !request
                .headers
                .iter()
                .any(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        {
            builder = builder.header(reqwest::header::CONTENT_TYPE, request.content_type.as_str());
        }
        if method != reqwest::Method::GET && !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        let mut headers = HashMap::with_capacity(response.headers().len());
        for (key, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(key.as_str().to_lowercase(), value.to_string());
            }
        }

        let bytes = response.bytes().await.unwrap_or_default();
        let body = if bytes.len() > self.max_body_size {
            String::from_utf8_lossy(&bytes[..self.max_body_size]).to_string()
        } else {
            String::from_utf8_lossy(&bytes).to_string()
        };

        if status == 429 || status == 503 {
            self.rate_control.record_rate_limit(&request.url, status).await;
        }

        Ok(HttpResponse {
            status,
            body,
            headers,
            final_url,
        })
    }
}

/// Imports headers (Cookie included) from a Burp raw HTTP request file.
/// Only the header block is read; request line and body are ignored.
pub fn burp_headers(path: &str) -> Vec<(String, String)> {
    if path.is_empty() {
        return Vec::new();
    }
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(err) => {
            debug!("failed to open burp file {}: {}", path, err);
            return Vec::new();
        }
    };

    let mut headers = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if idx == 0 {
            // Request line: METHOD /path HTTP/1.1
            continue;
        }
        if line.trim().is_empty() {
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() || key.eq_ignore_ascii_case("content-length") {
            continue;
        }
        headers.push((key.to_string(), value.to_string()));
    }
    headers
}
