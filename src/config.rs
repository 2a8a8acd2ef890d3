// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Crawler configuration assembled from the CLI surface.

use std::sync::Arc;
use std::time::Duration;

use crate::registry::RequestRegistry;

#[derive(Clone)]
pub struct CrawlerConfig {
    /// Shared across every crawler in the run.
    pub registry: Arc<RequestRegistry>,

    pub quiet: bool,
    pub json_output: bool,
    pub max_depth: usize,
    pub max_concurrency: usize,
    pub delay: Duration,
    pub random_delay: Duration,
    pub length: bool,
    pub raw: bool,
    pub subs: bool,
    pub reflected: bool,
    pub stealth: bool,
    pub proxy: String,
    pub timeout: Duration,
    pub no_redirect: bool,
    pub burp_file: String,
    pub cookie: String,
    pub headers: Vec<String>,
    pub user_agent: String,
    pub output_dir: String,
    pub reflected_output: String,
    pub filter_length: Vec<usize>,
    pub blacklist: String,
    pub whitelist: String,
    pub whitelist_domain: String,
    pub linkfinder: bool,
    pub sitemap: bool,
    pub robots: bool,
    pub other_source: bool,
    pub include_subs: bool,
    pub include_other_source: bool,
    pub dom_dedup: bool,
    pub dom_dedup_threshold: u32,
    pub baseline_fuzz_cap: usize,

    pub hybrid_crawl: bool,
    pub hybrid_workers: usize,
    pub hybrid_nav_timeout: Duration,
    pub hybrid_stabilization: Duration,
    pub hybrid_headless: bool,
    pub hybrid_init_scripts: Vec<String>,
    pub hybrid_visit_limit: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            registry: Arc::new(RequestRegistry::new()),
            quiet: false,
            json_output: false,
            max_depth: 1,
            max_concurrency: 5,
            delay: Duration::ZERO,
            random_delay: Duration::ZERO,
            length: false,
            raw: false,
            subs: false,
            reflected: false,
            stealth: false,
            proxy: String::new(),
            timeout: Duration::from_secs(10),
            no_redirect: false,
            burp_file: String::new(),
            cookie: String::new(),
            headers: Vec::new(),
            user_agent: "web".to_string(),
            output_dir: String::new(),
            reflected_output: String::new(),
            filter_length: Vec::new(),
            blacklist: String::new(),
            whitelist: String::new(),
            whitelist_domain: String::new(),
            linkfinder: true,
            sitemap: false,
            robots: true,
            other_source: false,
            include_subs: false,
            include_other_source: false,
            dom_dedup: false,
            dom_dedup_threshold: 6,
            baseline_fuzz_cap: 2,
            hybrid_crawl: false,
            hybrid_workers: 2,
            hybrid_nav_timeout: Duration::from_secs(12),
            hybrid_stabilization: Duration::from_millis(600),
            hybrid_headless: true,
            hybrid_init_scripts: Vec::new(),
            hybrid_visit_limit: 150,
        }
    }
}

impl CrawlerConfig {
    /// Parses the comma-separated `--filter-length` list; invalid entries
    /// are dropped.
    pub fn parse_filter_length(raw: &str) -> Vec<usize> {
        raw.split(',')
            .filter_map(|part| part.trim().parse::<usize>().ok())
            .collect()
    }
}
