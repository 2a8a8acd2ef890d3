// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Atomic crawl counters shared across all sites in a run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct CrawlStats {
    urls_found: AtomicU64,
    requests_made: AtomicU64,
    errors: AtomicU64,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_urls_found(&self) {
        self.urls_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_urls_found(&self, count: usize) {
        if count > 0 {
            self.urls_found.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn increment_requests_made(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn urls_found(&self) -> u64 {
        self.urls_found.load(Ordering::Relaxed)
    }

    pub fn requests_made(&self) -> u64 {
        self.requests_made.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn rps(&self, elapsed: Duration) -> f64 {
        let seconds = elapsed.as_secs_f64();
        if seconds <= 0.0 {
            return 0.0;
        }
        self.requests_made() as f64 / seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = CrawlStats::new();
        stats.increment_urls_found();
        stats.add_urls_found(3);
        stats.increment_requests_made();
        stats.increment_errors();
        assert_eq!(stats.urls_found(), 4);
        assert_eq!(stats.requests_made(), 1);
        assert_eq!(stats.errors(), 1);
    }

    #[test]
    fn rps_is_zero_for_zero_elapsed() {
        let stats = CrawlStats::new();
        stats.increment_requests_made();
        assert_eq!(stats.rps(Duration::ZERO), 0.0);
        assert!(stats.rps(Duration::from_secs(2)) > 0.0);
    }
}
