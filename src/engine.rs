// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Verkko - Crawl Engine
 * Site intake (flag, file, stdin), the site-level worker pool, signal
 * fan-out and the periodic stats ticker.
 */
use std::io::{BufRead, IsTerminal};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use url::Url;

use crate::config::CrawlerConfig;
use crate::collector::StopSignal;
use crate::crawler::Crawler;
use crate::stats::CrawlStats;
use crate::utils::reading_lines;

pub struct Engine {
    cfg: CrawlerConfig,
    threads: usize,
    stats: Arc<CrawlStats>,
    start_time: Instant,
    active_crawlers: Arc<Mutex<Vec<Arc<Crawler>>>>,
    shutdown: StopSignal,
}

impl Engine {
    pub fn new(cfg: CrawlerConfig, threads: usize) -> Self {
        Self {
            cfg,
            threads: threads.max(1),
            stats: Arc::new(CrawlStats::new()),
            start_time: Instant::now(),
            active_crawlers: Arc::new(Mutex::new(Vec::new())),
            shutdown: StopSignal::new(),
        }
    }

    pub fn stats(&self) -> Arc<CrawlStats> {
        Arc::clone(&self.stats)
    }

    /// Gathers targets from `--site`, `--sites` and stdin (when piped).
    pub fn resolve_sites(site: &str, sites_file: &str) -> Vec<String> {
        let mut site_list: Vec<String> = Vec::new();
        if !site.is_empty() {
            site_list.push(site.to_string());
        }
        if !sites_file.is_empty() {
            site_list.extend(reading_lines(sites_file));
        }

        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            for line in stdin.lock().lines().map_while(Result::ok) {
                let target = line.trim();
                if !target.is_empty() {
                    site_list.push(target.to_string());
                }
            }
        }

        site_list
    }

    /// Runs every site through the pool of `threads` workers and waits
    /// for completion.
    pub async fn run(&self, sites: Vec<String>) {
        if sites.is_empty() {
            info!("No site in list. Please check your site input again");
            return;
        }

        self.spawn_signal_handler();
        self.spawn_stats_ticker();

        let (tx, rx) = mpsc::channel::<String>(self.threads);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let mut workers = Vec::with_capacity(self.threads);
        for _ in 0..self.threads {
            let rx = Arc::clone(&rx);
            let cfg = self.cfg.clone();
            let stats = Arc::clone(&self.stats);
            let active = Arc::clone(&self.active_crawlers);
            let shutdown = self.shutdown.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    let raw_site = {
                        let mut guard = rx.lock().await;
                        match guard.recv().await {
                            Some(site) => site,
                            None => return,
                        }
                    };
                    if shutdown.is_stopped() {
                        return;
                    }

                    let site = match Url::parse(&raw_site) {
                        Ok(site) => site,
                        Err(err) => {
                            error!("Failed to parse {}: {}", raw_site, err);
                            stats.increment_errors();
                            continue;
                        }
                    };

                    let crawler = match Crawler::new(
                        site,
                        cfg.clone(),
                        Arc::clone(&stats),
                        StopSignal::new(),
                    ) {
                        Ok(crawler) => crawler,
                        Err(err) => {
                            error!("Failed to start {}: {}", raw_site, err);
                            stats.increment_errors();
                            continue;
                        }
                    };

                    active
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push(Arc::clone(&crawler));

                    Arc::clone(&crawler).run().await;

                    active
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .retain(|c| !Arc::ptr_eq(c, &crawler));
                }
            }));
        }

        for site in sites {
            if self.shutdown.is_stopped() {
                warn!("Stopping site input due to cancellation.");
                break;
            }
            if tx.send(site).await.is_err() {
                break;
            }
        }
        drop(tx);

        for worker in workers {
            let _ = worker.await;
        }
        self.shutdown.stop();
    }

    /// Ctrl-C/SIGTERM stops site intake and every active crawler.
    fn spawn_signal_handler(&self) {
        let shutdown = self.shutdown.clone();
        let active = Arc::clone(&self.active_crawlers);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("Received interrupt signal, shutting down...");
            shutdown.stop();
            tokio::time::sleep(Duration::from_millis(500)).await;

            let crawlers: Vec<Arc<Crawler>> = active
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .cloned()
                .collect();
            if !crawlers.is_empty() {
                warn!("Forcing stop on active crawlers...");
            }
            for crawler in crawlers {
                crawler.stop();
            }
        });
    }

    fn spawn_stats_ticker(&self) {
        if self.cfg.quiet {
            return;
        }
        let stats = Arc::clone(&self.stats);
        let shutdown = self.shutdown.clone();
        let start = self.start_time;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(10));
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = ticker.tick() => {
                        let elapsed = start.elapsed();
                        info!(
                            "Stats [{}s]: URLs: {}, Requests: {}, Errors: {}, RPS: {:.2}",
                            elapsed.as_secs(),
                            stats.urls_found(),
                            stats.requests_made(),
                            stats.errors(),
                            stats.rps(elapsed)
                        );
                    }
                }
            }
        });
    }

    /// Final statistics after the run.
    pub fn report(&self) {
        let elapsed = self.start_time.elapsed();
        if !self.cfg.quiet {
            info!("Crawl finished in {}s", elapsed.as_secs());
            info!(
                "Final Stats: URLs Found: {}, Requests Made: {}, Errors: {}, Average RPS: {:.2}",
                self.stats.urls_found(),
                self.stats.requests_made(),
                self.stats.errors(),
                self.stats.rps(elapsed)
            );
        }
        info!("Done.");
    }
}
