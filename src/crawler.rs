// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Verkko - Site Crawler
 * One crawler per target site: drives the async collectors, runs the
 * response pipeline (link/form/JS extraction, reflection probing, DOM
 * dedup and sink analysis, subdomain/S3 mining) and the hybrid
 * browser-driven state explorer.
 */
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use scraper::{Html, Selector};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::backoff::BackoffController;
use crate::browser::{BrowserPool, BrowserPoolConfig, PageAnalysisResult};
use crate::collector::{FetchQueue, PendingRequest, RequestContext, ScopeFilters, StopSignal};
use crate::config::CrawlerConfig;
use crate::dom_analysis::DomAnalyzer;
use crate::dom_dedup::{is_likely_html, is_likely_js, DomDeduper};
use crate::forms;
use crate::http_client::{HttpClient, HttpResponse, OutboundRequest};
use crate::linkfinder;
use crate::netutil::normalize_display_url;
use crate::output::{Output, SpiderOutput};
use crate::payloads::{
    default_payload_variants, select_baseline_payloads, PayloadVariant,
    DEFAULT_REFLECTED_PAYLOAD, REFLECTED_PARAM_NAME,
};
use crate::reflection::{build_reflected_requests, ObservedResponse, ReflectionFinding, ReflectionStore};
use crate::registry::RequestRegistry;
use crate::request::{build_request_key, normalize as normalize_request, SyntheticRequest};
use crate::sitemap;
use crate::state_graph::{ApplicationStateGraph, StateTransition};
use crate::stats::CrawlStats;
use crate::stringset::StringFilter;
use crate::subdomains;
use crate::url_norm::normalize_url;
use crate::utils::{decode_chars, ext_type, in_scope, site_domain};

struct HybridState {
    pool: Arc<BrowserPool>,
    graph: Arc<ApplicationStateGraph>,
    tx: mpsc::Sender<String>,
    rx: tokio::sync::Mutex<Option<mpsc::Receiver<String>>>,
    visited: StringFilter,
    api_set: StringFilter,
    enqueued: AtomicI64,
    in_flight: AtomicI64,
    visit_cap: i64,
    workers: usize,
    active: AtomicBool,
    stop: StopSignal,
}

pub struct Crawler {
    cfg: CrawlerConfig,
    site: Url,
    domain: String,
    input: String,
    client: Arc<HttpClient>,
    registry: Arc<RequestRegistry>,
    stats: Arc<CrawlStats>,
    stop: StopSignal,

    scope: ScopeFilters,
    js_scope: ScopeFilters,
    queue: FetchQueue,
    js_queue: FetchQueue,
    rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<PendingRequest>>>,
    js_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<PendingRequest>>>,
    semaphore: Arc<Semaphore>,

    output: Option<Arc<Output>>,
    reflected_writer: Option<Arc<Output>>,

    reflection: ReflectionStore,
    payload_variants: Vec<PayloadVariant>,
    baseline_payloads: Vec<PayloadVariant>,

    backoff: BackoffController,
    dom_deduper: Option<DomDeduper>,
    dom_skip: RwLock<HashSet<String>>,
    dom_analyzer: DomAnalyzer,

    sub_set: StringFilter,
    aws_set: StringFilter,
    js_set: StringFilter,
    js_request_set: StringFilter,
    js_request_log_set: StringFilter,
    form_set: StringFilter,
    upload_set: StringFilter,

    hybrid: Option<HybridState>,
}

impl Crawler {
    pub fn new(
        site: Url,
        cfg: CrawlerConfig,
        stats: Arc<CrawlStats>,
        stop: StopSignal,
    ) -> Result<Arc<Self>> {
        let domain = site_domain(&site);
        if domain.is_empty() {
            anyhow::bail!("failed to derive domain for {}", site);
        }
        info!("Start crawling: {}", site);

        let host = site.host_str().unwrap_or("").to_string();
        let client = Arc::new(HttpClient::new(&cfg, &host)?);
        let scope = ScopeFilters::from_config(&cfg, &site)?;
        let js_scope = ScopeFilters::unrestricted(&cfg)?;

        let output = if cfg.output_dir.is_empty() {
            None
        } else {
            Some(Arc::new(Output::per_host(&cfg.output_dir, &host)?))
        };
        let reflected_writer = if cfg.reflected_output.is_empty() {
            None
        } else {
            Some(Arc::new(Output::at_path(&cfg.reflected_output)?))
        };

        let payload_variants = default_payload_variants();
        let mut baseline_payloads = select_baseline_payloads(&payload_variants);
        if baseline_payloads.is_empty() {
            baseline_payloads = payload_variants.clone();
        }

        let dom_deduper = if cfg.dom_dedup {
            Some(DomDeduper::new(cfg.dom_dedup_threshold))
        } else {
            None
        };

        let (queue, rx) = FetchQueue::new();
        let (js_queue, js_rx) = FetchQueue::new();
        let semaphore = Arc::new(Semaphore::new(cfg.max_concurrency.max(1)));

        let hybrid = if cfg.hybrid_crawl {
            Self::initialize_hybrid(&cfg, &stats)
        } else {
            None
        };

        let registry = Arc::clone(&cfg.registry);
        let input = site.to_string();

        Ok(Arc::new(Self {
            cfg,
            site,
            domain,
            input,
            client,
            registry,
            stats,
            stop,
            scope,
            js_scope,
            queue,
            js_queue,
            rx: tokio::sync::Mutex::new(Some(rx)),
            js_rx: tokio::sync::Mutex::new(Some(js_rx)),
            semaphore,
            output,
            reflected_writer,
            reflection: ReflectionStore::new(DEFAULT_REFLECTED_PAYLOAD),
            payload_variants,
            baseline_payloads,
            backoff: BackoffController::new(),
            dom_deduper,
            dom_skip: RwLock::new(HashSet::new()),
            dom_analyzer: DomAnalyzer::new(),
            sub_set: StringFilter::new(),
            aws_set: StringFilter::new(),
            js_set: StringFilter::new(),
            js_request_set: StringFilter::new(),
            js_request_log_set: StringFilter::new(),
            form_set: StringFilter::new(),
            upload_set: StringFilter::new(),
            hybrid,
        }))
    }

    fn initialize_hybrid(cfg: &CrawlerConfig, stats: &Arc<CrawlStats>) -> Option<HybridState> {
        let workers = cfg.hybrid_workers.max(1);
        let pool_cfg = BrowserPoolConfig {
            pool_size: workers,
            navigation_timeout: cfg.hybrid_nav_timeout,
            stabilization_delay: cfg.hybrid_stabilization,
            headless: cfg.hybrid_headless,
            init_scripts: cfg.hybrid_init_scripts.clone(),
        };

        let pool = match BrowserPool::initialize(pool_cfg) {
            Ok(pool) => Arc::new(pool),
            Err(err) => {
                error!("hybrid mode disabled: {}", err);
                stats.increment_errors();
                return None;
            }
        };

        let queue_size = (workers * 4).max(8);
        let (tx, rx) = mpsc::channel(queue_size);
        let visit_cap = if cfg.hybrid_visit_limit == 0 {
            150
        } else {
            cfg.hybrid_visit_limit
        };

        info!(
            "Hybrid state-aware crawling enabled (workers={}, headless={})",
            workers, cfg.hybrid_headless
        );

        Some(HybridState {
            pool,
            graph: Arc::new(ApplicationStateGraph::new()),
            tx,
            rx: tokio::sync::Mutex::new(Some(rx)),
            visited: StringFilter::new(),
            api_set: StringFilter::new(),
            enqueued: AtomicI64::new(0),
            in_flight: AtomicI64::new(0),
            visit_cap: visit_cap as i64,
            workers,
            active: AtomicBool::new(true),
            stop: StopSignal::new(),
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn stop(&self) {
        if self.stop.is_stopped() {
            return;
        }
        warn!("Stopping crawler for {}...", self.site);
        if let Some(hybrid) = &self.hybrid {
            hybrid.active.store(false, Ordering::SeqCst);
            hybrid.stop.stop();
        }
        self.stop.stop();
    }

    /// Runs the crawl to completion: seeds, collector workers, hybrid
    /// explorer, drain.
    pub async fn run(self: Arc<Self>) {
        let mut worker_handles = Vec::new();

        if let Some(rx) = self.rx.lock().await.take() {
            worker_handles.push(tokio::spawn(Self::dispatch_loop(
                Arc::clone(&self),
                rx,
                CollectorKind::Main,
            )));
        }
        if let Some(js_rx) = self.js_rx.lock().await.take() {
            worker_handles.push(tokio::spawn(Self::dispatch_loop(
                Arc::clone(&self),
                js_rx,
                CollectorKind::LinkFinder,
            )));
        }

        let mut hybrid_handles = Vec::new();
        if let Some(hybrid) = &self.hybrid {
            if let Some(rx) = hybrid.rx.lock().await.take() {
                let shared_rx = Arc::new(tokio::sync::Mutex::new(rx));
                for _ in 0..hybrid.workers {
                    hybrid_handles.push(tokio::spawn(Self::hybrid_worker(
                        Arc::clone(&self),
                        Arc::clone(&shared_rx),
                    )));
                }
            }
            self.enqueue_hybrid(self.site.to_string().as_str()).await;
        }

        if self.cfg.sitemap {
            self.seed_sitemap().await;
        }
        if self.cfg.robots {
            self.seed_robots().await;
        }
        if self.cfg.other_source {
            self.seed_other_sources().await;
        }
        if self.cfg.subs {
            self.bootstrap_subdomains().await;
        }

        self.visit(self.site.to_string().as_str(), 1).await;

        // Drain until a full pass sees every queue empty; hybrid workers
        // feed the collector and vice versa.
        loop {
            self.queue.wait_idle().await;
            self.js_queue.wait_idle().await;
            self.wait_hybrid_drained().await;
            if self.queue.pending() == 0 && self.js_queue.pending() == 0 {
                break;
            }
            if self.stop.is_stopped() {
                break;
            }
        }

        if let Some(hybrid) = &self.hybrid {
            hybrid.active.store(false, Ordering::SeqCst);
            hybrid.stop.stop();
            for handle in hybrid_handles {
                let _ = handle.await;
            }
            let pool = Arc::clone(&hybrid.pool);
            let shutdown = tokio::task::spawn_blocking(move || pool.shutdown());
            if tokio::time::timeout(Duration::from_secs(5), shutdown)
                .await
                .is_err()
            {
                debug!("hybrid browser shutdown timed out");
            }
        }

        self.stop.stop();
        for handle in worker_handles {
            let _ = handle.await;
        }

        if let Some(output) = &self.output {
            output.flush();
        }
        if let Some(writer) = &self.reflected_writer {
            writer.flush();
        }
    }

    async fn wait_hybrid_drained(&self) {
        let Some(hybrid) = &self.hybrid else {
            return;
        };
        while hybrid.active.load(Ordering::SeqCst)
            && !self.stop.is_stopped()
            && hybrid.in_flight.load(Ordering::SeqCst) > 0
        {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    // ------------------------------------------------------------------
    // Collector dispatch
    // ------------------------------------------------------------------

    async fn dispatch_loop(
        crawler: Arc<Crawler>,
        mut rx: mpsc::UnboundedReceiver<PendingRequest>,
        kind: CollectorKind,
    ) {
        loop {
            let pending = tokio::select! {
                _ = crawler.stop.cancelled() => break,
                received = rx.recv() => match received {
                    Some(p) => p,
                    None => break,
                },
            };

            if crawler.stop.is_stopped() {
                Self::queue_for(&crawler, kind).task_done();
                continue;
            }

            let Ok(permit) = Arc::clone(&crawler.semaphore).acquire_owned().await else {
                Self::queue_for(&crawler, kind).task_done();
                break;
            };

            let worker = Arc::clone(&crawler);
            tokio::spawn(async move {
                worker.pace().await;
                worker.stats.increment_requests_made();
                let result = worker.client.send(&pending.request).await;
                match result {
                    Ok(response) => {
                        worker
                            .handle_response(&pending.request, &pending.ctx, response)
                            .await;
                    }
                    Err(err) => {
                        worker.handle_transport_error(&pending.request.url, &err).await;
                    }
                }
                drop(permit);
                Self::queue_for(&worker, kind).task_done();
            });
        }

        // Drain anything still queued after stop so wait_idle resolves.
        while rx.try_recv().is_ok() {
            Self::queue_for(&crawler, kind).task_done();
        }
    }

    fn queue_for(crawler: &Arc<Crawler>, kind: CollectorKind) -> &FetchQueue {
        match kind {
            CollectorKind::Main => &crawler.queue,
            CollectorKind::LinkFinder => &crawler.js_queue,
        }
    }

    /// Fixed delay plus random jitter before each outbound request.
    async fn pace(&self) {
        let mut wait = self.cfg.delay;
        if !self.cfg.random_delay.is_zero() {
            let jitter_ms = rand::thread_rng().gen_range(0..=self.cfg.random_delay.as_millis() as u64);
            wait += Duration::from_millis(jitter_ms);
        }
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    // ------------------------------------------------------------------
    // URL intake
    // ------------------------------------------------------------------

    /// Normalises a found URL, dedups it and queues a GET visit.
    /// Returns the normalised URL when the visit was scheduled.
    pub async fn process_url(
        &self,
        raw: &str,
        source: &str,
        output_type: &str,
        base: Option<&Url>,
        depth: usize,
    ) -> Option<String> {
        let normalized = normalize_url(base, raw)
            .or_else(|| normalize_url(Some(&self.site), raw))?;

        if self.registry.duplicate_url(&normalized) {
            return None;
        }

        self.stats.increment_urls_found();
        self.log_found(&normalized, source, output_type);
        self.visit(&normalized, depth).await;
        Some(normalized)
    }

    /// Queues a GET request for an in-scope URL at the given depth.
    pub async fn visit(&self, url: &str, depth: usize) {
        if self.stop.is_stopped() {
            return;
        }
        if self.cfg.max_depth > 0 && depth > self.cfg.max_depth {
            return;
        }
        if !self.scope.allowed(url) {
            debug!("out of scope: {}", url);
            return;
        }
        let request = OutboundRequest {
            method: "GET".to_string(),
            url: url.to_string(),
            ..Default::default()
        };
        let ctx = RequestContext {
            depth,
            origin: self.input.clone(),
            ..Default::default()
        };
        self.queue.enqueue(PendingRequest { request, ctx });
    }

    /// Feeds a JS/XML/JSON URL to the linkfinder collector; `.min.js`
    /// URLs also schedule their un-minified sibling.
    async fn feed_linkfinder(&self, js_url: &str, output_type: &str, source: &str) {
        if self.js_set.duplicate(js_url) {
            return;
        }
        self.stats.increment_urls_found();
        self.log_found(js_url, source, output_type);

        if js_url.contains(".min.js") {
            let original_js = js_url.replace(".min.js", ".js");
            self.visit_js(&original_js).await;
        }
        self.visit_js(js_url).await;
    }

    async fn visit_js(&self, url: &str) {
        if self.stop.is_stopped() || !self.js_scope.allowed(url) {
            return;
        }
        let request = OutboundRequest {
            method: "GET".to_string(),
            url: url.to_string(),
            ..Default::default()
        };
        let ctx = RequestContext {
            depth: 1,
            origin: self.input.clone(),
            ..Default::default()
        };
        self.js_queue.enqueue(PendingRequest { request, ctx });
    }

    // ------------------------------------------------------------------
    // Synthetic requests + reflection scheduling
    // ------------------------------------------------------------------

    /// Normalises, logs and schedules a generated request together with
    /// its reflection mutations.
    pub async fn process_generated_request(
        &self,
        req: SyntheticRequest,
        origin: &str,
        parent_depth: usize,
    ) {
        let Some(normalized) = normalize_request(req, origin, Some(&self.site)) else {
            return;
        };
        if !self.emit_js_request(&normalized, origin) {
            return;
        }
        self.schedule_generated_request(normalized, origin, parent_depth)
            .await;
    }

    async fn schedule_generated_request(
        &self,
        req: SyntheticRequest,
        origin: &str,
        parent_depth: usize,
    ) {
        let key = build_request_key(&req);
        self.queue_request(&req, origin, false, &key, parent_depth, "", "")
            .await;

        let aggressive = self.cfg.reflected;
        let budget = if aggressive {
            self.payload_variants.len()
        } else {
            self.cfg.baseline_fuzz_cap
        };
        if budget == 0 {
            return;
        }

        let payloads = self.pick_payloads(budget, aggressive);
        let mutations = build_reflected_requests(&req, &payloads, budget);
        for mutation in mutations {
            self.queue_request(
                &mutation.request,
                origin,
                aggressive,
                &key,
                parent_depth,
                &mutation.param,
                &mutation.payload,
            )
            .await;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn queue_request(
        &self,
        req: &SyntheticRequest,
        origin: &str,
        reflected: bool,
        baseline_key: &str,
        parent_depth: usize,
        param: &str,
        payload: &str,
    ) {
        if self.stop.is_stopped() {
            return;
        }
        let next_depth = parent_depth + 1;
        if self.cfg.max_depth > 0 && next_depth > self.cfg.max_depth {
            return;
        }

        let method = req.method_or_get().to_string();
        if self
            .registry
            .duplicate_request(&method, &req.raw_url, &req.body)
        {
            return;
        }
        if !self.scope.allowed(&req.raw_url) {
            return;
        }

        let mut headers: Vec<(String, String)> = req
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if !req.content_type.is_empty()
            && !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        {
            headers.push(("Content-Type".to_string(), req.content_type.clone()));
        }

        let body = if method.eq_ignore_ascii_case("GET") {
            String::new()
        } else {
            req.body.clone()
        };

        let mut key = baseline_key.to_string();
        if key.is_empty() {
            key = build_request_key(req);
        }

        let (param, payload) = if reflected {
            let param = if param.is_empty() { REFLECTED_PARAM_NAME } else { param };
            let payload = if payload.is_empty() {
                self.reflection.sentinel()
            } else {
                payload
            };
            self.reflection.register_mutation(&key, param, payload);
            (param.to_string(), payload.to_string())
        } else {
            (param.to_string(), payload.to_string())
        };

        if !payload.is_empty() {
            self.maybe_throttle_mutations(reflected).await;
        }

        let request = OutboundRequest {
            method,
            url: req.raw_url.clone(),
            body,
            headers,
            content_type: req.content_type.clone(),
        };
        let ctx = RequestContext {
            depth: next_depth,
            origin: origin.to_string(),
            request_key: key,
            reflected,
            payload,
            param,
            events: req.events.clone(),
        };
        self.queue.enqueue(PendingRequest { request, ctx });
    }

    /// Renders `count` payloads, sampled without replacement from the
    /// active variant set.
    fn pick_payloads(&self, limit: usize, aggressive: bool) -> Vec<String> {
        let variants = if aggressive {
            &self.payload_variants
        } else {
            &self.baseline_payloads
        };
        if variants.is_empty() {
            return vec![self.reflection.sentinel().to_string()];
        }
        let count = if limit == 0 || limit > variants.len() {
            variants.len()
        } else {
            limit
        };
        let mut indexes: Vec<usize> = (0..variants.len()).collect();
        {
            use rand::seq::SliceRandom;
            indexes.shuffle(&mut rand::thread_rng());
        }
        indexes
            .into_iter()
            .take(count)
            .map(|idx| variants[idx].render(self.reflection.sentinel()))
            .collect()
    }

    async fn maybe_throttle_mutations(&self, reflected: bool) {
        if reflected || self.cfg.baseline_fuzz_cap == 0 {
            return;
        }
        let wait: u64 = 50 + rand::thread_rng().gen_range(0..120);
        tokio::time::sleep(Duration::from_millis(wait)).await;
    }

    // ------------------------------------------------------------------
    // Response pipeline
    // ------------------------------------------------------------------

    async fn handle_response(
        &self,
        request: &OutboundRequest,
        ctx: &RequestContext,
        response: HttpResponse,
    ) {
        if self.stop.is_stopped() {
            return;
        }

        if !(100..400).contains(&response.status) {
            self.stats.increment_errors();
            debug!(
                "Error request: {} - Status code: {}",
                request.url, response.status
            );
            self.backoff.observe(response.status).await;
            self.emit_error_line(response.status, &request.url);
            return;
        }

        if ctx.reflected {
            self.handle_reflected_response(request, ctx, &response);
            self.backoff.observe(response.status).await;
            return;
        }
        if self.cfg.reflected {
            self.handle_baseline_reflection(request, ctx, &response);
        }

        let url_str = request.url.clone();
        let content_type = response.content_type();
        let html_like = is_likely_html(&content_type, &response.body);
        let js_like = is_likely_js(&content_type, &response.body);

        if html_like && !url_str.is_empty() {
            self.enqueue_hybrid(&url_str).await;
        }

        if self.cfg.dom_dedup && !url_str.is_empty() {
            if html_like {
                if let Some(deduper) = &self.dom_deduper {
                    let (skip, _) = deduper.should_skip(&self.domain, &response.body);
                    self.set_dom_skip(&url_str, skip);
                    if skip {
                        debug!(
                            "dom-dedup skip {} (threshold={})",
                            url_str, self.cfg.dom_dedup_threshold
                        );
                    }
                }
            } else {
                self.set_dom_skip(&url_str, false);
            }
        }

        let duplicate_content =
            self.registry
                .mark_response(&request.method, &request.url, &response.body);

        self.backoff.observe(response.status).await;

        let resp_str = decode_chars(&response.body);

        if (html_like || js_like) && !url_str.is_empty() && !self.should_skip_dom(&url_str) {
            let source_label = if js_like && !html_like {
                "javascript"
            } else {
                "html"
            };
            self.emit_dom_findings(&url_str, &resp_str, source_label);
        }

        if self.cfg.linkfinder && js_like {
            self.run_linkfinder(request, ctx, &resp_str).await;
        }

        let suppressed_by_length = !self.cfg.filter_length.is_empty()
            && self.cfg.filter_length.contains(&resp_str.len());
        if !suppressed_by_length && !duplicate_content {
            self.emit_url_line(response.status, &resp_str, &url_str);

            if let Ok(parsed) = Url::parse(&url_str) {
                if in_scope(&parsed, self.scope.url_filters()) {
                    self.find_subdomains(&resp_str);
                    self.find_aws_s3(&resp_str);
                }
            }

            if self.cfg.raw {
                let raw_block = format!("[Raw] - \n{}\n", resp_str);
                if !self.cfg.quiet {
                    println!("{}", raw_block);
                }
                if let Some(output) = &self.output {
                    output.write_line(&raw_block);
                }
            }
        }

        if html_like && !self.should_skip_dom(&url_str) {
            self.process_html(&url_str, &resp_str, ctx.depth).await;
        }
    }

    async fn handle_transport_error(&self, url: &str, err: &anyhow::Error) {
        self.stats.increment_errors();
        debug!("Error request: {} - {}", url, err);
        self.backoff.observe(0).await;
    }

    /// 4xx statuses (except 404/429) still emit URL findings; 5xx and
    /// sub-100 codes stay silent.
    fn emit_error_line(&self, status: u16, url: &str) {
        if status == 404 || status == 429 || status < 100 || status >= 500 {
            return;
        }
        self.emit_url_line(status, "", url);
    }

    /// Parses an HTML body and processes hrefs, srcs, forms and upload
    /// inputs. Extraction is synchronous; scheduling happens after the
    /// document is dropped.
    async fn process_html(&self, page_url: &str, body: &str, depth: usize) {
        let page_base = Url::parse(page_url).ok();

        struct Extracted {
            hrefs: Vec<String>,
            srcs: Vec<String>,
            form_requests: Vec<SyntheticRequest>,
            has_form: bool,
            has_upload: bool,
        }

        let extracted = {
            let document = Html::parse_document(body);
            let href_selector = Selector::parse("[href]").unwrap();
            let src_selector = Selector::parse("[src]").unwrap();
            let form_selector = Selector::parse("form").unwrap();
            let upload_selector = Selector::parse(r#"input[type="file"]"#).unwrap();

            let hrefs: Vec<String> = document
                .select(&href_selector)
                .filter_map(|e| e.value().attr("href"))
                .map(|s| s.to_string())
                .collect();
            let srcs: Vec<String> = document
                .select(&src_selector)
                .filter_map(|e| e.value().attr("src"))
                .map(|s| s.to_string())
                .collect();

            let mut form_requests = Vec::new();
            let mut has_form = false;
            for form in document.select(&form_selector) {
                has_form = true;
                form_requests.extend(forms::extract_form_requests(&form, page_base.as_ref()));
            }
            let has_upload = document.select(&upload_selector).next().is_some();

            Extracted {
                hrefs,
                srcs,
                form_requests,
                has_form,
                has_upload,
            }
        };

        for href in &extracted.hrefs {
            self.process_url(href, "body", "href", page_base.as_ref(), depth + 1)
                .await;
        }

        for src in &extracted.srcs {
            let ext = ext_type(src);
            if ext == ".js" || ext == ".xml" || ext == ".json" {
                let js_url = normalize_url(page_base.as_ref(), src)
                    .or_else(|| normalize_url(Some(&self.site), src));
                if let Some(js_url) = js_url {
                    self.feed_linkfinder(&js_url, "javascript", "body").await;
                }
            } else {
                self.process_url(src, "body", "src", page_base.as_ref(), depth + 1)
                    .await;
            }
        }

        if extracted.has_form && !self.form_set.duplicate(page_url) {
            self.stats.increment_urls_found();
            self.log_found(page_url, "body", "form");
        }
        if extracted.has_upload && !self.upload_set.duplicate(page_url) {
            self.log_found(page_url, "body", "upload-form");
        }

        self.stats.add_urls_found(extracted.form_requests.len());
        for mut req in extracted.form_requests {
            req.source = page_url.to_string();
            self.process_generated_request(req, page_url, depth).await;
        }
    }

    async fn run_linkfinder(&self, request: &OutboundRequest, ctx: &RequestContext, body: &str) {
        let response_url = Url::parse(&request.url).ok();
        let (paths, js_requests) = linkfinder::link_finder(body, response_url.as_ref());

        self.stats.add_urls_found(paths.len());
        self.stats.add_urls_found(js_requests.len());

        for rel_path in paths {
            let rebuilt = normalize_url(response_url.as_ref(), &rel_path)
                .or_else(|| normalize_url(Some(&self.site), &rel_path));
            let Some(rebuilt) = rebuilt else {
                continue;
            };

            let ext = ext_type(&rebuilt);
            if ext == ".js" || ext == ".xml" || ext == ".json" || ext == ".map" {
                self.feed_linkfinder(&rebuilt, "linkfinder", &request.url).await;
            } else if self.registry.duplicate_url(&rebuilt) {
                continue;
            } else {
                self.stats.increment_urls_found();
                self.log_found(&rebuilt, &request.url, "linkfinder");
                self.visit(&rebuilt, ctx.depth + 1).await;
            }
        }

        for req in js_requests {
            self.process_generated_request(req, &request.url, ctx.depth)
                .await;
        }
    }

    // ------------------------------------------------------------------
    // Reflection handling
    // ------------------------------------------------------------------

    fn handle_baseline_reflection(
        &self,
        request: &OutboundRequest,
        ctx: &RequestContext,
        response: &HttpResponse,
    ) {
        if ctx.request_key.is_empty() {
            return;
        }
        let observed = ObservedResponse {
            body: &response.body,
            status: response.status,
            url: &request.url,
            method: &request.method,
            origin: &ctx.origin,
            param: &ctx.param,
            payload: &ctx.payload,
        };
        if let Some(finding) = self.reflection.observe_baseline(&ctx.request_key, &observed) {
            self.output_reflection(&finding);
        }
    }

    fn handle_reflected_response(
        &self,
        request: &OutboundRequest,
        ctx: &RequestContext,
        response: &HttpResponse,
    ) {
        if ctx.request_key.is_empty() {
            return;
        }
        let observed = ObservedResponse {
            body: &response.body,
            status: response.status,
            url: &request.url,
            method: &request.method,
            origin: &ctx.origin,
            param: &ctx.param,
            payload: &ctx.payload,
        };
        if let Some(finding) = self.reflection.observe_mutated(&ctx.request_key, &observed) {
            self.output_reflection(&finding);
        }
    }

    // ------------------------------------------------------------------
    // Hybrid explorer
    // ------------------------------------------------------------------

    async fn enqueue_hybrid(&self, raw: &str) {
        let Some(hybrid) = &self.hybrid else {
            return;
        };
        if !hybrid.active.load(Ordering::SeqCst) || self.stop.is_stopped() {
            return;
        }
        if hybrid.enqueued.load(Ordering::SeqCst) >= hybrid.visit_cap {
            return;
        }
        let raw = raw.trim();
        if raw.is_empty() || hybrid.visited.duplicate(raw) {
            return;
        }
        match hybrid.tx.try_send(raw.to_string()) {
            Ok(()) => {
                hybrid.enqueued.fetch_add(1, Ordering::SeqCst);
                hybrid.in_flight.fetch_add(1, Ordering::SeqCst);
            }
            Err(_) => {
                debug!("hybrid queue saturated, dropping {}", raw);
            }
        }
    }

    async fn hybrid_worker(
        crawler: Arc<Crawler>,
        rx: Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>,
    ) {
        let Some(hybrid) = &crawler.hybrid else {
            return;
        };
        loop {
            if crawler.stop.is_stopped() || hybrid.stop.is_stopped() {
                return;
            }
            let url = {
                let mut guard = rx.lock().await;
                tokio::select! {
                    _ = hybrid.stop.cancelled() => return,
                    _ = crawler.stop.cancelled() => return,
                    received = guard.recv() => match received {
                        Some(url) => url,
                        None => return,
                    },
                }
            };
            if url.is_empty() || !hybrid.active.load(Ordering::SeqCst) {
                hybrid.in_flight.fetch_sub(1, Ordering::SeqCst);
                continue;
            }

            crawler.stats.increment_requests_made();
            let result = hybrid
                .pool
                .navigate_and_analyze(&url, Arc::clone(&hybrid.graph))
                .await;
            match result {
                Ok(analysis) => crawler.handle_hybrid_result(&analysis).await,
                Err(err) => {
                    debug!("hybrid analyze failed for {}: {}", url, err);
                    crawler.stats.increment_errors();
                }
            }
            hybrid.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    async fn handle_hybrid_result(&self, result: &PageAnalysisResult) {
        let Some(hybrid) = &self.hybrid else {
            return;
        };

        self.stats.increment_urls_found();
        hybrid.graph.mark_analyzed(&result.state_hash);

        if !result.api_calls.is_empty() {
            self.stats.add_urls_found(result.api_calls.len());
            self.emit_hybrid_api_calls(&result.url, &result.api_calls);
        }

        self.stats.add_urls_found(result.transitions.len());
        for transition in &result.transitions {
            self.process_hybrid_transition(&result.url, transition).await;
        }
    }

    async fn process_hybrid_transition(&self, origin: &str, transition: &StateTransition) {
        let action = transition.action_type.trim().to_lowercase();
        let target = match action.as_str() {
            "navigate" => transition.details.get("targetUrl").cloned(),
            "form" => transition
                .details
                .get("targetUrl")
                .or_else(|| transition.details.get("action"))
                .cloned(),
            _ => None,
        };
        let Some(target) = target else {
            return;
        };
        self.schedule_hybrid_visit(origin, &target).await;
    }

    async fn schedule_hybrid_visit(&self, origin: &str, candidate: &str) {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return;
        }
        let base = Url::parse(origin).ok();
        let normalized = normalize_url(base.as_ref(), candidate)
            .or_else(|| normalize_url(Some(&self.site), candidate));
        let Some(normalized) = normalized else {
            return;
        };

        if !self.registry.duplicate_url(&normalized) {
            self.visit(&normalized, 1).await;
        }
        self.enqueue_hybrid(&normalized).await;
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    async fn seed_sitemap(&self) {
        let sitemap_url = sitemap::sitemap_url(&self.site);
        self.seed_sitemap_at(&sitemap_url, 0).await;
    }

    /// Fetches a sitemap and seeds its `<loc>` entries; nested sitemap
    /// indexes are followed up to two levels via a worklist.
    async fn seed_sitemap_at(&self, url: &str, nesting: usize) {
        let mut worklist: Vec<(String, usize)> = vec![(url.to_string(), nesting)];
        while let Some((url, nesting)) = worklist.pop() {
            if nesting > 2 || self.stop.is_stopped() {
                continue;
            }
            let request = OutboundRequest {
                method: "GET".to_string(),
                url: url.clone(),
                ..Default::default()
            };
            let Ok(response) = self.client.send(&request).await else {
                continue;
            };
            if response.status != 200 {
                continue;
            }
            let locs = sitemap::parse_sitemap_locs(&response.body);
            if !locs.is_empty() {
                info!("Found {} URLs from {}", locs.len(), url);
            }
            for loc in locs {
                if ext_type(&loc) == ".xml" {
                    worklist.push((loc, nesting + 1));
                } else {
                    self.process_url(&loc, &url, "sitemap", None, 1).await;
                }
            }
        }
    }

    async fn seed_robots(&self) {
        let robots_url = sitemap::robots_url(&self.site);
        let request = OutboundRequest {
            method: "GET".to_string(),
            url: robots_url.clone(),
            ..Default::default()
        };
        let Ok(response) = self.client.send(&request).await else {
            return;
        };
        if response.status != 200 {
            return;
        }
        let (paths, sitemaps) = sitemap::parse_robots_paths(&self.site, &response.body);
        for path in paths {
            self.process_url(&path, &robots_url, "robots", None, 1).await;
        }
        for sitemap_url in sitemaps {
            self.seed_sitemap_at(&sitemap_url, 1).await;
        }
    }

    async fn seed_other_sources(&self) {
        let urls = subdomains::other_sources(&self.domain, self.cfg.include_subs).await;
        self.stats.add_urls_found(urls.len());
        for url in urls {
            if self.stop.is_stopped() {
                return;
            }
            if self.cfg.include_other_source {
                self.log_found(&url, "other-source", "other-sources");
            }
            if let Some(normalized) = normalize_url(None, &url) {
                if !self.registry.duplicate_url(&normalized) {
                    self.visit(&normalized, 1).await;
                }
            }
        }
    }

    async fn bootstrap_subdomains(&self) {
        let seeds = subdomains::fetch_subdomains(&self.domain).await;
        for sub in seeds {
            if sub.is_empty() || self.sub_set.duplicate(&sub) {
                continue;
            }
            self.stats.increment_urls_found();
            self.emit_subdomain(&sub, "crt.sh");
            for scheme in ["https", "http"] {
                let seed_url = format!("{}://{}", scheme, sub);
                if self.registry.duplicate_url(&seed_url) {
                    continue;
                }
                self.visit(&seed_url, 1).await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Body miners
    // ------------------------------------------------------------------

    fn find_subdomains(&self, body: &str) {
        if !self.cfg.subs {
            return;
        }
        for sub in subdomains::get_subdomains(body, &self.domain) {
            if self.sub_set.duplicate(&sub) {
                continue;
            }
            self.stats.increment_urls_found();
            self.emit_subdomain(&sub, "body");
        }
    }

    fn find_aws_s3(&self, body: &str) {
        for bucket in subdomains::get_aws_s3(body) {
            if self.aws_set.duplicate(&bucket) {
                continue;
            }
            self.stats.increment_urls_found();
            let line = format!("[aws-s3] - {}", bucket);
            let rendered = if self.cfg.json_output {
                self.json_line("body", "aws", &bucket, 0, 0)
            } else {
                line
            };
            println!("{}", rendered);
            if let Some(output) = &self.output {
                output.write_line(&rendered);
            }
        }
    }

    // ------------------------------------------------------------------
    // DOM helpers
    // ------------------------------------------------------------------

    fn should_skip_dom(&self, url: &str) -> bool {
        if !self.cfg.dom_dedup {
            return false;
        }
        self.dom_skip
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(url)
    }

    fn set_dom_skip(&self, url: &str, skip: bool) {
        if !self.cfg.dom_dedup {
            return;
        }
        let mut guard = self.dom_skip.write().unwrap_or_else(|e| e.into_inner());
        if skip {
            guard.insert(url.to_string());
        } else {
            guard.remove(url);
        }
    }

    fn emit_dom_findings(&self, url: &str, body: &str, source_label: &str) {
        let findings = self.dom_analyzer.analyze(url, body, source_label);
        for finding in findings {
            let rendered = if self.cfg.json_output {
                SpiderOutput {
                    input: self.input.clone(),
                    source: finding.source.clone(),
                    output_type: "dom-sink".to_string(),
                    output: url.to_string(),
                    param: finding.sink.clone(),
                    payload: finding.snippet.clone(),
                    confidence: finding.confidence.to_string(),
                    snippet: finding.snippet.clone(),
                    ..Default::default()
                }
                .to_json_line()
                .unwrap_or_default()
            } else if self.cfg.quiet {
                format!("{} {}", url, finding.sink)
            } else {
                let mut line = format!(
                    "[dom-sink] - [{}] {} -> {}",
                    finding.confidence, finding.source, finding.sink
                );
                if !finding.snippet.is_empty() {
                    line = format!("{} :: {}", line, finding.snippet);
                }
                line
            };
            println!("{}", rendered);
            if let Some(output) = &self.output {
                output.write_line(&rendered);
            }
        }
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    fn json_line(&self, source: &str, output_type: &str, output: &str, status: u16, length: usize) -> String {
        SpiderOutput {
            input: self.input.clone(),
            source: source.to_string(),
            output_type: output_type.to_string(),
            output: output.to_string(),
            status,
            length,
            ..Default::default()
        }
        .to_json_line()
        .unwrap_or_default()
    }

    fn log_found(&self, url: &str, source: &str, output_type: &str) {
        let rendered = if self.cfg.json_output {
            self.json_line(source, output_type, url, 0, 0)
        } else if self.cfg.quiet {
            url.to_string()
        } else {
            format!("[{}] - {}", output_type, url)
        };
        println!("{}", rendered);
        if let Some(output) = &self.output {
            output.write_line(&rendered);
        }
    }

    fn emit_url_line(&self, status: u16, body: &str, url: &str) {
        let display = normalize_display_url(url);
        let rendered = if self.cfg.json_output {
            SpiderOutput {
                input: self.input.clone(),
                source: "body".to_string(),
                output_type: "url".to_string(),
                output: display.clone(),
                status,
                length: body.lines().count(),
                ..Default::default()
            }
            .to_json_line()
            .unwrap_or_default()
        } else if self.cfg.quiet {
            display.clone()
        } else if self.cfg.length {
            format!("[url] - [code-{}] - [len_{}] - {}", status, body.len(), display)
        } else {
            format!("[url] - [code-{}] - {}", status, display)
        };
        println!("{}", rendered);
        if let Some(output) = &self.output {
            output.write_line(&rendered);
        }
    }

    fn emit_subdomain(&self, sub: &str, source: &str) {
        if self.cfg.json_output {
            let line = self.json_line(source, "subdomain", sub, 0, 0);
            println!("{}", line);
            if let Some(output) = &self.output {
                output.write_line(&line);
            }
            return;
        }
        if self.cfg.quiet {
            println!("{}", sub);
            if let Some(output) = &self.output {
                output.write_line(sub);
            }
            return;
        }
        for scheme in ["http", "https"] {
            let line = format!("[subdomains] - {}://{}", scheme, sub);
            println!("{}", line);
            if let Some(output) = &self.output {
                output.write_line(&line);
            }
        }
    }

    /// Logs a generated request once per display key; returns false when
    /// the request itself is a duplicate and must not be scheduled.
    fn emit_js_request(&self, req: &SyntheticRequest, origin: &str) -> bool {
        let key = build_request_key(req);
        if self.js_request_set.duplicate(&key) {
            return false;
        }

        let method = req.method_or_get().to_uppercase();
        let source = if req.source.trim().is_empty() {
            origin
        } else {
            req.source.trim()
        };

        let display_key = format!("{} {}", method, req.raw_url.trim());
        let should_log = !self.js_request_log_set.duplicate(&display_key);

        if should_log {
            let rendered = if self.cfg.json_output {
                SpiderOutput {
                    input: self.input.clone(),
                    source: source.to_string(),
                    output_type: "js-request".to_string(),
                    output: display_key.clone(),
                    length: req.body.len(),
                    ..Default::default()
                }
                .to_json_line()
                .unwrap_or_default()
            } else if self.cfg.quiet {
                display_key.clone()
            } else {
                format!("[js-request] - [{}] {}", method, req.raw_url)
            };
            println!("{}", rendered);
            if let Some(output) = &self.output {
                output.write_line(&rendered);
            }
        }

        true
    }

    fn emit_hybrid_api_calls(&self, origin: &str, calls: &[String]) {
        let Some(hybrid) = &self.hybrid else {
            return;
        };
        for call in calls {
            let call = call.trim();
            if call.is_empty() || hybrid.api_set.duplicate(call) {
                continue;
            }
            let rendered = if self.cfg.json_output {
                self.json_line(origin, "hybrid-api", call, 0, 0)
            } else {
                format!("[hybrid][api] - {}", call)
            };
            println!("{}", rendered);
            if let Some(output) = &self.output {
                output.write_line(&rendered);
            }
        }
    }

    fn output_reflection(&self, finding: &ReflectionFinding) {
        let method = finding.method.to_uppercase();
        let param = if finding.param.is_empty() {
            REFLECTED_PARAM_NAME
        } else {
            &finding.param
        };
        let payload = if finding.payload.is_empty() {
            self.reflection.sentinel()
        } else {
            &finding.payload
        };
        let reason = finding.reasons.join(",");
        let plain = format!(
            "{} {} param:{} payload:{} ({})",
            method, finding.url, param, payload, reason
        );

        let rendered = if self.cfg.json_output {
            SpiderOutput {
                input: self.input.clone(),
                source: finding.origin.clone(),
                output_type: "reflected".to_string(),
                output: finding.url.clone(),
                status: finding.status,
                length: finding.length,
                param: param.to_string(),
                payload: payload.to_string(),
                ..Default::default()
            }
            .to_json_line()
            .unwrap_or_default()
        } else if self.cfg.quiet {
            finding.url.clone()
        } else {
            format!("[reflected] - {}", plain)
        };

        println!("{}", rendered);
        if let Some(output) = &self.output {
            output.write_line(&rendered);
        }
        if let Some(writer) = &self.reflected_writer {
            writer.write_line(&plain);
        }
    }
}

#[derive(Copy, Clone)]
enum CollectorKind {
    Main,
    LinkFinder,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_crawler(cfg: CrawlerConfig) -> Arc<Crawler> {
        let site = Url::parse("https://target.example/").unwrap();
        Crawler::new(site, cfg, Arc::new(CrawlStats::new()), StopSignal::new()).unwrap()
    }

    #[tokio::test]
    async fn process_url_dedupes_across_normalized_forms() {
        let crawler = test_crawler(CrawlerConfig::default());
        let first = crawler
            .process_url("https://TARGET.example:443/a?b=2&a=1#x", "body", "href", None, 1)
            .await;
        assert!(first.is_some());
        let second = crawler
            .process_url("https://target.example/a/?a=1&b=2", "body", "href", None, 1)
            .await;
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn out_of_scope_urls_are_not_queued() {
        let crawler = test_crawler(CrawlerConfig::default());
        crawler.visit("https://elsewhere.example/x", 1).await;
        assert_eq!(crawler.queue.pending(), 0);
        crawler.visit("https://target.example/x", 1).await;
        assert_eq!(crawler.queue.pending(), 1);
    }

    #[tokio::test]
    async fn depth_limit_gates_visits() {
        let mut cfg = CrawlerConfig::default();
        cfg.max_depth = 2;
        let crawler = test_crawler(cfg);
        crawler.visit("https://target.example/a", 2).await;
        assert_eq!(crawler.queue.pending(), 1);
        crawler.visit("https://target.example/b", 3).await;
        assert_eq!(crawler.queue.pending(), 1);
    }

    #[tokio::test]
    async fn generated_requests_schedule_baseline_and_mutations() {
        let mut cfg = CrawlerConfig::default();
        cfg.max_depth = 0;
        cfg.baseline_fuzz_cap = 1;
        let crawler = test_crawler(cfg);
        let req = SyntheticRequest::new("GET", "https://target.example/api?q=1");
        crawler
            .process_generated_request(req, "https://target.example/", 1)
            .await;
        // Baseline plus one mutation.
        assert_eq!(crawler.queue.pending(), 2);
    }

    #[tokio::test]
    async fn duplicate_generated_requests_are_dropped() {
        let mut cfg = CrawlerConfig::default();
        cfg.max_depth = 0;
        cfg.baseline_fuzz_cap = 0;
        let crawler = test_crawler(cfg);
        let req = SyntheticRequest::new("GET", "https://target.example/api");
        crawler
            .process_generated_request(req.clone(), "https://target.example/", 1)
            .await;
        crawler
            .process_generated_request(req, "https://target.example/", 1)
            .await;
        assert_eq!(crawler.queue.pending(), 1);
    }

    #[tokio::test]
    async fn html_processing_extracts_links_and_forms() {
        let mut cfg = CrawlerConfig::default();
        cfg.max_depth = 0;
        cfg.baseline_fuzz_cap = 0;
        let crawler = test_crawler(cfg);
        let html = r#"<html><body>
            <a href="/page2">two</a>
            <img src="/assets/app.js">
            <form action="/login" method="POST"><input name="user"></form>
        </body></html>"#;
        crawler
            .process_html("https://target.example/", html, 1)
            .await;
        // /page2 visit + form variants on the main queue; app.js on the
        // linkfinder queue.
        assert!(crawler.queue.pending() >= 2);
        assert_eq!(crawler.js_queue.pending(), 1);
    }

    #[tokio::test]
    async fn reflection_pipeline_emits_once_for_sentinel_echo() {
        let mut cfg = CrawlerConfig::default();
        cfg.reflected = true;
        let crawler = test_crawler(cfg);

        let req = OutboundRequest {
            method: "GET".to_string(),
            url: "https://target.example/?q=hello".to_string(),
            ..Default::default()
        };
        let baseline_ctx = RequestContext {
            depth: 1,
            origin: "https://target.example/".to_string(),
            request_key: "GET https://target.example/?q=hello".to_string(),
            ..Default::default()
        };
        let baseline_resp = HttpResponse {
            status: 200,
            body: "<p>hello</p>".to_string(),
            headers: Default::default(),
            final_url: req.url.clone(),
        };
        crawler.handle_baseline_reflection(&req, &baseline_ctx, &baseline_resp);

        let mutated_ctx = RequestContext {
            reflected: true,
            payload: DEFAULT_REFLECTED_PAYLOAD.to_string(),
            param: "q".to_string(),
            request_key: baseline_ctx.request_key.clone(),
            ..baseline_ctx.clone()
        };
        let mutated_resp = HttpResponse {
            status: 200,
            body: "__gospider_reflected__".to_string(),
            headers: Default::default(),
            final_url: req.url.clone(),
        };
        crawler.handle_reflected_response(&req, &mutated_ctx, &mutated_resp);

        // Second arrival of the same mutated response must not emit again;
        // observe_mutated returns None once emitted.
        let observed = ObservedResponse {
            body: &mutated_resp.body,
            status: 200,
            url: &req.url,
            method: "GET",
            origin: "https://target.example/",
            param: "q",
            payload: DEFAULT_REFLECTED_PAYLOAD,
        };
        assert!(crawler
            .reflection
            .observe_mutated(&baseline_ctx.request_key, &observed)
            .is_none());
    }

    #[test]
    fn dom_skip_map_round_trips() {
        let mut cfg = CrawlerConfig::default();
        cfg.dom_dedup = true;
        let crawler = test_crawler(cfg);
        assert!(!crawler.should_skip_dom("https://target.example/a"));
        crawler.set_dom_skip("https://target.example/a", true);
        assert!(crawler.should_skip_dom("https://target.example/a"));
        crawler.set_dom_skip("https://target.example/a", false);
        assert!(!crawler.should_skip_dom("https://target.example/a"));
    }

    #[test]
    fn error_lines_respect_status_policy() {
        let crawler = test_crawler(CrawlerConfig::default());
        // Only checks the gating logic; emission goes to stdout.
        crawler.emit_error_line(404, "https://target.example/x");
        crawler.emit_error_line(500, "https://target.example/x");
        crawler.emit_error_line(401, "https://target.example/x");
    }
}
