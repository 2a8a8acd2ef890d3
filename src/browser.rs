// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Verkko - Hybrid Browser Pool
 * Fixed pool of headless Chrome tabs used by the state-aware explorer:
 * navigate, stabilise, capture XHR/fetch traffic, fingerprint the DOM and
 * extract actionable transitions.
 */
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use headless_chrome::browser::tab::RequestPausedDecision;
use headless_chrome::protocol::cdp::Fetch::{events::RequestPausedEvent, RequestPattern, RequestStage};
use headless_chrome::protocol::cdp::Network::ResourceType;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state_graph::{ApplicationStateGraph, StateTransition};

#[derive(Debug, Clone)]
pub struct BrowserPoolConfig {
    pub pool_size: usize,
    pub navigation_timeout: Duration,
    pub stabilization_delay: Duration,
    pub headless: bool,
    /// Paths of user-supplied JS files injected into every page.
    pub init_scripts: Vec<String>,
}

impl Default for BrowserPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            navigation_timeout: Duration::from_secs(12),
            stabilization_delay: Duration::from_millis(600),
            headless: true,
            init_scripts: Vec::new(),
        }
    }
}

/// Outcome of one navigate-and-analyse pass.
#[derive(Debug, Clone)]
pub struct PageAnalysisResult {
    pub url: String,
    pub state_hash: String,
    pub signature: u64,
    pub digest: String,
    pub is_new_state: bool,
    pub api_calls: Vec<String>,
    pub transitions: Vec<StateTransition>,
}

pub struct BrowserPool {
    cfg: BrowserPoolConfig,
    // Kept alive for the tabs' lifetime; dropped on shutdown.
    browser: Mutex<Option<Browser>>,
    tab_rx: tokio::sync::Mutex<mpsc::Receiver<Arc<Tab>>>,
    tab_tx: mpsc::Sender<Arc<Tab>>,
    init_script_bodies: Vec<String>,
}

impl BrowserPool {
    /// Launches one browser and opens `pool_size` tabs. A launch failure
    /// is returned to the caller, which disables hybrid crawling.
    pub fn initialize(cfg: BrowserPoolConfig) -> Result<Self> {
        let mut init_script_bodies = Vec::new();
        for path in &cfg.init_scripts {
            let path = path.trim();
            if path.is_empty() {
                continue;
            }
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("read init script {}", path))?;
            init_script_bodies.push(content);
        }

        let options = LaunchOptions::default_builder()
            .headless(cfg.headless)
            .idle_browser_timeout(Duration::from_secs(600))
            .sandbox(false)
            .build()
            .map_err(|e| anyhow::anyhow!("browser launch options: {}", e))?;

        // Binary resolution: $CHROME override, then PATH discovery, both
        // handled by the launcher.
        let browser = Browser::new(options).context("failed to launch Chrome/Chromium")?;

        let pool_size = cfg.pool_size.max(1);
        let (tab_tx, tab_rx) = mpsc::channel(pool_size);
        let mut tabs = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let tab = browser.new_tab().context("failed to create tab")?;
            tab.set_default_timeout(cfg.navigation_timeout);
            tabs.push(tab);
        }
        for tab in tabs {
            tab_tx
                .try_send(tab)
                .map_err(|_| anyhow::anyhow!("failed to seed tab pool"))?;
        }

        info!(
            "Hybrid browser pool ready (tabs={}, headless={})",
            pool_size, cfg.headless
        );

        Ok(Self {
            cfg,
            browser: Mutex::new(Some(browser)),
            tab_rx: tokio::sync::Mutex::new(tab_rx),
            tab_tx,
            init_script_bodies,
        })
    }

    async fn acquire_tab(&self) -> Option<Arc<Tab>> {
        let mut rx = self.tab_rx.lock().await;
        rx.recv().await
    }

    fn release_tab(&self, tab: Arc<Tab>) {
        let _ = tab.navigate_to("about:blank");
        if self.tab_tx.try_send(tab).is_err() {
            debug!("tab pool full on release, dropping tab");
        }
    }

    /// Navigates a URL, waits for load plus the stabilisation delay, then
    /// fingerprints the DOM and extracts transitions for new states.
    /// XHR/fetch request URLs observed during the navigation are returned
    /// in first-seen order.
    pub async fn navigate_and_analyze(
        &self,
        url: &str,
        graph: Arc<ApplicationStateGraph>,
    ) -> Result<PageAnalysisResult> {
        let tab = self
            .acquire_tab()
            .await
            .ok_or_else(|| anyhow::anyhow!("browser pool shut down"))?;

        let url_owned = url.to_string();
        let stabilization = self.cfg.stabilization_delay;
        let init_scripts = self.init_script_bodies.clone();
        let tab_for_task = Arc::clone(&tab);

        let analysis = tokio::task::spawn_blocking(move || {
            analyze_on_tab(&tab_for_task, &url_owned, stabilization, &init_scripts)
        })
        .await
        .context("hybrid navigation task panicked")?;

        self.release_tab(tab);

        let (html, api_calls) = analysis?;

        let (state_hash, signature, digest) = graph.calculate_dom_fingerprint(&html);
        let is_new = graph.add_state(&state_hash, url, signature, &digest);

        let mut transitions = Vec::new();
        if is_new {
            transitions = parse_transitions(&html, url);
            if !transitions.is_empty() {
                graph.register_transitions(&state_hash, transitions.clone());
            }
        }

        Ok(PageAnalysisResult {
            url: url.to_string(),
            state_hash,
            signature,
            digest,
            is_new_state: is_new,
            api_calls,
            transitions,
        })
    }

    /// Drops all tabs and the browser. Callers bound this with a grace
    /// timeout.
    pub fn shutdown(&self) {
        let mut browser = self.browser.lock().unwrap_or_else(|e| e.into_inner());
        if browser.take().is_some() {
            debug!("hybrid browser pool shut down");
        }
    }
}

/// Blocking per-tab work: interception, navigation, stabilisation, HTML
/// extraction.
fn analyze_on_tab(
    tab: &Arc<Tab>,
    url: &str,
    stabilization: Duration,
    init_scripts: &[String],
) -> Result<(String, Vec<String>)> {
    let captured: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let captured_clone = Arc::clone(&captured);

    let patterns = vec![RequestPattern {
        url_pattern: Some("*".to_string()),
        resource_Type: None,
        request_stage: Some(RequestStage::Request),
    }];
    tab.enable_fetch(Some(&patterns), None)
        .context("enable fetch interception")?;

    tab.enable_request_interception(Arc::new(
        move |_transport, _session_id, intercepted: RequestPausedEvent| {
            if matches!(
                intercepted.params.resource_Type,
                ResourceType::Xhr | ResourceType::Fetch
            ) {
                let request_url = intercepted.params.request.url.clone();
                if let Ok(mut captured) = captured_clone.lock() {
                    if !captured.iter().any(|u| u == &request_url) {
                        captured.push(request_url);
                    }
                }
            }
            RequestPausedDecision::Continue(None)
        },
    ))
    .context("register request interceptor")?;

    tab.navigate_to(url)
        .with_context(|| format!("navigate {}", url))?;
    if let Err(err) = tab.wait_until_navigated() {
        debug!("wait for load on {}: {}", url, err);
    }

    for script in init_scripts {
        if let Err(err) = tab.evaluate(script, false) {
            warn!("init script injection failed on {}: {}", url, err);
        }
    }

    if !stabilization.is_zero() {
        std::thread::sleep(stabilization);
    }

    let html = tab
        .get_content()
        .with_context(|| format!("get html {}", url))?;

    let api_calls = captured
        .lock()
        .map(|calls| calls.clone())
        .unwrap_or_default();

    Ok((html, api_calls))
}

/// Static transition extraction over the rendered HTML: anchors become
/// `navigate`, buttons `click`, forms `form`.
pub fn parse_transitions(html: &str, page_url: &str) -> Vec<StateTransition> {
    use scraper::{Html, Selector};

    let document = Html::parse_document(html);
    let mut transitions = Vec::new();

    let anchor_selector = Selector::parse("a[href]").unwrap();
    for (idx, anchor) in document.select(&anchor_selector).enumerate() {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if href.trim().is_empty() {
            continue;
        }
        transitions.push(StateTransition {
            action_type: "navigate".to_string(),
            details: HashMap::from([
                ("selector".to_string(), element_selector(&anchor, "a", idx)),
                ("targetUrl".to_string(), href.trim().to_string()),
            ]),
            ..Default::default()
        });
    }

    let button_selector = Selector::parse("button").unwrap();
    for (idx, button) in document.select(&button_selector).enumerate() {
        let text: String = button.text().collect::<String>().trim().chars().take(64).collect();
        transitions.push(StateTransition {
            action_type: "click".to_string(),
            details: HashMap::from([
                ("selector".to_string(), element_selector(&button, "button", idx)),
                ("text".to_string(), text),
            ]),
            ..Default::default()
        });
    }

    let form_selector = Selector::parse("form").unwrap();
    for (idx, form) in document.select(&form_selector).enumerate() {
        let action = form
            .value()
            .attr("action")
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .unwrap_or(page_url);
        let method = form
            .value()
            .attr("method")
            .unwrap_or("GET")
            .to_uppercase();
        transitions.push(StateTransition {
            action_type: "form".to_string(),
            details: HashMap::from([
                ("selector".to_string(), element_selector(&form, "form", idx)),
                ("targetUrl".to_string(), action.to_string()),
                ("method".to_string(), method),
            ]),
            ..Default::default()
        });
    }

    transitions
}

fn element_selector(element: &scraper::ElementRef, tag: &str, index: usize) -> String {
    if let Some(id) = element.value().attr("id") {
        if !id.trim().is_empty() {
            return format!("{}#{}", tag, id.trim());
        }
    }
    let classes: Vec<&str> = element
        .value()
        .attr("class")
        .map(|c| c.split_whitespace().take(2).collect())
        .unwrap_or_default();
    if classes.is_empty() {
        format!("{}:nth-of-type({})", tag, index + 1)
    } else {
        format!("{}.{}", tag, classes.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_cover_anchors_buttons_and_forms() {
        let html = r#"<html><body>
            <a href="/next">next</a>
            <button class="btn primary">Save all changes</button>
            <form action="/submit" method="post"><input name="a"></form>
            <form method="post"><input name="b"></form>
        </body></html>"#;
        let transitions = parse_transitions(html, "https://t/page");

        let navigate: Vec<_> = transitions.iter().filter(|t| t.action_type == "navigate").collect();
        assert_eq!(navigate.len(), 1);
        assert_eq!(navigate[0].details["targetUrl"], "/next");

        let click: Vec<_> = transitions.iter().filter(|t| t.action_type == "click").collect();
        assert_eq!(click.len(), 1);
        assert_eq!(click[0].details["text"], "Save all changes");
        assert!(click[0].details["selector"].starts_with("button.btn"));

        let forms: Vec<_> = transitions.iter().filter(|t| t.action_type == "form").collect();
        assert_eq!(forms.len(), 2);
        assert_eq!(forms[0].details["targetUrl"], "/submit");
        assert_eq!(forms[0].details["method"], "POST");
        // Formless action falls back to the page URL.
        assert_eq!(forms[1].details["targetUrl"], "https://t/page");
    }

    #[test]
    fn button_text_is_capped_at_64_chars() {
        let long = "x".repeat(100);
        let html = format!("<html><body><button>{}</button></body></html>", long);
        let transitions = parse_transitions(&html, "https://t/");
        let click = transitions.iter().find(|t| t.action_type == "click").unwrap();
        assert_eq!(click.details["text"].len(), 64);
    }
}
