// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Verkko - Crawl flow tests
 * End-to-end crawls against a local mock server: link following, form
 * synthesis, request dedup across normalised URL forms.
 */
use std::sync::Arc;

use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use verkko::collector::StopSignal;
use verkko::config::CrawlerConfig;
use verkko::crawler::Crawler;
use verkko::stats::CrawlStats;

fn quiet_config() -> CrawlerConfig {
    CrawlerConfig {
        quiet: true,
        robots: false,
        max_depth: 0,
        baseline_fuzz_cap: 0,
        ..Default::default()
    }
}

async fn run_crawler(cfg: CrawlerConfig, site: &str) -> Arc<Crawler> {
    let site = Url::parse(site).unwrap();
    let crawler = Crawler::new(site, cfg, Arc::new(CrawlStats::new()), StopSignal::new()).unwrap();
    Arc::clone(&crawler).run().await;
    crawler
}

#[tokio::test]
async fn crawl_follows_links_and_synthesises_form_requests() {
    let server = MockServer::start().await;

    let root_html = r#"<!DOCTYPE html>
        <html><body>
            <a href="/page2">second page</a>
            <form action="/login" method="POST">
                <input type="text" name="user">
                <input type="password" name="pass">
                <button type="submit">Go</button>
            </form>
        </body></html>"#;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(root_html).insert_header("Content-Type", "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>leaf</body></html>")
                .insert_header("Content-Type", "text/html"),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let cfg = quiet_config();
    let registry = Arc::clone(&cfg.registry);
    run_crawler(cfg, &server.uri()).await;

    // The leaf page was visited and registered.
    assert!(registry.duplicate_url(&format!("{}/page2", server.uri())));

    // The form produced the POST variant family: urlencoded, JSON,
    // multipart, fuzz-marker and empty-body.
    let requests = server.received_requests().await.unwrap();
    let posts: Vec<_> = requests
        .iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path() == "/login")
        .collect();
    assert!(posts.len() >= 5, "expected >= 5 POST variants, got {}", posts.len());

    let bodies: Vec<String> = posts
        .iter()
        .map(|r| String::from_utf8_lossy(&r.body).to_string())
        .collect();
    assert!(bodies.iter().any(|b| b.contains("user=gospider") && b.contains("pass=G0sp%21der")));
    assert!(bodies.iter().any(|b| b.contains("\"user\":\"gospider\"")));
    assert!(bodies.iter().any(|b| b.contains("user=FUZZ_user")));
    assert!(bodies.iter().any(|b| b.is_empty()));

    let multipart = posts.iter().find(|r| {
        r.headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("multipart/form-data; boundary=gospider-"))
            .unwrap_or(false)
    });
    assert!(multipart.is_some(), "multipart variant missing");
}

#[tokio::test]
async fn duplicate_requests_are_suppressed_across_normalised_forms() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>same</body></html>")
                .insert_header("Content-Type", "text/html"),
        )
        .mount(&server)
        .await;

    let cfg = quiet_config();
    let registry = Arc::clone(&cfg.registry);

    // First canonical form registers; the re-ordered variant collides.
    assert!(!registry.duplicate_request("GET", &format!("{}/a?b=2&a=1#frag", server.uri()), ""));
    assert!(registry.duplicate_request("GET", &format!("{}/a/?a=1&b=2", server.uri()), ""));

    run_crawler(cfg, &server.uri()).await;
}

#[tokio::test]
async fn js_files_feed_the_linkfinder_collector() {
    let server = MockServer::start().await;

    let root_html = r#"<html><body><script src="/static/app.js"></script></body></html>"#;
    let js_body = r#"function boot() {
        fetch("/api/status");
        const legacy = "/api/v1/users";
    }"#;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(root_html)
                .insert_header("Content-Type", "text/html"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/static/app.js"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(js_body)
                .insert_header("Content-Type", "application/javascript"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let cfg = quiet_config();
    let registry = Arc::clone(&cfg.registry);
    run_crawler(cfg, &server.uri()).await;

    // The fetch() call became a real request, and the quoted endpoint was
    // visited through the linkfinder path.
    assert!(registry.duplicate_url(&format!("{}/api/status", server.uri())));
    assert!(registry.duplicate_url(&format!("{}/api/v1/users", server.uri())));
}

#[tokio::test]
async fn status_404_responses_never_emit_but_count() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<html><body><a href="/missing">x</a></body></html>"#)
                .insert_header("Content-Type", "text/html"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
        .mount(&server)
        .await;

    let site = Url::parse(&server.uri()).unwrap();
    let stats = Arc::new(CrawlStats::new());
    let crawler = Crawler::new(site, quiet_config(), Arc::clone(&stats), StopSignal::new()).unwrap();
    Arc::clone(&crawler).run().await;

    assert!(stats.errors() >= 1);
}
