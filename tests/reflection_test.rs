// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Verkko - Reflection detection flow test
 * A JS-synthesised request is probed with mutated variants against an
 * echoing endpoint; exactly one reflection finding must be recorded.
 */
use std::sync::Arc;

use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use verkko::collector::StopSignal;
use verkko::config::CrawlerConfig;
use verkko::crawler::Crawler;
use verkko::stats::CrawlStats;

/// Echoes the urlencoded `q` body parameter back into an HTML body.
struct EchoBody;

impl Respond for EchoBody {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let q = url::form_urlencoded::parse(&request.body)
            .find(|(k, _)| k == "q")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        ResponseTemplate::new(200)
            .set_body_string(format!("<p>{}</p>", q))
            .insert_header("Content-Type", "text/html")
    }
}

#[tokio::test]
async fn reflected_sentinel_produces_one_finding() {
    let server = MockServer::start().await;

    let root_html = r#"<html><body><script src="/app.js"></script></body></html>"#;
    let js_body = r#"fetch("/reflect", {method: "POST", body: "q=hello", headers: {"Content-Type": "application/x-www-form-urlencoded"}});"#;

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
        .and(path("/app.js"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(js_body)
                .insert_header("Content-Type", "application/javascript"),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/reflect"))
        .respond_with(EchoBody)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/reflect"))
        .respond_with(ResponseTemplate::new(200).set_body_string("static"))
        .mount(&server)
        .await;

    let reflected_path = std::env::temp_dir().join(format!(
        "verkko-reflected-{}.txt",
        std::process::id()
    ));
    std::fs::remove_file(&reflected_path).ok();

    let cfg = CrawlerConfig {
        quiet: true,
        robots: false,
        max_depth: 0,
        reflected: true,
        reflected_output: reflected_path.to_string_lossy().to_string(),
        ..Default::default()
    };

    let site = Url::parse(&server.uri()).unwrap();
    let crawler =
        Crawler::new(site, cfg, Arc::new(CrawlStats::new()), StopSignal::new()).unwrap();
    Arc::clone(&crawler).run().await;

    let findings = std::fs::read_to_string(&reflected_path).unwrap_or_default();
    std::fs::remove_file(&reflected_path).ok();

    let finding_lines: Vec<&str> = findings
        .lines()
        .filter(|l| l.contains("param:q"))
        .collect();
    assert_eq!(
        finding_lines.len(),
        1,
        "expected exactly one finding for param q, got: {:?}",
        findings
    );
    let line = finding_lines[0];
    assert!(line.starts_with("POST "));
    assert!(line.contains("payload:"));
    assert!(
        line.contains("payload-reflected")
            || line.contains("payload-sentinel")
            || line.contains("body-delta"),
        "missing evidence reasons: {}",
        line
    );
}
