// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Verkko - Attack-surface mapping web spider
 * CLI entry point: flag surface, logging setup, runtime bootstrap.
 */
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::Level;

use verkko::config::CrawlerConfig;
use verkko::engine::Engine;
use verkko::errors::SpiderError;

/// Fast attack-surface mapping web spider
#[derive(Parser)]
#[command(name = "verkko")]
#[command(author = "Bountyy Oy <info@bountyy.fi>")]
#[command(version = verkko::VERSION)]
#[command(about = "Fast attack-surface mapping web spider", long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Site to crawl
    #[arg(short = 's', long)]
    site: Option<String>,

    /// Site list to crawl
    #[arg(short = 'S', long)]
    sites: Option<String>,

    /// Proxy (Ex: http://127.0.0.1:8080)
    #[arg(short = 'p', long)]
    proxy: Option<String>,

    /// Output folder
    #[arg(short = 'o', long)]
    output: Option<String>,

    /// User Agent to use: web, mobi, or a literal value
    #[arg(short = 'u', long, default_value = "web")]
    user_agent: String,

    /// Cookie to use (testA=a; testB=b)
    #[arg(long)]
    cookie: Option<String>,

    /// Header to use (repeat the flag for multiple headers)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Load headers and cookie from a Burp raw HTTP request file
    #[arg(long)]
    burp: Option<String>,

    /// Blacklist URL regex
    #[arg(long)]
    blacklist: Option<String>,

    /// Whitelist URL regex
    #[arg(long)]
    whitelist: Option<String>,

    /// Whitelist domain
    #[arg(long)]
    whitelist_domain: Option<String>,

    /// Suppress URLs whose response length is in this comma-separated list
    #[arg(short = 'L', long)]
    filter_length: Option<String>,

    /// Enable the anti-detection client profile
    #[arg(long)]
    stealth: bool,

    /// Number of sites crawled in parallel
    #[arg(short = 't', long, default_value_t = 1)]
    threads: usize,

    /// Maximum concurrent requests per matching domain
    #[arg(short = 'c', long, default_value_t = 5)]
    concurrent: usize,

    /// Recursion depth for visited URLs (0 for infinite)
    #[arg(short = 'd', long, default_value_t = 1)]
    depth: usize,

    /// Delay between requests to a matching domain (seconds)
    #[arg(short = 'k', long, default_value_t = 0)]
    delay: u64,

    /// Extra randomized delay added before requests (seconds)
    #[arg(short = 'K', long, default_value_t = 0)]
    random_delay: u64,

    /// Request timeout (seconds)
    #[arg(short = 'm', long, default_value_t = 10)]
    timeout: u64,

    /// Disable everything except HTML content crawling
    #[arg(short = 'B', long)]
    base: bool,

    /// Enable linkfinder in javascript files
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    js: bool,

    /// Try to crawl sitemap.xml
    #[arg(long)]
    sitemap: bool,

    /// Try to crawl robots.txt
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    robots: bool,

    /// Find URLs from 3rd party archives
    #[arg(short = 'a', long)]
    other_source: bool,

    /// Include subdomains crawled from 3rd party archives
    #[arg(short = 'w', long)]
    include_subs: bool,

    /// Also emit the archive URLs themselves
    #[arg(short = 'r', long)]
    include_other_source: bool,

    /// Include subdomains in crawl scope
    #[arg(long)]
    subs: bool,

    /// Refuse off-host redirects
    #[arg(long)]
    no_redirect: bool,

    /// Enable JSON output
    #[arg(long)]
    json: bool,

    /// Suppress all output except URLs
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Turn on verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Turn on debug logging
    #[arg(long)]
    debug: bool,

    /// Include response length in URL lines
    #[arg(short = 'l', long)]
    length: bool,

    /// Enable raw body output
    #[arg(short = 'R', long)]
    raw: bool,

    /// Enable reflected payload detection
    #[arg(long)]
    reflected: bool,

    /// File path for reflected findings
    #[arg(long)]
    reflected_output: Option<String>,

    /// Enable DOM structural deduplication
    #[arg(long)]
    dom_dedup: bool,

    /// Hamming threshold for DOM dedup
    #[arg(long, default_value_t = 6)]
    dom_dedup_threshold: u32,

    /// Maximum baseline fuzz mutations per request
    #[arg(long, default_value_t = 2)]
    baseline_fuzz_cap: usize,

    /// Enable state-aware hybrid crawling (requires Chromium)
    #[arg(long)]
    hybrid: bool,

    /// Number of concurrent browser workers for hybrid crawling
    #[arg(long, default_value_t = 2)]
    hybrid_workers: usize,

    /// Hybrid browser navigation timeout (seconds)
    #[arg(long, default_value_t = 12)]
    hybrid_nav_timeout: u64,

    /// Extra wait after load before analysis (milliseconds)
    #[arg(long, default_value_t = 600)]
    hybrid_stabilization: u64,

    /// Run hybrid browser workers headless
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    hybrid_headless: bool,

    /// Inject JavaScript files into hybrid browsers before analysis
    #[arg(long)]
    hybrid_init_script: Vec<String>,

    /// Limit total pages explored by the hybrid browser (0 = default cap)
    #[arg(long, default_value_t = 150)]
    hybrid_max_visits: usize,

    /// Print version and exit
    #[arg(long)]
    version: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("Version: {}", verkko::VERSION);
        return Ok(());
    }

    let log_level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::ERROR
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(log_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("verkko-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    if let Some(output_dir) = cli.output.as_deref() {
        if !output_dir.is_empty() {
            std::fs::create_dir_all(output_dir).map_err(|err| {
                SpiderError::Configuration(format!(
                    "cannot open output directory {}: {}",
                    output_dir, err
                ))
            })?;
        }
    }

    let cfg = build_config(&cli)?;
    let sites = Engine::resolve_sites(
        cli.site.as_deref().unwrap_or(""),
        cli.sites.as_deref().unwrap_or(""),
    );

    let engine = Engine::new(cfg, cli.threads);
    engine.run(sites).await;
    engine.report();

    Ok(())
}

fn build_config(cli: &Cli) -> Result<CrawlerConfig> {
    let mut cfg = CrawlerConfig {
        quiet: cli.quiet,
        json_output: cli.json,
        max_depth: cli.depth,
        max_concurrency: cli.concurrent.max(1),
        delay: Duration::from_secs(cli.delay),
        random_delay: Duration::from_secs(cli.random_delay),
        length: cli.length,
        raw: cli.raw,
        subs: cli.subs,
        reflected: cli.reflected,
        stealth: cli.stealth,
        proxy: cli.proxy.clone().unwrap_or_default(),
        timeout: Duration::from_secs(if cli.timeout == 0 { 10 } else { cli.timeout }),
        no_redirect: cli.no_redirect,
        burp_file: cli.burp.clone().unwrap_or_default(),
        cookie: cli.cookie.clone().unwrap_or_default(),
        headers: cli.headers.clone(),
        user_agent: cli.user_agent.to_lowercase(),
        output_dir: cli.output.clone().unwrap_or_default(),
        reflected_output: cli.reflected_output.clone().unwrap_or_default(),
        filter_length: CrawlerConfig::parse_filter_length(
            cli.filter_length.as_deref().unwrap_or(""),
        ),
        blacklist: cli.blacklist.clone().unwrap_or_default(),
        whitelist: cli.whitelist.clone().unwrap_or_default(),
        whitelist_domain: cli.whitelist_domain.clone().unwrap_or_default(),
        linkfinder: cli.js,
        sitemap: cli.sitemap,
        robots: cli.robots,
        other_source: cli.other_source,
        include_subs: cli.include_subs,
        include_other_source: cli.include_other_source,
        dom_dedup: cli.dom_dedup,
        dom_dedup_threshold: if cli.dom_dedup_threshold == 0 {
            6
        } else {
            cli.dom_dedup_threshold
        },
        baseline_fuzz_cap: cli.baseline_fuzz_cap,
        hybrid_crawl: cli.hybrid,
        hybrid_workers: cli.hybrid_workers.max(1),
        hybrid_nav_timeout: Duration::from_secs(if cli.hybrid_nav_timeout == 0 {
            12
        } else {
            cli.hybrid_nav_timeout
        }),
        hybrid_stabilization: Duration::from_millis(if cli.hybrid_stabilization == 0 {
            600
        } else {
            cli.hybrid_stabilization
        }),
        hybrid_headless: cli.hybrid_headless,
        hybrid_init_scripts: cli.hybrid_init_script.clone(),
        hybrid_visit_limit: cli.hybrid_max_visits,
        ..Default::default()
    };

    // A reflected output path implies reflection detection.
    if !cfg.reflected_output.is_empty() {
        cfg.reflected = true;
    }

    // Base mode: HTML only.
    if cli.base {
        cfg.linkfinder = false;
        cfg.sitemap = false;
        cfg.robots = false;
        cfg.other_source = false;
        cfg.include_subs = false;
        cfg.include_other_source = false;
    }

    // Scope regexes are fatal before the first request.
    for (name, pattern) in [
        ("blacklist", &cfg.blacklist),
        ("whitelist", &cfg.whitelist),
    ] {
        if !pattern.is_empty() {
            regex::Regex::new(pattern).map_err(|err| {
                SpiderError::Configuration(format!("invalid {} regex: {}", name, err))
            })?;
        }
    }

    Ok(cfg)
}
