// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! sitemap.xml and robots.txt seeding: lightweight parsers that feed
//! additional start URLs into the collector.

use url::Url;

/// Extracts `<loc>` entries from a sitemap body, following the plain and
/// index formats. Nested sitemap URLs are returned like page URLs; the
/// caller re-fetches anything ending in `.xml`.
pub fn parse_sitemap_locs(body: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find("<loc>") {
        let after = &rest[start + 5..];
        match after.find("</loc>") {
            Some(end) => {
                let loc = after[..end].trim();
                if !loc.is_empty() {
                    urls.push(loc.to_string());
                }
                rest = &after[end + 6..];
            }
            None => break,
        }
    }
    urls
}

/// Extracts crawlable paths from robots.txt: every `Allow:`/`Disallow:`
/// path (wildcards stripped) resolved against the site, plus any
/// `Sitemap:` URLs.
pub fn parse_robots_paths(site: &Url, body: &str) -> (Vec<String>, Vec<String>) {
    let mut paths = Vec::new();
    let mut sitemaps = Vec::new();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = strip_prefix_ci(line, "allow:")
            .or_else(|| strip_prefix_ci(line, "disallow:"))
        {
            let path = rest.trim().replace('*', "");
            if path.is_empty() || path == "/" {
                continue;
            }
            if let Ok(resolved) = site.join(&path) {
                paths.push(resolved.to_string());
            }
        } else if let Some(rest) = strip_prefix_ci(line, "sitemap:") {
            let value = rest.trim();
            if !value.is_empty() {
                sitemaps.push(value.to_string());
            }
        }
    }

    (paths, sitemaps)
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        line.get(prefix.len()..)
    } else {
        None
    }
}

/// Well-known sitemap location for a site.
pub fn sitemap_url(site: &Url) -> String {
    format!(
        "{}://{}/sitemap.xml",
        site.scheme(),
        site.host_str().unwrap_or("")
    )
}

/// Well-known robots location for a site.
pub fn robots_url(site: &Url) -> String {
    format!(
        "{}://{}/robots.txt",
        site.scheme(),
        site.host_str().unwrap_or("")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sitemap_locs_are_extracted() {
        let body = r#"<?xml version="1.0"?>
            <urlset>
              <url><loc>https://t/a</loc></url>
              <url><loc>
                https://t/b
              </loc></url>
            </urlset>"#;
        assert_eq!(parse_sitemap_locs(body), vec!["https://t/a", "https://t/b"]);
    }

    #[test]
    fn robots_paths_and_sitemaps_are_split() {
        let site = Url::parse("https://t.example/").unwrap();
        let body = "User-agent: *\nDisallow: /admin/\nAllow: /public*\n# note\nSitemap: https://t.example/map.xml\n";
        let (paths, sitemaps) = parse_robots_paths(&site, body);
        assert_eq!(
            paths,
            vec![
                "https://t.example/admin/".to_string(),
                "https://t.example/public".to_string()
            ]
        );
        assert_eq!(sitemaps, vec!["https://t.example/map.xml".to_string()]);
    }
}
