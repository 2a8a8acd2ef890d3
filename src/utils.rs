// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Shared helpers: escape decoding, extension probing, scope checks,
//! registered-domain derivation.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use regex::Regex;
use url::Url;

/// Two-part public suffixes common enough that stripping only the last
/// label would mis-bucket the registered domain.
const MULTI_PART_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "com.au", "net.au", "org.au", "co.nz", "co.jp",
    "or.jp", "ne.jp", "com.br", "com.cn", "com.tr", "co.in", "co.kr", "com.mx", "com.sg",
    "com.hk", "co.za",
];

/// Effective second-level domain of a host, used as the bucket key for DOM
/// dedup and subdomain mining.
pub fn registered_domain(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_lowercase();
    if host.parse::<std::net::IpAddr>().is_ok() {
        return host;
    }
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host;
    }
    let last_two = labels[labels.len() - 2..].join(".");
    if MULTI_PART_SUFFIXES.contains(&last_two.as_str()) {
        labels[labels.len() - 3..].join(".")
    } else {
        last_two
    }
}

pub fn site_domain(site: &Url) -> String {
    site.host_str().map(registered_domain).unwrap_or_default()
}

/// Lower-cased extension (with leading dot) of a URL path, query and
/// fragment excluded. Returns an empty string when there is none.
pub fn ext_type(raw: &str) -> String {
    let path = raw
        .split(&['?', '#'][..])
        .next()
        .unwrap_or(raw)
        .rsplit('/')
        .next()
        .unwrap_or("");
    match path.rfind('.') {
        Some(idx) if idx + 1 < path.len() => path[idx..].to_lowercase(),
        _ => String::new(),
    }
}

/// Decodes `\uXXXX` and `\xXX` escapes commonly left in scraped bodies.
pub fn decode_chars(input: &str) -> String {
    if !input.contains("\\u") && !input.contains("\\x") {
        return input.to_string();
    }
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            match bytes[i + 1] {
                b'u' if i + 5 < bytes.len() => {
                    let code = input
                        .get(i + 2..i + 6)
                        .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                        .and_then(char::from_u32);
                    if let Some(ch) = code {
                        out.push(ch);
                        i += 6;
                        continue;
                    }
                    out.push('\\');
                    i += 1;
                }
                b'x' if i + 3 < bytes.len() => {
                    let code = input
                        .get(i + 2..i + 4)
                        .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                    if let Some(byte) = code {
                        out.push(byte as char);
                        i += 4;
                        continue;
                    }
                    out.push('\\');
                    i += 1;
                }
                _ => {
                    out.push('\\');
                    i += 1;
                }
            }
        } else {
            let ch_len = utf8_char_len(bytes[i]);
            if let Some(slice) = input.get(i..i + ch_len) {
                out.push_str(slice);
            }
            i += ch_len;
        }
    }
    out
}

fn utf8_char_len(first: u8) -> usize {
    match first {
        b if b < 0x80 => 1,
        b if b & 0xE0 == 0xC0 => 2,
        b if b & 0xF0 == 0xE0 => 3,
        _ => 4,
    }
}

/// HTML-escapes the five characters `<`, `>`, `&`, `'`, `"`.
pub fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&#34;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Percent-encodes a string the way query values are encoded.
pub fn query_escape(input: &str) -> String {
    url::form_urlencoded::byte_serialize(input.as_bytes()).collect()
}

/// True when the URL matches at least one scope filter.
pub fn in_scope(url: &Url, filters: &[Regex]) -> bool {
    let raw = url.as_str();
    filters.iter().any(|re| re.is_match(raw))
}

/// Reads non-empty trimmed lines from a file.
pub fn reading_lines(path: &str) -> Vec<String> {
    let file = match File::open(Path::new(path)) {
        Ok(f) => f,
        Err(_) => return Vec::new(),
    };
    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_domain_strips_subdomains() {
        assert_eq!(registered_domain("app.api.example.com"), "example.com");
        assert_eq!(registered_domain("example.com"), "example.com");
        assert_eq!(registered_domain("deep.sub.example.co.uk"), "example.co.uk");
        assert_eq!(registered_domain("127.0.0.1"), "127.0.0.1");
    }

    #[test]
    fn ext_type_ignores_query_and_fragment() {
        assert_eq!(ext_type("https://t/app.min.js?v=2#frag"), ".js");
        assert_eq!(ext_type("https://t/path/"), "");
        assert_eq!(ext_type("/assets/logo.PNG"), ".png");
    }

    #[test]
    fn decode_chars_handles_unicode_and_hex() {
        assert_eq!(decode_chars("a\\u0041b"), "aAb");
        assert_eq!(decode_chars("\\x3cimg\\x3e"), "<img>");
        assert_eq!(decode_chars("plain"), "plain");
    }

    #[test]
    fn html_escape_matches_expected_entities() {
        assert_eq!(html_escape("<a href=\"x\">&'"), "&lt;a href=&#34;x&#34;&gt;&amp;&#39;");
    }
}
