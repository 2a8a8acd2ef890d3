// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Verkko - JavaScript Source Scanner
 * Brace- and string-aware scan over JS bodies that recovers synthesised
 * requests from fetch(), axios.<verb>(), axios({...}), $.ajax({...}) and
 * XMLHttpRequest open/send pairs. Best-effort by design: no real parser.
 */
use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::request::{build_request_key, SyntheticRequest};

static HEADERS_BLOCK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)headers\s*:\s*\{([^{}]*)\}").expect("invalid headers block pattern")
});

static HEADER_PAIR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(['"`])([^'"`]+?)['"`]\s*:\s*(['"`])([^'"`]*?)['"`]"#)
        .expect("invalid header pair pattern")
});

static XHR_OPEN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)([A-Za-z0-9_\.$]+)\.open\s*\(\s*(['"`])([A-Za-z]+)['"`]\s*,\s*(['"`])([^'"`]+?)['"`]"#)
        .expect("invalid xhr open pattern")
});

#[derive(Debug, Default)]
struct JsOptions {
    method: String,
    url: String,
    body: String,
    headers: Option<BTreeMap<String, String>>,
    content_type: String,
}

#[derive(Debug)]
struct JsCall {
    args: String,
    start: usize,
    end: usize,
}

/// Extracts synthetic requests from JavaScript source. The returned list is
/// deduplicated by request key and stable-sorted by (url, method, body).
pub fn extract_js_requests(source: &str, _base: Option<&Url>) -> Vec<SyntheticRequest> {
    let mut requests: Vec<SyntheticRequest> = Vec::new();

    for call in scan_function_calls(source, "fetch") {
        let args = split_args(&call.args);
        if args.is_empty() {
            continue;
        }
        let url_val = decode_string_argument(&args[0]);
        if url_val.is_empty() {
            continue;
        }
        let mut req = SyntheticRequest::new("GET", &url_val);
        req.source = source[call.start..call.end].trim().to_string();
        if args.len() > 1 && args[1].trim_start().starts_with('{') {
            let opts = parse_js_options(&args[1]);
            apply_options(&mut req, opts);
        }
        requests.push(req);
    }

    for verb in ["get", "post", "put", "delete", "patch", "head", "options"] {
        for call in scan_function_calls(source, &format!("axios.{}", verb)) {
            let args = split_args(&call.args);
            if args.is_empty() {
                continue;
            }
            let url_val = decode_string_argument(&args[0]);
            if url_val.is_empty() {
                continue;
            }
            let mut req = SyntheticRequest::new(&verb.to_uppercase(), &url_val);
            req.source = source[call.start..call.end].trim().to_string();

            let config_arg = if matches!(verb, "get" | "delete" | "head" | "options") {
                args.get(1).cloned()
            } else {
                if let Some(body_arg) = args.get(1) {
                    req.body = decode_body_argument(body_arg);
                }
                args.get(2).cloned()
            };
            if let Some(config) = config_arg {
                if !config.trim().is_empty() {
                    let opts = parse_js_options(&config);
                    apply_options(&mut req, opts);
                }
            }
            requests.push(req);
        }
    }

    for call in scan_function_calls(source, "axios") {
        // Skip `axios.<verb>` occurrences, handled above.
        let after = skip_spaces(source, call.start + "axios".len());
        if source.as_bytes().get(after) == Some(&b'.') {
            continue;
        }
        let args = split_args(&call.args);
        if args.is_empty() {
            continue;
        }
        let first = args[0].trim();
        if !first.starts_with('{') {
            continue;
        }
        let opts = parse_js_options(first);
        if opts.url.is_empty() {
            continue;
        }
        let mut req = SyntheticRequest::new("GET", &opts.url);
        req.source = source[call.start..call.end].trim().to_string();
        apply_options(&mut req, opts);
        requests.push(req);
    }

    for name in ["$.ajax", "jQuery.ajax"] {
        for call in scan_function_calls(source, name) {
            let args = split_args(&call.args);
            if args.is_empty() {
                continue;
            }
            let first = args[0].trim();
            if !first.starts_with('{') {
                continue;
            }
            let opts = parse_js_options(first);
            if opts.url.is_empty() {
                continue;
            }
            let mut req = SyntheticRequest::new("GET", &opts.url);
            req.source = source[call.start..call.end].trim().to_string();
            apply_options(&mut req, opts);
            requests.push(req);
        }
    }

    requests.extend(parse_xhr_requests(source));

    finalize_js_requests(requests)
}

fn apply_options(req: &mut SyntheticRequest, opts: JsOptions) {
    if !opts.method.is_empty() {
        req.method = opts.method.to_uppercase();
    }
    if !opts.body.is_empty() {
        req.body = opts.body;
    }
    if let Some(headers) = opts.headers {
        for (k, v) in headers {
            req.headers.insert(k, v);
        }
    }
    if !opts.content_type.is_empty() {
        req.content_type = opts.content_type;
    }
    if !opts.url.is_empty() && req.raw_url.is_empty() {
        req.raw_url = opts.url;
    }
}

fn parse_js_options(block: &str) -> JsOptions {
    let block = block.trim();
    let mut opts = JsOptions::default();
    if block.is_empty() {
        return opts;
    }

    opts.method = extract_string_literal(block, "method").to_uppercase();
    if opts.method.is_empty() {
        opts.method = extract_string_literal(block, "type").to_uppercase();
    }
    opts.url = extract_string_literal(block, "url");

    opts.body = extract_string_literal(block, "body");
    if opts.body.is_empty() {
        opts.body = extract_string_literal(block, "data");
    }
    if opts.body.is_empty() {
        opts.body = extract_object_literal(block, "body");
        if opts.body.is_empty() {
            opts.body = extract_object_literal(block, "data");
        }
    }

    opts.content_type = extract_string_literal(block, "contentType");
    if opts.content_type.is_empty() {
        opts.content_type = extract_string_literal(block, "content-type");
    }

    if let Some(caps) = HEADERS_BLOCK_REGEX.captures(block) {
        let header_text = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let mut headers = BTreeMap::new();
        for pair in HEADER_PAIR_REGEX.captures_iter(header_text) {
            let key = pair.get(2).map(|m| m.as_str()).unwrap_or("");
            let value = pair.get(4).map(|m| m.as_str()).unwrap_or("");
            if !key.is_empty() {
                headers.insert(key.to_string(), value.to_string());
            }
        }
        if !headers.is_empty() {
            opts.headers = Some(headers);
        }
    }

    if opts.content_type.is_empty() {
        if let Some(headers) = &opts.headers {
            for key in ["Content-Type", "content-type"] {
                if let Some(ct) = headers.get(key) {
                    opts.content_type = ct.clone();
                    break;
                }
            }
        }
    }

    opts
}

/// Finds `key: '<literal>'` in an options block, honouring escapes inside
/// the quoted literal. Matches key names case-insensitively.
fn extract_string_literal(block: &str, key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }
    let pattern = Regex::new(&format!(r"(?i){}\s*:\s*", regex::escape(key)))
        .expect("invalid literal key pattern");
    for found in pattern.find_iter(block) {
        let pos = found.end();
        let Some(&quote) = block.as_bytes().get(pos) else {
            continue;
        };
        if quote != b'\'' && quote != b'"' && quote != b'`' {
            continue;
        }
        if let Some(literal) = scan_quoted_literal(block, pos) {
            return decode_js_string(literal);
        }
    }
    String::new()
}

fn scan_quoted_literal(source: &str, start: usize) -> Option<&str> {
    let bytes = source.as_bytes();
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if i + 1 < bytes.len() => i += 2,
            b if b == quote => return Some(&source[start..i + 1]),
            _ => i += 1,
        }
    }
    None
}

fn extract_object_literal(block: &str, key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }
    let pattern = Regex::new(&format!(
        r"(?is){}\s*:\s*(\{{[^{{}}]*\}}|\[[^\[\]]*\])",
        regex::escape(key)
    ))
    .expect("invalid object literal pattern");
    pattern
        .captures(block)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

fn decode_string_argument(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() < 2 {
        return String::new();
    }
    let first = raw.as_bytes()[0];
    let last = raw.as_bytes()[raw.len() - 1];
    if (first == b'"' || first == b'\'' || first == b'`') && last == first {
        return decode_js_string(raw);
    }
    String::new()
}

fn decode_body_argument(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    let decoded = decode_string_argument(raw);
    if !decoded.is_empty() {
        return decoded;
    }
    if raw.starts_with('{') || raw.starts_with('[') {
        return raw.to_string();
    }
    String::new()
}

/// Decodes a quoted JS string literal: surrounding quotes removed, escape
/// sequences (`\n`, `\t`, `\\`, `\uXXXX`, `\xXX`, quote escapes) resolved.
pub fn decode_js_string(literal: &str) -> String {
    let literal = literal.trim();
    if literal.len() < 2 {
        return String::new();
    }
    let bytes = literal.as_bytes();
    let first = bytes[0];
    if !(first == b'"' || first == b'\'' || first == b'`') || bytes[literal.len() - 1] != first {
        return String::new();
    }

    let inner = &literal[1..literal.len() - 1];
    let inner_bytes = inner.as_bytes();
    let mut out = String::with_capacity(inner.len());
    let mut i = 0;
    while i < inner_bytes.len() {
        if inner_bytes[i] == b'\\' && i + 1 < inner_bytes.len() {
            match inner_bytes[i + 1] {
                b'n' => out.push('\n'),
                b't' => out.push('\t'),
                b'r' => out.push('\r'),
                b'b' => out.push('\u{0008}'),
                b'f' => out.push('\u{000C}'),
                b'v' => out.push('\u{000B}'),
                b'0' => out.push('\0'),
                b'u' if i + 5 < inner_bytes.len() => {
                    let code = inner
                        .get(i + 2..i + 6)
                        .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                        .and_then(char::from_u32);
                    if let Some(ch) = code {
                        out.push(ch);
                        i += 6;
                        continue;
                    }
                    out.push('u');
                }
                b'x' if i + 3 < inner_bytes.len() => {
                    let code = inner
                        .get(i + 2..i + 4)
                        .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                    if let Some(byte) = code {
                        out.push(byte as char);
                        i += 4;
                        continue;
                    }
                    out.push('x');
                }
                other => out.push(other as char),
            }
            i += 2;
        } else {
            let ch_start = i;
            i += 1;
            while i < inner_bytes.len() && (inner_bytes[i] & 0xC0) == 0x80 {
                i += 1;
            }
            if let Some(slice) = inner.get(ch_start..i) {
                out.push_str(slice);
            }
        }
    }
    out
}

fn parse_xhr_requests(source: &str) -> Vec<SyntheticRequest> {
    let mut requests = Vec::new();
    for caps in XHR_OPEN_REGEX.captures_iter(source) {
        let whole = caps.get(0).unwrap();
        let variable = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let method = caps.get(3).map(|m| m.as_str()).unwrap_or("").to_uppercase();
        let quote = caps.get(4).map(|m| m.as_str()).unwrap_or("\"");
        let url_fragment = caps.get(5).map(|m| m.as_str()).unwrap_or("");
        let raw_url = decode_js_string(&format!("{}{}{}", quote, url_fragment, quote));
        if raw_url.is_empty() {
            continue;
        }
        let mut req = SyntheticRequest::new(&method, &raw_url);
        req.source = whole.as_str().trim().to_string();
        if let Some(body) = find_xhr_send_body(&source[whole.end()..], variable) {
            req.body = body;
        }
        requests.push(req);
    }
    requests
}

fn find_xhr_send_body(section: &str, variable: &str) -> Option<String> {
    let name = format!("{}.send", variable);
    let calls = scan_function_calls(section, &name);
    let call = calls.first()?;
    let args = split_args(&call.args);
    let first = args.first()?;
    let body = decode_body_argument(first);
    if body.is_empty() {
        None
    } else {
        Some(body)
    }
}

fn finalize_js_requests(reqs: Vec<SyntheticRequest>) -> Vec<SyntheticRequest> {
    let mut seen = std::collections::HashSet::new();
    let mut out: Vec<SyntheticRequest> = Vec::with_capacity(reqs.len());

    for mut req in reqs {
        req.method = req.method.trim().to_uppercase();
        if req.method.is_empty() {
            req.method = "GET".to_string();
        }
        req.raw_url = req.raw_url.trim().to_string();
        req.body = req.body.trim().to_string();
        if req.content_type.is_empty() {
            for key in ["Content-Type", "content-type"] {
                if let Some(ct) = req.headers.get(key) {
                    req.content_type = ct.clone();
                    break;
                }
            }
        }

        let key = build_request_key(&req);
        if seen.insert(key) {
            out.push(req);
        }
    }

    // Keyed on URL first; intentional even though it breaks call-site
    // ordering, downstream dedup relies on it.
    out.sort_by(|a, b| {
        a.raw_url
            .cmp(&b.raw_url)
            .then_with(|| a.method.cmp(&b.method))
            .then_with(|| a.body.cmp(&b.body))
    });

    out
}

fn split_args(arguments: &str) -> Vec<String> {
    let bytes = arguments.as_bytes();
    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    let (mut in_single, mut in_double, mut in_backtick) = (false, false, false);
    let mut escaped = false;

    for (i, &ch) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == b'\\' {
            escaped = true;
            continue;
        }
        if in_single {
            if ch == b'\'' {
                in_single = false;
            }
            continue;
        }
        if in_double {
            if ch == b'"' {
                in_double = false;
            }
            continue;
        }
        if in_backtick {
            if ch == b'`' {
                in_backtick = false;
            }
            continue;
        }
        match ch {
            b'\'' => in_single = true,
            b'"' => in_double = true,
            b'`' => in_backtick = true,
            b'{' | b'[' | b'(' => depth += 1,
            b'}' | b']' | b')' => {
                if depth > 0 {
                    depth -= 1;
                }
            }
            b',' if depth == 0 => {
                let arg = arguments[start..i].trim();
                if !arg.is_empty() {
                    args.push(arg.to_string());
                }
                start = i + 1;
            }
            _ => {}
        }
    }

    if start < arguments.len() {
        let arg = arguments[start..].trim();
        if !arg.is_empty() {
            args.push(arg.to_string());
        }
    }

    args
}

fn scan_function_calls(source: &str, name: &str) -> Vec<JsCall> {
    // ASCII-only lowering keeps byte offsets aligned with `source`.
    let lower_source: String = source.chars().map(|c| c.to_ascii_lowercase()).collect();
    let lower_name = name.to_ascii_lowercase();
    let mut calls = Vec::new();

    let mut idx = 0usize;
    while idx < source.len() {
        let Some(pos) = lower_source[idx..].find(&lower_name) else {
            break;
        };
        let start = idx + pos;
        if start > 0 && is_ident_char(lower_source.as_bytes()[start - 1]) {
            idx = start + lower_name.len();
            continue;
        }
        let after_name = skip_spaces(source, start + name.len());
        if source.as_bytes().get(after_name) != Some(&b'(') {
            idx = start + lower_name.len();
            continue;
        }
        match extract_call_arguments(source, after_name) {
            Some((args, next_idx)) => {
                calls.push(JsCall {
                    args,
                    start,
                    end: next_idx,
                });
                idx = next_idx;
            }
            None => idx = start + lower_name.len(),
        }
    }

    calls
}

fn extract_call_arguments(source: &str, open_idx: usize) -> Option<(String, usize)> {
    let bytes = source.as_bytes();
    let mut depth = 0i32;
    let (mut in_single, mut in_double, mut in_backtick) = (false, false, false);
    let mut escaped = false;

    for i in open_idx..bytes.len() {
        let ch = bytes[i];
        if escaped {
            escaped = false;
            continue;
        }
        if ch == b'\\' {
            escaped = true;
            continue;
        }
        if in_single {
            if ch == b'\'' {
                in_single = false;
            }
            continue;
        }
        if in_double {
            if ch == b'"' {
                in_double = false;
            }
            continue;
        }
        if in_backtick {
            if ch == b'`' {
                in_backtick = false;
            }
            continue;
        }
        match ch {
            b'\'' => in_single = true,
            b'"' => in_double = true,
            b'`' => in_backtick = true,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((source[open_idx + 1..i].to_string(), i + 1));
                }
            }
            _ => {}
        }
    }

    None
}

fn skip_spaces(source: &str, mut idx: usize) -> usize {
    let bytes = source.as_bytes();
    while idx < bytes.len() {
        match bytes[idx] {
            b' ' | b'\t' | b'\r' | b'\n' => idx += 1,
            _ => return idx,
        }
    }
    idx
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_with_options_extracts_method_body_and_content_type() {
        let src = r#"fetch("/api/v1?x=1", {method:"POST", body:"y=2", headers:{"Content-Type":"application/x-www-form-urlencoded"}})"#;
        let reqs = extract_js_requests(src, None);
        assert_eq!(reqs.len(), 1);
        let req = &reqs[0];
        assert_eq!(req.method, "POST");
        assert_eq!(req.raw_url, "/api/v1?x=1");
        assert_eq!(req.body, "y=2");
        assert_eq!(req.content_type, "application/x-www-form-urlencoded");
    }

    #[test]
    fn axios_verbs_carry_bodies() {
        let src = r#"axios.post('/api/items', {name: "a"}, {headers: {'X-Token': 'abc'}});
                     axios.get('/api/items?id=2');"#;
        let reqs = extract_js_requests(src, None);
        assert_eq!(reqs.len(), 2);
        let post = reqs.iter().find(|r| r.method == "POST").unwrap();
        assert_eq!(post.raw_url, "/api/items");
        assert_eq!(post.body, r#"{name: "a"}"#);
        assert_eq!(post.headers.get("X-Token").unwrap(), "abc");
    }

    #[test]
    fn axios_config_object_form() {
        let src = r#"axios({url: '/api/update', method: 'put', data: 'v=3'})"#;
        let reqs = extract_js_requests(src, None);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].method, "PUT");
        assert_eq!(reqs[0].raw_url, "/api/update");
        assert_eq!(reqs[0].body, "v=3");
    }

    #[test]
    fn jquery_ajax_type_key() {
        let src = r#"$.ajax({url: "/legacy", type: "DELETE"});"#;
        let reqs = extract_js_requests(src, None);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].method, "DELETE");
    }

    #[test]
    fn xhr_open_send_pairs_recover_bodies() {
        let src = r#"
            var xhr = new XMLHttpRequest();
            xhr.open('POST', '/api/xhr');
            xhr.setRequestHeader('Content-Type', 'text/plain');
            xhr.send('payload=1');
        "#;
        let reqs = extract_js_requests(src, None);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].method, "POST");
        assert_eq!(reqs[0].raw_url, "/api/xhr");
        assert_eq!(reqs[0].body, "payload=1");
    }

    #[test]
    fn duplicates_are_removed_and_order_is_url_stable() {
        let src = r#"
            fetch("/b"); fetch("/a"); fetch("/a");
        "#;
        let reqs = extract_js_requests(src, None);
        let urls: Vec<&str> = reqs.iter().map(|r| r.raw_url.as_str()).collect();
        assert_eq!(urls, vec!["/a", "/b"]);
    }

    #[test]
    fn identifier_prefix_does_not_match() {
        let src = r#"prefetch("/nope"); refetch("/nope2"); fetch("/yes");"#;
        let reqs = extract_js_requests(src, None);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].raw_url, "/yes");
    }

    #[test]
    fn string_args_honour_escapes_and_template_quotes() {
        assert_eq!(decode_js_string(r#""a\"b""#), "a\"b");
        assert_eq!(decode_js_string(r"'xA'"), "xA");
        assert_eq!(decode_js_string("`/path/${'\u{0061}'}`"), "/path/${'a'}");
    }

    #[test]
    fn split_args_respects_nesting_and_strings() {
        let args = split_args(r#""/a,b", {x: [1,2], y: "c,d"}, 3"#);
        assert_eq!(args.len(), 3);
        assert_eq!(args[0], r#""/a,b""#);
        assert_eq!(args[2], "3");
    }
}
