// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Canonical URL components: query canonicalisation, path cleaning, and
//! the display form used for emitted lines and registry keys.

use url::Url;

/// Re-decodes percent-encoded curly braces; template placeholders such as
/// `/api/{id}` must survive canonicalisation byte-for-byte.
pub fn decode_curly_braces(raw: &str) -> String {
    raw.replace("%7B", "{")
        .replace("%7b", "{")
        .replace("%7D", "}")
        .replace("%7d", "}")
}

/// Canonical query string: keys sorted, values per key sorted and
/// deduplicated, reassembled as `k=v&…`. Unparseable input is returned
/// unchanged.
pub fn normalize_query(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        return raw.to_string();
    }

    let mut keys: Vec<String> = pairs.iter().map(|(k, _)| k.clone()).collect();
    keys.sort();
    keys.dedup();

    let mut out = String::new();
    for key in keys {
        let mut vals: Vec<&str> = pairs
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .collect();
        vals.sort();
        vals.dedup();
        let escaped_key: String = url::form_urlencoded::byte_serialize(key.as_bytes()).collect();
        for val in vals {
            if !out.is_empty() {
                out.push('&');
            }
            out.push_str(&escaped_key);
            if !val.is_empty() {
                out.push('=');
                let escaped: String = url::form_urlencoded::byte_serialize(val.as_bytes()).collect();
                out.push_str(&escaped);
            }
        }
    }
    out
}

/// Lexically cleans a path component: resolves `.`/`..`, collapses slashes,
/// guarantees a leading slash.
pub fn normalize_path_component(p: &str) -> String {
    if p.is_empty() {
        return "/".to_string();
    }
    let mut segments: Vec<&str> = Vec::new();
    for part in p.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let mut clean = String::from("/");
    clean.push_str(&segments.join("/"));
    decode_curly_braces(&clean)
}

/// Display form of a URL: canonical query ordering plus decoded curly
/// braces in path and query.
pub fn normalize_display_url(raw: &str) -> String {
    if raw.is_empty() {
        return raw.to_string();
    }
    let mut parsed = match Url::parse(raw) {
        Ok(u) => u,
        Err(_) => return decode_curly_braces(raw),
    };
    if let Some(query) = parsed.query() {
        if !query.is_empty() {
            let normalized = normalize_query(query);
            parsed.set_query(Some(&normalized));
        }
    }
    decode_curly_braces(parsed.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_keys_and_values_are_sorted_and_deduped() {
        assert_eq!(normalize_query("b=2&a=1"), "a=1&b=2");
        assert_eq!(normalize_query("a=2&a=1&a=2"), "a=1&a=2");
        assert_eq!(normalize_query("flag"), "flag");
    }

    #[test]
    fn path_component_resolves_dots() {
        assert_eq!(normalize_path_component("/a/b/../c/./d"), "/a/c/d");
        assert_eq!(normalize_path_component(""), "/");
        assert_eq!(normalize_path_component("a//b"), "/a/b");
    }

    #[test]
    fn display_url_keeps_curly_templates() {
        assert_eq!(
            normalize_display_url("https://t/api/%7Bid%7D?b=2&a=1"),
            "https://t/api/{id}?a=1&b=2"
        );
    }
}
