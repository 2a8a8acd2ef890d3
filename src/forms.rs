// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Verkko - Form Extractor
 * Turns an HTML <form> into the synthetic request variants the probing
 * pipeline feeds on: canonical submission, HEAD probe, JSON, multipart,
 * fuzz-marker and empty-body POSTs.
 */
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use scraper::{ElementRef, Selector};
use url::Url;

use crate::request::SyntheticRequest;
use crate::utils::query_escape;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: String,
}

/// Hint table for unfilled fields, keyed by lower-cased name substring.
fn default_field_value(name: &str) -> String {
    let lower = name.to_lowercase();
    if lower.contains("email") || lower.contains("mail") {
        return "gospider@example.com".to_string();
    }
    if lower.contains("pass") {
        return "G0sp!der".to_string();
    }
    if lower.contains("phone") || lower.contains("tel") || lower.contains("mobile") {
        return "0987654321".to_string();
    }
    if lower.contains("url") || lower.contains("website") || lower.contains("link") {
        return "https://gospider.example.com".to_string();
    }
    "gospider".to_string()
}

/// Extracts the field list of a form element: named inputs (minus
/// submit/button/image/reset/file, and unchecked boxes), textareas and
/// selects. Unvalued fields are filled from the hint table.
pub fn extract_form_fields(form: &ElementRef) -> Vec<FormField> {
    let mut fields: Vec<FormField> = Vec::new();

    let input_selector = Selector::parse("input").unwrap();
    for input in form.select(&input_selector) {
        let Some(name) = input.value().attr("name") else {
            continue;
        };
        let mut value = input.value().attr("value").unwrap_or("").to_string();
        let input_type = input.value().attr("type").unwrap_or("").to_lowercase();
        match input_type.as_str() {
            "checkbox" | "radio" => {
                if input.value().attr("checked").is_none() {
                    continue;
                }
                if value.is_empty() {
                    value = "on".to_string();
                }
            }
            "submit" | "button" | "image" | "reset" | "file" => continue,
            _ => {}
        }
        if value.is_empty() {
            value = default_field_value(name);
        }
        fields.push(FormField {
            name: name.to_string(),
            value,
        });
    }

    let textarea_selector = Selector::parse("textarea").unwrap();
    for textarea in form.select(&textarea_selector) {
        if let Some(name) = textarea.value().attr("name") {
            let mut value = textarea.text().collect::<String>().trim().to_string();
            if value.is_empty() {
                value = default_field_value(name);
            }
            fields.push(FormField {
                name: name.to_string(),
                value,
            });
        }
    }

    let select_selector = Selector::parse("select").unwrap();
    let option_selector = Selector::parse("option").unwrap();
    for select in form.select(&select_selector) {
        let Some(name) = select.value().attr("name") else {
            continue;
        };
        let mut value = String::new();
        for option in select.select(&option_selector) {
            let option_value = option
                .value()
                .attr("value")
                .map(|v| v.to_string())
                .unwrap_or_else(|| option.text().collect::<String>().trim().to_string());
            if option.value().attr("selected").is_some() {
                value = option_value;
                break;
            }
            if value.is_empty() {
                value = option_value;
            }
        }
        if value.is_empty() {
            value = default_field_value(name);
        }
        fields.push(FormField {
            name: name.to_string(),
            value,
        });
    }

    fields
}

/// Builds the base request from form attributes: GET forms query-encode
/// their fields, others carry an urlencoded body.
fn build_form_request(
    action: &str,
    method: &str,
    fields: &[FormField],
    base: Option<&Url>,
) -> Option<SyntheticRequest> {
    let mut resolved = action.trim().to_string();
    if resolved.is_empty() {
        resolved = base.map(|b| b.to_string()).unwrap_or_default();
    }
    if let Some(base) = base {
        resolved = base.join(&resolved).ok()?.to_string();
    }
    if resolved.is_empty() {
        return None;
    }

    let mut req = SyntheticRequest::new(&method.trim().to_uppercase(), &resolved);
    if req.method.is_empty() {
        req.method = "GET".to_string();
    }

    if fields.is_empty() {
        return Some(req);
    }

    let encoded = urlencode_fields(fields);
    if req.method == "GET" {
        let separator = if resolved.contains('?') { "&" } else { "?" };
        req.raw_url = format!("{}{}{}", resolved, separator, encoded);
    } else {
        req.body = encoded;
        req.content_type = "application/x-www-form-urlencoded".to_string();
    }

    Some(req)
}

/// All request variants synthesised from one form, in emission order. The
/// caller dedups by request key downstream.
pub fn extract_form_requests(form: &ElementRef, base: Option<&Url>) -> Vec<SyntheticRequest> {
    let action = form.value().attr("action").unwrap_or("");
    let method = form.value().attr("method").unwrap_or("GET");

    let fields = extract_form_fields(form);
    let Some(base_req) = build_form_request(action, method, &fields, base) else {
        return Vec::new();
    };

    let mut requests: Vec<SyntheticRequest> = Vec::with_capacity(6);
    requests.push(base_req.clone());

    if base_req.method == "GET" {
        let mut head_req = base_req.clone();
        head_req.method = "HEAD".to_string();
        head_req.body.clear();
        head_req.content_type.clear();
        requests.push(head_req);
    }

    if base_req.method == "POST" {
        if let Some(json_body) = build_json_form_body(&fields) {
            let mut json_req = base_req.clone();
            json_req.body = json_body;
            json_req.content_type = "application/json".to_string();
            requests.push(json_req);
        }

        if let Some((multipart_body, boundary)) = build_multipart_form_body(&fields) {
            let mut multipart_req = base_req.clone();
            multipart_req.body = multipart_body;
            multipart_req.content_type = format!("multipart/form-data; boundary={}", boundary);
            requests.push(multipart_req);
        }

        if let Some(fuzz_body) = build_fuzz_form_body(&fields) {
            let mut fuzz_req = base_req.clone();
            fuzz_req.body = fuzz_body;
            requests.push(fuzz_req);
        }

        let mut empty_req = base_req.clone();
        empty_req.body.clear();
        requests.push(empty_req);
    }

    for req in &mut requests {
        if req.events.is_empty() {
            req.events = vec!["input".to_string(), "change".to_string(), "paste".to_string()];
        }
    }

    requests
}

fn urlencode_fields(fields: &[FormField]) -> String {
    let mut by_name: BTreeMap<&str, &str> = BTreeMap::new();
    for field in fields {
        if field.name.is_empty() {
            continue;
        }
        by_name.insert(&field.name, &field.value);
    }
    by_name
        .iter()
        .map(|(k, v)| format!("{}={}", query_escape(k), query_escape(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn build_json_form_body(fields: &[FormField]) -> Option<String> {
    if fields.is_empty() {
        return None;
    }
    let mut payload = serde_json::Map::new();
    for field in fields {
        if field.name.is_empty() {
            continue;
        }
        payload.insert(
            field.name.clone(),
            serde_json::Value::String(field.value.clone()),
        );
    }
    if payload.is_empty() {
        return None;
    }
    serde_json::to_string(&serde_json::Value::Object(payload)).ok()
}

fn build_multipart_form_body(fields: &[FormField]) -> Option<(String, String)> {
    if fields.is_empty() {
        return None;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let boundary = format!("gospider-{}", nanos);
    let mut body = String::new();
    for field in fields {
        if field.name.is_empty() {
            continue;
        }
        body.push_str("--");
        body.push_str(&boundary);
        body.push_str("\r\n");
        body.push_str(&format!(
            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            field.name, field.value
        ));
    }
    // No trailing CRLF after the terminating boundary.
    body.push_str("--");
    body.push_str(&boundary);
    body.push_str("--");
    Some((body, boundary))
}

fn build_fuzz_form_body(fields: &[FormField]) -> Option<String> {
    if fields.is_empty() {
        return None;
    }
    let fuzz_fields: Vec<FormField> = fields
        .iter()
        .filter(|f| !f.name.is_empty())
        .map(|f| FormField {
            name: f.name.clone(),
            value: format!("FUZZ_{}", f.name),
        })
        .collect();
    if fuzz_fields.is_empty() {
        return None;
    }
    Some(urlencode_fields(&fuzz_fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn first_form(html: &str) -> (Html, Selector) {
        let doc = Html::parse_document(html);
        let selector = Selector::parse("form").unwrap();
        (doc, selector)
    }

    #[test]
    fn post_form_synthesises_expected_variants() {
        let html = r#"<form action="/login" method="POST">
            <input name="user"><input name="pass" type="password">
        </form>"#;
        let (doc, selector) = first_form(html);
        let form = doc.select(&selector).next().unwrap();
        let base = Url::parse("https://t/").unwrap();
        let requests = extract_form_requests(&form, Some(&base));

        assert!(requests.len() >= 5);
        assert!(requests.iter().all(|r| r.raw_url == "https://t/login"));

        let urlencoded = &requests[0];
        assert_eq!(urlencoded.method, "POST");
        assert_eq!(urlencoded.content_type, "application/x-www-form-urlencoded");
        assert!(urlencoded.body.contains("user=gospider"));
        assert!(urlencoded.body.contains("pass=G0sp%21der"));

        assert!(requests
            .iter()
            .any(|r| r.content_type == "application/json" && r.body.contains("\"user\":\"gospider\"")));
        assert!(requests
            .iter()
            .any(|r| r.content_type.starts_with("multipart/form-data; boundary=gospider-")));
        assert!(requests.iter().any(|r| r.body.contains("user=FUZZ_user")));
        assert!(requests
            .iter()
            .any(|r| r.method == "POST" && r.body.is_empty()));
        assert!(requests.iter().all(|r| r.events == ["input", "change", "paste"]));
    }

    #[test]
    fn get_form_query_encodes_and_adds_head_probe() {
        let html = r#"<form action="/search"><input name="q" value="x"></form>"#;
        let (doc, selector) = first_form(html);
        let form = doc.select(&selector).next().unwrap();
        let base = Url::parse("https://t/").unwrap();
        let requests = extract_form_requests(&form, Some(&base));

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].raw_url, "https://t/search?q=x");
        assert_eq!(requests[1].method, "HEAD");
        assert!(requests[1].body.is_empty());
    }

    #[test]
    fn skips_buttons_and_unchecked_boxes() {
        let html = r#"<form action="/f" method="post">
            <input name="keep" value="1">
            <input name="skip" type="submit" value="Go">
            <input name="box" type="checkbox">
            <input name="ticked" type="checkbox" checked>
        </form>"#;
        let (doc, selector) = first_form(html);
        let form = doc.select(&selector).next().unwrap();
        let fields = extract_form_fields(&form);
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["keep", "ticked"]);
        assert_eq!(fields[1].value, "on");
    }

    #[test]
    fn multipart_body_has_rfc2046_framing() {
        let fields = vec![FormField {
            name: "a".into(),
            value: "1".into(),
        }];
        let (body, boundary) = build_multipart_form_body(&fields).unwrap();
        assert!(body.starts_with(&format!("--{}\r\n", boundary)));
        assert!(body.contains("Content-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n"));
        assert!(body.ends_with(&format!("--{}--", boundary)));
        assert!(!body.ends_with("\r\n"));
    }
}
