//! Outbound HTTP call sites: `fetch`, `axios`, thin `api.get('/x')` wrappers, and
//! Python `requests` / `httpx`.

use super::{line_of, FrameworkExtractor};
use codeprism_core::{ApiCall, ParsedFragment};
use once_cell::sync::Lazy;
use regex::Regex;

pub struct HttpClientExtractor;

static FETCH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bfetch\(\s*['"`]([^'"`]+)['"`]([^\n]*)"#).expect("valid fetch regex")
});
static FETCH_METHOD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"method:\s*['"`](\w+)['"`]"#).expect("valid fetch method regex")
});
static CLIENT_VERB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\b(axios|api|client|http|apiClient|request)\s*\.\s*(get|post|put|patch|delete)\s*(?:<[^>]*>)?\(\s*['"`]([^'"`]+)['"`]"#,
    )
    .expect("valid client verb regex")
});
static PY_CLIENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:requests|httpx|session|client)\.(get|post|put|patch|delete)\(\s*f?['"]([^'"]+)['"]"#)
        .expect("valid python client regex")
});

impl FrameworkExtractor for HttpClientExtractor {
    fn id(&self) -> &'static str {
        "http_client"
    }

    fn languages(&self) -> &'static [&'static str] {
        &["typescript", "javascript", "python"]
    }

    fn extract(&self, content: &str, _path: &str, fragment: &mut ParsedFragment) -> bool {
        let before = fragment.api_calls.len();

        if fragment.language == "python" {
            for caps in PY_CLIENT.captures_iter(content) {
                push_call(fragment, content, &caps, 1, 2);
            }
        } else {
            for caps in FETCH.captures_iter(content) {
                let Some(whole) = caps.get(0) else { continue };
                let method = FETCH_METHOD
                    .captures(&caps[2])
                    .map(|m| m[1].to_uppercase())
                    .unwrap_or_else(|| "GET".to_string());
                fragment.api_calls.push(ApiCall {
                    method,
                    url: caps[1].to_string(),
                    line: line_of(content, whole.start()),
                });
            }
            for caps in CLIENT_VERB.captures_iter(content) {
                // Wrappers other than axios only count when the target looks like a path.
                if &caps[1] != "axios" && !caps[3].starts_with('/') && !caps[3].starts_with("${") {
                    continue;
                }
                push_call(fragment, content, &caps, 2, 3);
            }
        }

        fragment.api_calls.len() > before
    }
}

fn push_call(
    fragment: &mut ParsedFragment,
    content: &str,
    caps: &regex::Captures,
    method_group: usize,
    url_group: usize,
) {
    let Some(whole) = caps.get(0) else { return };
    fragment.api_calls.push(ApiCall {
        method: caps[method_group].to_uppercase(),
        url: caps[url_group].to_string(),
        line: line_of(content, whole.start()),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_and_axios_calls() {
        let src = r#"
const res = await fetch(`${API_BASE}/patients/${id}`);
await fetch("/api/patients", { method: "POST", body });
const { data } = await axios.get<Invoice[]>('/api/invoices');
api.delete(`/api/invoices/${id}`);
client.get(cacheKey);
"#;
        let mut fragment = ParsedFragment::empty("typescript");
        assert!(HttpClientExtractor.extract(src, "src/api.ts", &mut fragment));
        let got: Vec<_> = fragment
            .api_calls
            .iter()
            .map(|c| (c.method.as_str(), c.url.as_str(), c.line))
            .collect();
        assert_eq!(
            got,
            vec![
                ("GET", "${API_BASE}/patients/${id}", 2),
                ("POST", "/api/patients", 3),
                ("GET", "/api/invoices", 4),
                ("DELETE", "/api/invoices/${id}", 5),
            ]
        );
    }

    #[test]
    fn python_requests() {
        let src = "resp = requests.post(f\"{BASE}/invoices/{invoice_id}/pay\", json=body)\n";
        let mut fragment = ParsedFragment::empty("python");
        assert!(HttpClientExtractor.extract(src, "worker/pay.py", &mut fragment));
        assert_eq!(fragment.api_calls[0].method, "POST");
        assert_eq!(fragment.api_calls[0].url, "{BASE}/invoices/{invoice_id}/pay");
    }
}
