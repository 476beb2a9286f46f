//! Go HTTP routers: `net/http` mux patterns plus gin/echo/chi verb helpers.

use super::FrameworkExtractor;
use codeprism_core::{ParsedFragment, Route};
use once_cell::sync::Lazy;
use regex::Regex;

pub struct GoHttpExtractor;

static GO_ROUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\.(GET|POST|PUT|PATCH|DELETE|Get|Post|Put|Patch|Delete|HandleFunc|Handle)\(\s*"([^"]+)"\s*,\s*([\w.]+)?"#,
    )
    .expect("valid go route regex")
});

impl FrameworkExtractor for GoHttpExtractor {
    fn id(&self) -> &'static str {
        "go_http"
    }

    fn languages(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn extract(&self, content: &str, _path: &str, fragment: &mut ParsedFragment) -> bool {
        let before = fragment.routes.len();
        for caps in GO_ROUTE.captures_iter(content) {
            let pattern = &caps[2];
            let (method, path) = match &caps[1] {
                "HandleFunc" | "Handle" => match pattern.split_once(' ') {
                    // Go 1.22 mux patterns: "GET /items/{id}"
                    Some((m, p)) if m.chars().all(|c| c.is_ascii_uppercase()) => {
                        (m.to_string(), p.trim().to_string())
                    }
                    _ => ("ANY".to_string(), pattern.to_string()),
                },
                verb => (verb.to_uppercase(), pattern.to_string()),
            };
            if !path.starts_with('/') {
                continue;
            }
            fragment.routes.push(Route {
                method,
                path,
                controller: None,
                action: caps.get(3).map(|m| m.as_str().to_string()),
            });
        }
        fragment.routes.len() > before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mux_and_router_styles() {
        let src = r#"
mux.HandleFunc("GET /invoices/{id}", h.show)
mux.HandleFunc("/health", health)
r.POST("/invoices", h.create)
e.Get("/ping", ping)
"#;
        let mut fragment = ParsedFragment::empty("go");
        assert!(GoHttpExtractor.extract(src, "cmd/api/main.go", &mut fragment));
        let got: Vec<_> = fragment
            .routes
            .iter()
            .map(|r| (r.method.as_str(), r.path.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("GET", "/invoices/{id}"),
                ("ANY", "/health"),
                ("POST", "/invoices"),
                ("GET", "/ping"),
            ]
        );
        assert_eq!(fragment.routes[0].action.as_deref(), Some("h.show"));
    }
}
