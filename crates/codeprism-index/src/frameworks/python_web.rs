//! Flask `@app.route` and FastAPI `@router.get` style route decorators.

use super::FrameworkExtractor;
use codeprism_core::{ParsedFragment, Route};
use once_cell::sync::Lazy;
use regex::Regex;

pub struct PythonWebExtractor;

static FLASK_ROUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@\w+\.route\(\s*['"]([^'"]+)['"]([^)]*)\)\s*\n\s*(?:async\s+)?def\s+(\w+)"#)
        .expect("valid flask route regex")
});
static FLASK_METHODS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"methods\s*=\s*[\[(]([^\])]*)[\])]").expect("valid flask methods regex")
});
static FASTAPI_ROUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"@\w+\.(get|post|put|patch|delete)\(\s*['"]([^'"]+)['"][^)]*\)\s*\n\s*(?:async\s+)?def\s+(\w+)"#,
    )
    .expect("valid fastapi route regex")
});

impl FrameworkExtractor for PythonWebExtractor {
    fn id(&self) -> &'static str {
        "python_web"
    }

    fn languages(&self) -> &'static [&'static str] {
        &["python"]
    }

    fn extract(&self, content: &str, _path: &str, fragment: &mut ParsedFragment) -> bool {
        let before = fragment.routes.len();

        for caps in FLASK_ROUTE.captures_iter(content) {
            let path = caps[1].to_string();
            let handler = caps[3].to_string();
            let methods: Vec<String> = FLASK_METHODS
                .captures(&caps[2])
                .map(|m| {
                    m[1].split(',')
                        .map(|s| s.trim().trim_matches(|c| c == '\'' || c == '"').to_uppercase())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|| vec!["GET".to_string()]);
            for method in methods {
                fragment.routes.push(Route {
                    method,
                    path: path.clone(),
                    controller: None,
                    action: Some(handler.clone()),
                });
            }
        }

        for caps in FASTAPI_ROUTE.captures_iter(content) {
            fragment.routes.push(Route {
                method: caps[1].to_uppercase(),
                path: caps[2].to_string(),
                controller: None,
                action: Some(caps[3].to_string()),
            });
        }

        fragment.routes.len() > before
    }
}
