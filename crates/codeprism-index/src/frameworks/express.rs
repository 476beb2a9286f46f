//! Node servers: Express-style `app.get('/x', ...)` and NestJS decorators.

use super::FrameworkExtractor;
use codeprism_core::{ParsedFragment, Route};
use once_cell::sync::Lazy;
use regex::Regex;

pub struct ExpressExtractor;

static EXPRESS_ROUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\b(?:app|router|server|api|routes)\s*\.\s*(get|post|put|patch|delete|all)\s*\(\s*['"`]([^'"`]+)['"`]\s*,\s*([\w.]+)?"#,
    )
    .expect("valid express route regex")
});
static NEST_CONTROLLER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@Controller\(\s*(?:['"`]([^'"`]*)['"`])?\s*\)"#).expect("valid nest controller regex")
});
static NEST_ROUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@(Get|Post|Put|Patch|Delete|All)\(\s*(?:['"`]([^'"`]*)['"`])?\s*\)\s*(?:async\s+)?(\w+)?"#)
        .expect("valid nest route regex")
});

impl FrameworkExtractor for ExpressExtractor {
    fn id(&self) -> &'static str {
        "express"
    }

    fn languages(&self) -> &'static [&'static str] {
        &["typescript", "javascript"]
    }

    fn extract(&self, content: &str, _path: &str, fragment: &mut ParsedFragment) -> bool {
        let before = fragment.routes.len();

        for caps in EXPRESS_ROUTE.captures_iter(content) {
            let method = caps[1].to_uppercase();
            fragment.routes.push(Route {
                method: if method == "ALL" { "ANY".into() } else { method },
                path: caps[2].to_string(),
                controller: None,
                action: caps.get(3).map(|m| m.as_str().to_string()),
            });
        }

        if let Some(controller) = NEST_CONTROLLER.captures(content) {
            let prefix = controller
                .get(1)
                .map(|m| m.as_str().trim_matches('/'))
                .unwrap_or("");
            for caps in NEST_ROUTE.captures_iter(content) {
                let method = caps[1].to_uppercase();
                let sub = caps.get(2).map(|m| m.as_str().trim_matches('/')).unwrap_or("");
                let path = [prefix, sub]
                    .iter()
                    .filter(|s| !s.is_empty())
                    .copied()
                    .collect::<Vec<_>>()
                    .join("/");
                fragment.routes.push(Route {
                    method: if method == "ALL" { "ANY".into() } else { method },
                    path: format!("/{path}"),
                    controller: None,
                    action: caps.get(3).map(|m| m.as_str().to_string()),
                });
            }
        }

        fragment.routes.len() > before
    }
}
