//! Rails: ActiveRecord associations and `config/routes.rb` route tables.

use super::{line_of, FrameworkExtractor};
use crate::inflect::{pluralize, singularize};
use codeprism_core::{Association, ParsedFragment, Route};
use once_cell::sync::Lazy;
use regex::Regex;

pub struct RailsExtractor;

impl FrameworkExtractor for RailsExtractor {
    fn id(&self) -> &'static str {
        "rails"
    }

    fn languages(&self) -> &'static [&'static str] {
        &["ruby"]
    }

    fn extract(&self, content: &str, path: &str, fragment: &mut ParsedFragment) -> bool {
        let before = fragment.associations.len() + fragment.routes.len();
        extract_associations(content, fragment);
        if path.ends_with("config/routes.rb") || path.contains("config/routes/") {
            fragment.routes.extend(parse_routes(content));
        }
        fragment.associations.len() + fragment.routes.len() > before
    }
}

// ── Associations ──────────────────────────────────────────────────────────

static ASSOCIATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(has_many|has_one|belongs_to|has_and_belongs_to_many)[ \t(]+:(\w+)([^\n]*)")
        .expect("valid association regex")
});
static CLASS_NAME_OPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"class_name:\s*["']([\w:]+)["']"#).expect("valid class_name regex")
});
static THROUGH_OPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"through:\s*:(\w+)").expect("valid through regex"));
static POLYMORPHIC_OPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"polymorphic:\s*true").expect("valid polymorphic regex"));

fn extract_associations(content: &str, fragment: &mut ParsedFragment) {
    for caps in ASSOCIATION.captures_iter(content) {
        let (Some(whole), Some(kind), Some(name)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let options = caps.get(3).map(|m| m.as_str()).unwrap_or("");
        let line = line_of(content, whole.start());
        // Owner is the innermost class declared above the association.
        let owner = fragment
            .classes
            .iter()
            .filter(|c| c.line <= line)
            .max_by_key(|c| c.line)
            .map(|c| c.name.clone());
        fragment.associations.push(Association {
            kind: kind.as_str().to_string(),
            name: name.as_str().to_string(),
            owner,
            class_name: CLASS_NAME_OPT
                .captures(options)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string()),
            through: THROUGH_OPT
                .captures(options)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string()),
            polymorphic: POLYMORPHIC_OPT.is_match(options),
        });
    }
}

// ── Routes ────────────────────────────────────────────────────────────────

static NAMESPACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:namespace\s+:(\w+)|scope\s+(?:path:\s*)?["']/?([\w/]+)["'])"#)
        .expect("valid namespace regex")
});
static RESOURCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(resources|resource)\s+:(\w+)(.*)$").expect("valid resources regex"));
static VERB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(get|post|put|patch|delete)\s*\(?\s*(?:["']([^"']+)["']|:(\w+))(.*)$"#)
        .expect("valid verb regex")
});
static TARGET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:to:|=>)\s*["']([\w/]+)#(\w+)["']"#).expect("valid route target regex")
});
static ONLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(only|except):\s*(%i\[[^\]]*\]|\[[^\]]*\]|:\w+)").expect("valid only regex")
});
static OPENS_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bdo(\s*\|[^|]*\|)?\s*$").expect("valid block regex"));
static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("valid word regex"));

#[derive(Debug, Clone)]
enum Block {
    Namespace(String),
    Resource { name: String, singular: bool },
    Member,
    Collection,
    Other,
}

/// Parse a Rails route table into concrete (method, path, controller, action) routes.
pub fn parse_routes(content: &str) -> Vec<Route> {
    let mut stack: Vec<Block> = Vec::new();
    let mut routes = Vec::new();

    for raw in content.lines() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        if line == "end" || line.starts_with("end ") {
            stack.pop();
            continue;
        }
        let opens = OPENS_BLOCK.is_match(line);

        if let Some(caps) = NAMESPACE.captures(line) {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            if opens {
                stack.push(Block::Namespace(name));
            }
            continue;
        }

        if let Some(caps) = RESOURCES.captures(line) {
            let singular = &caps[1] == "resource";
            let name = caps[2].to_string();
            let options = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            routes.extend(resource_routes(&stack, &name, singular, options));
            if opens {
                stack.push(Block::Resource { name, singular });
            }
            continue;
        }

        if line.starts_with("member") && opens {
            stack.push(Block::Member);
            continue;
        }
        if line.starts_with("collection") && opens {
            stack.push(Block::Collection);
            continue;
        }

        if let Some(caps) = VERB.captures(line) {
            let method = caps[1].to_uppercase();
            let rest = caps.get(4).map(|m| m.as_str()).unwrap_or("");
            let (segment, default_action) = match (caps.get(2), caps.get(3)) {
                (Some(p), _) => (p.as_str().trim_matches('/').to_string(), None),
                (None, Some(sym)) => (sym.as_str().to_string(), Some(sym.as_str().to_string())),
                _ => continue,
            };
            let (controller, action) = match TARGET.captures(rest) {
                Some(t) => (
                    Some(namespaced(&stack, &t[1])),
                    Some(t[2].to_string()),
                ),
                None => (innermost_controller(&stack), default_action),
            };
            let mut path = route_prefix(&stack);
            if !segment.is_empty() {
                path.push('/');
                path.push_str(&segment);
            }
            routes.push(Route {
                method,
                path: if path.is_empty() { "/".into() } else { path },
                controller,
                action,
            });
            if opens {
                stack.push(Block::Other);
            }
            continue;
        }

        if opens {
            stack.push(Block::Other);
        }
    }

    routes
}

/// Drop a trailing `# comment`, ignoring `#` inside string literals.
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '#') => return &line[..i],
            _ => {}
        }
    }
    line
}

fn resource_routes(stack: &[Block], name: &str, singular: bool, options: &str) -> Vec<Route> {
    let base = format!("{}/{}", route_prefix(stack), name);
    let controller_name = if singular { pluralize(name) } else { name.to_string() };
    let controller = namespaced(stack, &controller_name);
    let (only, except) = action_filters(options);

    let actions: &[(&str, &str, bool)] = if singular {
        &[
            ("show", "GET", false),
            ("create", "POST", false),
            ("update", "PATCH", false),
            ("update", "PUT", false),
            ("destroy", "DELETE", false),
        ]
    } else {
        &[
            ("index", "GET", false),
            ("create", "POST", false),
            ("show", "GET", true),
            ("update", "PATCH", true),
            ("update", "PUT", true),
            ("destroy", "DELETE", true),
        ]
    };

    actions
        .iter()
        .filter(|(action, _, _)| only.as_ref().map_or(true, |o| o.iter().any(|a| a == action)))
        .filter(|(action, _, _)| !except.iter().any(|a| a == action))
        .map(|(action, method, member)| Route {
            method: method.to_string(),
            path: if *member {
                format!("{base}/:id")
            } else {
                base.clone()
            },
            controller: Some(controller.clone()),
            action: Some(action.to_string()),
        })
        .collect()
}

fn action_filters(options: &str) -> (Option<Vec<String>>, Vec<String>) {
    let mut only = None;
    let mut except = Vec::new();
    for caps in ONLY.captures_iter(options) {
        let list = caps[2].trim_start_matches("%i");
        let words: Vec<String> = WORD
            .find_iter(list)
            .map(|m| m.as_str().to_string())
            .collect();
        if &caps[1] == "only" {
            only = Some(words);
        } else {
            except = words;
        }
    }
    (only, except)
}

/// Path prefix contributed by enclosing namespaces and resources.
fn route_prefix(stack: &[Block]) -> String {
    let mut path = String::new();
    for (i, block) in stack.iter().enumerate() {
        match block {
            Block::Namespace(ns) => {
                path.push('/');
                path.push_str(ns);
            }
            Block::Resource { name, singular } => {
                path.push('/');
                path.push_str(name);
                match stack.get(i + 1) {
                    Some(Block::Member) => path.push_str("/:id"),
                    Some(Block::Collection) => {}
                    _ if *singular => {}
                    _ => {
                        path.push_str("/:");
                        path.push_str(&singularize(name));
                        path.push_str("_id");
                    }
                }
            }
            Block::Member | Block::Collection | Block::Other => {}
        }
    }
    path
}

fn namespaced(stack: &[Block], controller: &str) -> String {
    let mut parts: Vec<&str> = stack
        .iter()
        .filter_map(|b| match b {
            Block::Namespace(ns) => Some(ns.as_str()),
            _ => None,
        })
        .collect();
    parts.push(controller);
    parts.join("/")
}

fn innermost_controller(stack: &[Block]) -> Option<String> {
    stack.iter().rev().find_map(|b| match b {
        Block::Resource { name, singular } => Some(namespaced(
            stack,
            &if *singular { pluralize(name) } else { name.clone() },
        )),
        _ => None,
    })
}
