//! Branch classification and branch-name context extraction.

use codeprism_core::{BranchContext, SyncLevel};
use once_cell::sync::Lazy;
use regex::Regex;

const FULL_NAMES: &[&str] = &[
    "main", "master", "develop", "development", "staging", "stage", "production", "prod", "release",
];
const FULL_PREFIXES: &[&str] = &["release/", "hotfix/", "epic/"];
const LIGHTWEIGHT_PREFIXES: &[&str] = &["feature/", "fix/", "bugfix/", "chore/", "refactor/"];
const EPIC_PREFIX: &str = "epic/";
/// Prefixes stripped before building the context hint.
const CATEGORY_PREFIXES: &[&str] = &[
    "feature/", "feat/", "fix/", "bugfix/", "hotfix/", "chore/", "refactor/", "release/", "epic/",
];

static TICKET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Za-z]{2,}-\d+)").expect("valid ticket regex"));

/// A path segment that is `demo`, starts with `demo-`/`demo_` or ends with
/// `-demo`/`_demo` (`demo/x`, `demo-orlando`, `client_demo`).
fn is_demo(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.split('/').any(|seg| {
        seg == "demo"
            || seg.starts_with("demo-")
            || seg.starts_with("demo_")
            || seg.ends_with("-demo")
            || seg.ends_with("_demo")
    })
}

/// How much work a branch switch to `name` is worth.
///
/// `epic/` wins over the demo rule; every other full name or prefix does not.
pub fn classify_branch(name: &str) -> SyncLevel {
    let lower = name.trim().to_lowercase();
    if lower.starts_with(EPIC_PREFIX) {
        return SyncLevel::Full;
    }
    if is_demo(&lower) {
        return SyncLevel::Skip;
    }
    if FULL_NAMES.contains(&lower.as_str()) || FULL_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return SyncLevel::Full;
    }
    if LIGHTWEIGHT_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return SyncLevel::Lightweight;
    }
    SyncLevel::Lightweight
}

fn humanize(s: &str) -> String {
    s.split(|c: char| c == '-' || c == '_' || c == '/' || c == '.')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn epic_name(branch: &str) -> Option<String> {
    let rest = branch.strip_prefix(EPIC_PREFIX)?;
    let epic = humanize(rest);
    (!epic.is_empty()).then_some(epic)
}

/// Ticket id, epic and a readable hint for `branch`. The epic comes from
/// `branch` or, failing that, from the branch being left.
pub fn extract_branch_context(branch: &str, previous: Option<&str>) -> BranchContext {
    let branch = branch.trim();
    let ticket = TICKET_RE.find(branch).map(|m| m.as_str().to_uppercase());

    let epic_branch = epic_name(branch).or_else(|| previous.and_then(|p| epic_name(p.trim())));

    let mut rest = branch;
    if let Some(prefix) = CATEGORY_PREFIXES.iter().find(|p| rest.to_lowercase().starts_with(*p)) {
        rest = &rest[prefix.len()..];
    }
    let without_ticket = match TICKET_RE.find(rest) {
        Some(m) => format!("{}{}", &rest[..m.start()], &rest[m.end()..]),
        None => rest.to_string(),
    };

    BranchContext {
        ticket_id: ticket,
        context_hint: humanize(&without_ticket),
        epic_branch,
    }
}
