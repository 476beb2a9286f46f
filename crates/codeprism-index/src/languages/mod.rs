//! Language parser registry.
//!
//! Each language implements [`LanguageParser`](crate::parser::LanguageParser) and is
//! listed in [`PARSERS`]. Lookup is by file extension.

pub mod go;
pub mod python;
pub mod ruby;
pub mod typescript;

use crate::parser::LanguageParser;
use codeprism_core::CodeprismError;
use tree_sitter::{Node, Parser, Tree};

/// Every registered language parser.
pub static PARSERS: &[&dyn LanguageParser] = &[
    &ruby::RubyParser,
    &python::PythonParser,
    &typescript::TypeScriptParser,
    &typescript::JavaScriptParser,
    &go::GoParser,
];

// ── Shared tree-sitter helpers ─────────────────────────────────────────────

pub(crate) fn parse_tree(
    language: tree_sitter::Language,
    content: &str,
    path: &str,
) -> Result<Tree, CodeprismError> {
    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .map_err(|e| CodeprismError::parse(path, e.to_string()))?;
    parser
        .parse(content, None)
        .ok_or_else(|| CodeprismError::parse(path, "parser produced no tree"))
}

pub(crate) fn node_text<'a>(node: Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

/// Strip one layer of matching quotes (`"`, `'` or `` ` ``).
pub(crate) fn unquote(text: &str) -> String {
    let t = text.trim();
    for q in ['"', '\'', '`'] {
        if t.len() >= 2 && t.starts_with(q) && t.ends_with(q) {
            return t[1..t.len() - 1].to_string();
        }
    }
    t.to_string()
}

/// Depth-first walk over named nodes. `visit` returns whether to descend.
pub(crate) fn walk<'t>(node: Node<'t>, visit: &mut dyn FnMut(Node<'t>) -> bool) {
    if !visit(node) {
        return;
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        walk(child, visit);
    }
}

/// First named child of `node` with the given kind.
pub(crate) fn named_child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).find(|c| c.kind() == kind);
    found
}

pub(crate) fn push_unique(list: &mut Vec<String>, value: String) {
    if !value.is_empty() && !list.contains(&value) {
        list.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_extension_is_claimed_once() {
        let mut seen = std::collections::HashSet::new();
        for parser in PARSERS {
            for ext in parser.extensions() {
                assert!(seen.insert(*ext), "extension {ext} registered twice");
            }
        }
        assert!(seen.contains("rb"));
        assert!(seen.contains("tsx"));
    }

    #[test]
    fn unquote_handles_all_quote_styles() {
        assert_eq!(unquote("\"json\""), "json");
        assert_eq!(unquote("'./a'"), "./a");
        assert_eq!(unquote("`/api`"), "/api");
        assert_eq!(unquote("bare"), "bare");
        assert_eq!(unquote("\""), "\"");
    }
}
