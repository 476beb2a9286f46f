//! TypeScript / JavaScript structural parser using tree-sitter-typescript.
//!
//! `.ts` files use the TypeScript grammar; `.tsx` and all JavaScript flavours use
//! the TSX grammar, which accepts JSX and plain JavaScript.

use super::{named_child_of_kind, node_text, parse_tree, push_unique, unquote, walk};
use crate::parser::LanguageParser;
use codeprism_core::{ClassInfo, ClassKind, CodeprismError, ParsedFragment};
use tree_sitter::Node;

pub struct TypeScriptParser;

impl LanguageParser for TypeScriptParser {
    fn id(&self) -> &'static str {
        "typescript"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ts", "tsx", "mts", "cts"]
    }

    fn parse(&self, content: &str, path: &str) -> Result<ParsedFragment, CodeprismError> {
        let language = if path.ends_with(".tsx") {
            tree_sitter_typescript::LANGUAGE_TSX
        } else {
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT
        };
        extract(self.id(), language.into(), content, path)
    }
}

pub struct JavaScriptParser;

impl LanguageParser for JavaScriptParser {
    fn id(&self) -> &'static str {
        "javascript"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["js", "jsx", "mjs", "cjs"]
    }

    fn parse(&self, content: &str, path: &str) -> Result<ParsedFragment, CodeprismError> {
        extract(
            self.id(),
            tree_sitter_typescript::LANGUAGE_TSX.into(),
            content,
            path,
        )
    }
}

fn extract(
    id: &str,
    language: tree_sitter::Language,
    content: &str,
    path: &str,
) -> Result<ParsedFragment, CodeprismError> {
    let tree = parse_tree(language, content, path)?;
    let source = content.as_bytes();
    let mut fragment = ParsedFragment::empty(id);

    walk(tree.root_node(), &mut |n| match n.kind() {
        "import_statement" => {
            if let Some(src) = n.child_by_field_name("source") {
                push_unique(&mut fragment.imports, unquote(node_text(src, source)));
            }
            false
        }
        "export_statement" => {
            extract_export(n, source, &mut fragment);
            true
        }
        "class_declaration" | "abstract_class_declaration" | "class" => {
            if let Some(class) = extract_class(n, source) {
                fragment.classes.push(class);
            }
            true
        }
        "interface_declaration" => {
            if let Some(name) = n.child_by_field_name("name") {
                fragment.classes.push(ClassInfo {
                    name: node_text(name, source).to_string(),
                    parent: None,
                    kind: ClassKind::Interface,
                    line: n.start_position().row + 1,
                });
            }
            false
        }
        "call_expression" => {
            handle_call(n, source, &mut fragment);
            true
        }
        _ => true,
    });

    Ok(fragment)
}

fn extract_export(node: Node, source: &[u8], out: &mut ParsedFragment) {
    // Re-exports (`export * from './x'`) are dependencies as well.
    if let Some(src) = node.child_by_field_name("source") {
        push_unique(&mut out.imports, unquote(node_text(src, source)));
    }
    if let Some(decl) = node.child_by_field_name("declaration") {
        match decl.kind() {
            "lexical_declaration" | "variable_declaration" => {
                let mut cursor = decl.walk();
                for declarator in decl.named_children(&mut cursor) {
                    if let Some(name) = declarator.child_by_field_name("name") {
                        push_unique(&mut out.exports, node_text(name, source).to_string());
                    }
                }
            }
            _ => {
                if let Some(name) = decl.child_by_field_name("name") {
                    push_unique(&mut out.exports, node_text(name, source).to_string());
                }
            }
        }
    }
    if let Some(clause) = named_child_of_kind(node, "export_clause") {
        let mut cursor = clause.walk();
        for spec in clause.named_children(&mut cursor) {
            let exported = spec
                .child_by_field_name("alias")
                .or_else(|| spec.child_by_field_name("name"));
            if let Some(exported) = exported {
                push_unique(&mut out.exports, node_text(exported, source).to_string());
            }
        }
    }
    if node.child_by_field_name("declaration").is_none()
        && node.child_by_field_name("value").is_some()
    {
        push_unique(&mut out.exports, "default".to_string());
    }
}

fn extract_class(node: Node, source: &[u8]) -> Option<ClassInfo> {
    let name = node_text(node.child_by_field_name("name")?, source).to_string();
    let parent = named_child_of_kind(node, "class_heritage")
        .and_then(|heritage| named_child_of_kind(heritage, "extends_clause"))
        .and_then(|extends| {
            extends
                .child_by_field_name("value")
                .or_else(|| extends.named_child(0))
        })
        .map(|p| node_text(p, source).to_string());
    let kind = match parent.as_deref() {
        Some(p) if p.ends_with("Component") || p.ends_with("PureComponent") => {
            ClassKind::Component
        }
        Some(p) if p.ends_with("BaseEntity") || p == "Model" => ClassKind::Model,
        _ if name.ends_with("Controller") => ClassKind::Controller,
        _ => ClassKind::Class,
    };
    Some(ClassInfo {
        name,
        parent,
        kind,
        line: node.start_position().row + 1,
    })
}

fn handle_call(node: Node, source: &[u8], out: &mut ParsedFragment) {
    let Some(function) = node.child_by_field_name("function") else {
        return;
    };
    let first_string = || {
        node.child_by_field_name("arguments")
            .and_then(|args| args.named_child(0))
            .filter(|arg| matches!(arg.kind(), "string" | "template_string"))
            .map(|arg| unquote(node_text(arg, source)))
    };
    match (function.kind(), node_text(function, source)) {
        ("identifier", "require") | ("import", _) => {
            if let Some(target) = first_string() {
                push_unique(&mut out.imports, target);
            }
        }
        ("identifier", "describe") => {
            // Only top-level suites mark the file as a test file.
            if is_top_level_statement(node) {
                out.classes.push(ClassInfo {
                    name: first_string().unwrap_or_else(|| "suite".to_string()),
                    parent: None,
                    kind: ClassKind::Test,
                    line: node.start_position().row + 1,
                });
            }
        }
        _ => {}
    }
}

fn is_top_level_statement(node: Node) -> bool {
    node.parent()
        .filter(|p| p.kind() == "expression_statement")
        .and_then(|p| p.parent())
        .is_some_and(|p| p.kind() == "program")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imports_from_all_forms() {
        let src = r#"
import React from "react";
import { api } from './lib/api';
export * from "../shared/types";
const legacy = require('./legacy');
const Lazy = React.lazy(() => import("./pages/Billing"));
"#;
        let fragment = TypeScriptParser.parse(src, "src/App.tsx").unwrap();
        assert_eq!(
            fragment.imports,
            vec![
                "react",
                "./lib/api",
                "../shared/types",
                "./legacy",
                "./pages/Billing"
            ]
        );
    }

    #[test]
    fn classes_interfaces_and_exports() {
        let src = r#"
export interface Invoice { id: number }
export class InvoiceList extends React.Component<Props> {}
export function formatTotal(n: number): string { return `${n}`; }
export const TAX = 0.2, FEE = 1;
class Internal {}
export { Internal as Hidden };
"#;
        let fragment = TypeScriptParser.parse(src, "src/invoices.ts").unwrap();
        assert_eq!(fragment.language, "typescript");
        let kinds: Vec<_> = fragment.classes.iter().map(|c| (c.name.as_str(), c.kind)).collect();
        assert!(kinds.contains(&("Invoice", ClassKind::Interface)));
        assert!(kinds.contains(&("InvoiceList", ClassKind::Component)));
        assert!(kinds.contains(&("Internal", ClassKind::Class)));
        for name in ["Invoice", "InvoiceList", "formatTotal", "TAX", "FEE", "Hidden"] {
            assert!(
                fragment.exports.iter().any(|e| e == name),
                "missing export {name}: {:#?}",
                fragment.exports
            );
        }
    }

    #[test]
    fn top_level_describe_marks_test() {
        let src = r#"
describe("billing", () => {
  describe("nested", () => {});
  it("works", () => {});
});
"#;
        let fragment = JavaScriptParser.parse(src, "src/billing.test.js").unwrap();
        assert_eq!(fragment.language, "javascript");
        assert_eq!(fragment.classes.len(), 1);
        assert_eq!(fragment.classes[0].kind, ClassKind::Test);
        assert_eq!(fragment.classes[0].name, "billing");
    }

    #[test]
    fn jsx_parses_with_javascript_parser() {
        let src = r#"
import Button from "./Button";
export default function App() { return <Button label="x" />; }
"#;
        let fragment = JavaScriptParser.parse(src, "src/App.jsx").unwrap();
        assert_eq!(fragment.imports, vec!["./Button"]);
        assert!(fragment.exports.contains(&"App".to_string()));
    }
}
