//! Python structural parser using tree-sitter-python.

use super::{node_text, parse_tree, push_unique, walk};
use crate::parser::LanguageParser;
use codeprism_core::{ClassInfo, ClassKind, CodeprismError, ParsedFragment};
use tree_sitter::Node;

pub struct PythonParser;

impl LanguageParser for PythonParser {
    fn id(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn parse(&self, content: &str, path: &str) -> Result<ParsedFragment, CodeprismError> {
        let tree = parse_tree(tree_sitter_python::LANGUAGE.into(), content, path)?;
        let source = content.as_bytes();
        let mut fragment = ParsedFragment::empty(self.id());
        let root = tree.root_node();

        walk(root, &mut |n| match n.kind() {
            "import_statement" => {
                let mut cursor = n.walk();
                for child in n.named_children(&mut cursor) {
                    let module = match child.kind() {
                        "dotted_name" => Some(child),
                        "aliased_import" => child.child_by_field_name("name"),
                        _ => None,
                    };
                    if let Some(module) = module {
                        push_unique(&mut fragment.imports, node_text(module, source).to_string());
                    }
                }
                false
            }
            "import_from_statement" => {
                extract_from_import(n, source, &mut fragment.imports);
                false
            }
            "class_definition" => {
                if let Some(class) = extract_class(n, source) {
                    if is_top_level(n) && !class.name.starts_with('_') {
                        push_unique(&mut fragment.exports, class.name.clone());
                    }
                    fragment.classes.push(class);
                }
                true
            }
            "function_definition" => {
                if is_top_level(n) {
                    if let Some(name) = n.child_by_field_name("name") {
                        let name = node_text(name, source);
                        if !name.starts_with('_') {
                            push_unique(&mut fragment.exports, name.to_string());
                        }
                    }
                }
                false
            }
            _ => true,
        });

        Ok(fragment)
    }
}

/// `from .models import Patient` records `.models`; `from . import views`
/// records `.views` so that sibling-module imports still resolve to a file.
fn extract_from_import(node: Node, source: &[u8], imports: &mut Vec<String>) {
    let Some(module) = node.child_by_field_name("module_name") else {
        return;
    };
    let module_text = node_text(module, source);
    if !module_text.is_empty() && module_text.chars().all(|c| c == '.') {
        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            let name_node = if name.kind() == "aliased_import" {
                name.child_by_field_name("name")
            } else {
                Some(name)
            };
            if let Some(name_node) = name_node {
                push_unique(
                    imports,
                    format!("{module_text}{}", node_text(name_node, source)),
                );
            }
        }
    } else {
        push_unique(imports, module_text.to_string());
    }
}

fn extract_class(node: Node, source: &[u8]) -> Option<ClassInfo> {
    let name = node_text(node.child_by_field_name("name")?, source).to_string();
    let parent = node.child_by_field_name("superclasses").and_then(|args| {
        let mut cursor = args.walk();
        let first = args
            .named_children(&mut cursor)
            .find(|c| matches!(c.kind(), "identifier" | "attribute"))
            .map(|c| node_text(c, source).to_string());
        first
    });
    let kind = class_kind(&name, parent.as_deref());
    Some(ClassInfo {
        name,
        parent,
        kind,
        line: node.start_position().row + 1,
    })
}

fn class_kind(name: &str, parent: Option<&str>) -> ClassKind {
    let parent = parent.unwrap_or("");
    if name.starts_with("Test") || parent.ends_with("TestCase") {
        ClassKind::Test
    } else if matches!(
        parent,
        "models.Model" | "Model" | "db.Model" | "Base" | "DeclarativeBase" | "SQLModel"
    ) {
        ClassKind::Model
    } else if parent.ends_with("View") || parent.ends_with("ViewSet") {
        ClassKind::Controller
    } else {
        ClassKind::Class
    }
}

fn is_top_level(node: Node) -> bool {
    let mut parent = node.parent();
    while let Some(p) = parent {
        match p.kind() {
            "module" => return true,
            "decorated_definition" => parent = p.parent(),
            _ => return false,
        }
    }
    false
}
