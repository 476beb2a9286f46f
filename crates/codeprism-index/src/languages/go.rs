//! Go structural parser using tree-sitter-go.

use super::{node_text, parse_tree, push_unique, unquote, walk};
use crate::parser::LanguageParser;
use codeprism_core::{ClassInfo, ClassKind, CodeprismError, ParsedFragment};

pub struct GoParser;

impl LanguageParser for GoParser {
    fn id(&self) -> &'static str {
        "go"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn parse(&self, content: &str, path: &str) -> Result<ParsedFragment, CodeprismError> {
        let tree = parse_tree(tree_sitter_go::LANGUAGE.into(), content, path)?;
        let source = content.as_bytes();
        let mut fragment = ParsedFragment::empty(self.id());
        let is_test_file = path.ends_with("_test.go");

        walk(tree.root_node(), &mut |n| match n.kind() {
            "import_spec" => {
                if let Some(p) = n.child_by_field_name("path") {
                    push_unique(&mut fragment.imports, unquote(node_text(p, source)));
                }
                false
            }
            "type_spec" => {
                let Some(name) = n.child_by_field_name("name") else {
                    return false;
                };
                let name = node_text(name, source).to_string();
                let kind = match n.child_by_field_name("type").map(|t| t.kind()) {
                    Some("interface_type") => ClassKind::Interface,
                    Some("struct_type") if is_test_file => ClassKind::Test,
                    Some("struct_type") => ClassKind::Class,
                    _ => return false,
                };
                if is_exported(&name) {
                    push_unique(&mut fragment.exports, name.clone());
                }
                fragment.classes.push(ClassInfo {
                    name,
                    parent: None,
                    kind,
                    line: n.start_position().row + 1,
                });
                false
            }
            "function_declaration" | "method_declaration" => {
                if let Some(name) = n.child_by_field_name("name") {
                    let name = node_text(name, source);
                    if is_test_file && name.starts_with("Test") {
                        fragment.classes.push(ClassInfo {
                            name: name.to_string(),
                            parent: None,
                            kind: ClassKind::Test,
                            line: n.start_position().row + 1,
                        });
                    } else if n.kind() == "function_declaration" && is_exported(name) {
                        push_unique(&mut fragment.exports, name.to_string());
                    }
                }
                false
            }
            _ => true,
        });

        Ok(fragment)
    }
}

fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouped_and_single_imports() {
        let src = r#"
package billing

import "fmt"
import (
    "net/http"
    inv "github.com/acme/platform/internal/invoice"
)

type Service struct{}
type Store interface{ Get() }
type ID int

func NewService() *Service { return &Service{} }
func helper() {}
"#;
        let fragment = GoParser.parse(src, "internal/billing/service.go").unwrap();
        assert_eq!(
            fragment.imports,
            vec!["fmt", "net/http", "github.com/acme/platform/internal/invoice"]
        );
        let kinds: Vec<_> = fragment.classes.iter().map(|c| (c.name.as_str(), c.kind)).collect();
        assert_eq!(
            kinds,
            vec![("Service", ClassKind::Class), ("Store", ClassKind::Interface)]
        );
        assert_eq!(fragment.exports, vec!["Service", "Store", "NewService"]);
    }

    #[test]
    fn test_functions_are_tagged_in_test_files() {
        let src = "package billing\n\nfunc TestTotal(t *testing.T) {}\n";
        let fragment = GoParser.parse(src, "internal/billing/service_test.go").unwrap();
        assert_eq!(fragment.classes.len(), 1);
        assert_eq!(fragment.classes[0].kind, ClassKind::Test);
    }
}
