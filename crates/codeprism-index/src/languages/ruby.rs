//! Ruby structural parser using tree-sitter-ruby.

use super::{node_text, parse_tree, push_unique, unquote, walk};
use crate::parser::LanguageParser;
use codeprism_core::{ClassInfo, ClassKind, CodeprismError, ParsedFragment};
use tree_sitter::Node;

pub struct RubyParser;

impl LanguageParser for RubyParser {
    fn id(&self) -> &'static str {
        "ruby"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["rb", "rake"]
    }

    fn parse(&self, content: &str, path: &str) -> Result<ParsedFragment, CodeprismError> {
        let tree = parse_tree(tree_sitter_ruby::LANGUAGE.into(), content, path)?;
        let source = content.as_bytes();
        let mut fragment = ParsedFragment::empty(self.id());
        collect(tree.root_node(), source, &[], &mut fragment);
        Ok(fragment)
    }
}

fn collect(node: Node, source: &[u8], scope: &[String], out: &mut ParsedFragment) {
    walk(node, &mut |n| match n.kind() {
        "class" | "module" => {
            let Some(name_node) = n.child_by_field_name("name") else {
                return true;
            };
            let name = qualified(scope, node_text(name_node, source));
            let parent = n
                .child_by_field_name("superclass")
                .and_then(|s| s.named_child(0))
                .map(|p| node_text(p, source).to_string());
            let kind = if n.kind() == "module" {
                ClassKind::Module
            } else {
                class_kind(&name, parent.as_deref())
            };
            if scope.is_empty() {
                push_unique(&mut out.exports, name.clone());
            }
            out.classes.push(ClassInfo {
                name: name.clone(),
                parent,
                kind,
                line: n.start_position().row + 1,
            });
            if let Some(body) = n.child_by_field_name("body") {
                let mut inner = scope.to_vec();
                inner.push(name);
                collect(body, source, &inner, out);
            }
            false
        }
        "call" => {
            handle_call(n, source, out);
            true
        }
        "method" | "singleton_method" => false,
        _ => true,
    });
}

fn handle_call(node: Node, source: &[u8], out: &mut ParsedFragment) {
    let Some(method) = node.child_by_field_name("method") else {
        return;
    };
    let receiver = node
        .child_by_field_name("receiver")
        .map(|r| node_text(r, source));
    match (receiver, node_text(method, source)) {
        (None, "require") => {
            if let Some(target) = first_string_argument(node, source) {
                push_unique(&mut out.imports, target);
            }
        }
        (None, "require_relative") => {
            if let Some(target) = first_string_argument(node, source) {
                let target = if target.starts_with('.') {
                    target
                } else {
                    format!("./{target}")
                };
                push_unique(&mut out.imports, target);
            }
        }
        (None | Some("RSpec"), "describe") => {
            let subject = node
                .child_by_field_name("arguments")
                .and_then(|args| args.named_child(0))
                .map(|arg| unquote(node_text(arg, source)))
                .unwrap_or_else(|| "spec".to_string());
            out.classes.push(ClassInfo {
                name: subject,
                parent: None,
                kind: ClassKind::Test,
                line: node.start_position().row + 1,
            });
        }
        _ => {}
    }
}

fn first_string_argument(node: Node, source: &[u8]) -> Option<String> {
    let args = node.child_by_field_name("arguments")?;
    let first = args.named_child(0)?;
    (first.kind() == "string").then(|| unquote(node_text(first, source)))
}

fn class_kind(name: &str, parent: Option<&str>) -> ClassKind {
    let parent = parent.unwrap_or("");
    if name.ends_with("Test")
        || name.ends_with("Spec")
        || parent.contains("TestCase")
        || parent.ends_with("Test")
    {
        ClassKind::Test
    } else if parent.ends_with("ApplicationRecord") || parent == "ActiveRecord::Base" {
        ClassKind::Model
    } else if name.ends_with("Controller") || parent.ends_with("Controller") {
        ClassKind::Controller
    } else {
        ClassKind::Class
    }
}

fn qualified(scope: &[String], name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}::{}", scope.join("::"), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> ParsedFragment {
        RubyParser.parse(src, "app/models/patient.rb").unwrap()
    }

    #[test]
    fn extracts_model_class_and_parent() {
        let fragment = parse(
            r#"
class Patient < ApplicationRecord
  has_many :appointments
  def full_name
    require "never_seen"
  end
end
"#,
        );
        assert_eq!(fragment.language, "ruby");
        assert_eq!(fragment.classes.len(), 1, "{:#?}", fragment.classes);
        let class = &fragment.classes[0];
        assert_eq!(class.name, "Patient");
        assert_eq!(class.parent.as_deref(), Some("ApplicationRecord"));
        assert_eq!(class.kind, ClassKind::Model);
        assert_eq!(class.line, 2);
        assert_eq!(fragment.exports, vec!["Patient".to_string()]);
        assert!(fragment.imports.is_empty());
    }

    #[test]
    fn nested_modules_qualify_names() {
        let fragment = parse(
            r#"
module Billing
  class InvoicesController < ApplicationController
  end
end
"#,
        );
        let names: Vec<_> = fragment.classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Billing", "Billing::InvoicesController"]);
        assert_eq!(fragment.classes[0].kind, ClassKind::Module);
        assert_eq!(fragment.classes[1].kind, ClassKind::Controller);
        assert_eq!(fragment.exports, vec!["Billing".to_string()]);
    }

    #[test]
    fn requires_become_imports() {
        let fragment = parse(
            r#"
require "json"
require 'billing/invoice'
require_relative "helpers/money"
require_relative "../support/time"
"#,
        );
        assert_eq!(
            fragment.imports,
            vec!["json", "billing/invoice", "./helpers/money", "../support/time"]
        );
    }

    #[test]
    fn test_classes_and_specs_are_tagged() {
        let fragment = parse(
            r#"
class PatientTest < ActiveSupport::TestCase
end
RSpec.describe Patient do
end
"#,
        );
        assert!(fragment.classes.iter().all(|c| c.kind == ClassKind::Test));
        assert_eq!(fragment.classes.len(), 2);
    }

    #[test]
    fn singleton_class_without_body_is_fine() {
        let fragment = parse("class Empty; end\n");
        assert_eq!(fragment.classes[0].name, "Empty");
        assert_eq!(fragment.classes[0].parent, None);
    }
}
