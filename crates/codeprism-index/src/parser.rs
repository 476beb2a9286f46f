//! Parsing coordinator.
//!
//! Selects a language parser by file extension, runs it, then lets every
//! applicable framework extractor enrich the result. A failing parser never
//! aborts the caller: the file comes back with empty structural fields.

use crate::frameworks;
use crate::languages::PARSERS;
use codeprism_core::{CodeprismError, ParsedFragment};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::Path;

/// Structural parser for one language.
pub trait LanguageParser: Send + Sync {
    /// Stable language identifier recorded on parsed files (e.g. "ruby").
    fn id(&self) -> &'static str;

    /// File extensions handled, without the dot.
    fn extensions(&self) -> &'static [&'static str];

    /// Extract classes, imports and exports from raw content.
    fn parse(&self, content: &str, path: &str) -> Result<ParsedFragment, CodeprismError>;
}

static BY_EXTENSION: Lazy<HashMap<&'static str, &'static dyn LanguageParser>> = Lazy::new(|| {
    PARSERS
        .iter()
        .flat_map(|p| p.extensions().iter().map(move |ext| (*ext, *p)))
        .collect()
});

/// Non-code files that are still indexed so that document invalidation sees them.
const PLAIN_LANGUAGES: &[(&str, &str)] = &[
    ("css", "css"),
    ("scss", "css"),
    ("sass", "css"),
    ("less", "css"),
    ("json", "json"),
    ("yml", "yaml"),
    ("yaml", "yaml"),
    ("toml", "toml"),
    ("sql", "sql"),
    ("prisma", "prisma"),
    ("erb", "erb"),
    ("md", "markdown"),
];

fn extension(path: &str) -> Option<&str> {
    Path::new(path).extension().and_then(|e| e.to_str())
}

/// The parser registered for `path`'s extension, if any.
pub fn parser_for_path(path: &str) -> Option<&'static dyn LanguageParser> {
    let ext = extension(path)?;
    BY_EXTENSION.get(ext.to_lowercase().as_str()).copied()
}

/// Language identifier for a path, including non-code files.
pub fn language_for_path(path: &str) -> &'static str {
    if let Some(parser) = parser_for_path(path) {
        return parser.id();
    }
    let ext = extension(path).map(|e| e.to_lowercase()).unwrap_or_default();
    PLAIN_LANGUAGES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, lang)| *lang)
        .unwrap_or("unknown")
}

pub fn supports_extension(ext: &str) -> bool {
    BY_EXTENSION.contains_key(ext)
}

/// Parse one file into a structural fragment.
///
/// Never fails: unsupported extensions and parser errors yield an empty fragment
/// tagged with the detected language.
pub fn parse_file(content: &str, path: &str) -> ParsedFragment {
    let language = language_for_path(path);
    let mut fragment = match parser_for_path(path) {
        Some(parser) => parser.parse(content, path).unwrap_or_else(|e| {
            tracing::warn!("Parse failed, indexing without structure: {e}");
            ParsedFragment::empty(language)
        }),
        None => ParsedFragment::empty(language),
    };
    frameworks::enrich(content, path, &mut fragment);
    fragment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_parser_by_extension() {
        assert_eq!(parser_for_path("app/models/a.rb").map(|p| p.id()), Some("ruby"));
        assert_eq!(parser_for_path("src/A.TSX").map(|p| p.id()), Some("typescript"));
        assert_eq!(parser_for_path("web/app.mjs").map(|p| p.id()), Some("javascript"));
        assert!(parser_for_path("Gemfile").is_none());
        assert!(supports_extension("go"));
        assert!(!supports_extension("xyz"));
    }

    #[test]
    fn plain_files_get_a_language_but_no_structure() {
        let fragment = parse_file("body { color: red; }", "app/assets/site.scss");
        assert_eq!(fragment.language, "css");
        assert!(fragment.classes.is_empty());
        assert_eq!(language_for_path("db/schema.prisma"), "prisma");
        assert_eq!(language_for_path("LICENSE"), "unknown");
    }

    #[test]
    fn malformed_source_still_yields_a_fragment() {
        let fragment = parse_file("class (((( end end end", "app/models/broken.rb");
        assert_eq!(fragment.language, "ruby");
    }
}
