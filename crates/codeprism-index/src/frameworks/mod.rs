//! Framework-specific extractors.
//!
//! These run after the language parser and add framework knowledge the grammar
//! alone cannot see: ORM associations, route tables and outbound HTTP calls.
//! Extraction is pattern-based; each extractor declares which languages it reads.

pub mod express;
pub mod go_http;
pub mod http_client;
pub mod python_web;
pub mod rails;

use codeprism_core::ParsedFragment;

/// Enriches a parsed fragment with framework-level structure.
pub trait FrameworkExtractor: Send + Sync {
    /// Identifier recorded in `ParsedFragment::frameworks` when something is found.
    fn id(&self) -> &'static str;

    /// Languages (parser ids) this extractor reads.
    fn languages(&self) -> &'static [&'static str];

    /// Add findings to `fragment`. Returns whether anything was found.
    fn extract(&self, content: &str, path: &str, fragment: &mut ParsedFragment) -> bool;
}

/// Every registered framework extractor, in application order.
pub static EXTRACTORS: &[&dyn FrameworkExtractor] = &[
    &rails::RailsExtractor,
    &express::ExpressExtractor,
    &python_web::PythonWebExtractor,
    &go_http::GoHttpExtractor,
    &http_client::HttpClientExtractor,
];

/// Run every extractor that applies to the fragment's language.
pub fn enrich(content: &str, path: &str, fragment: &mut ParsedFragment) {
    for extractor in EXTRACTORS {
        if !extractor.languages().contains(&fragment.language.as_str()) {
            continue;
        }
        if extractor.extract(content, path, fragment)
            && !fragment.frameworks.iter().any(|f| f == extractor.id())
        {
            fragment.frameworks.push(extractor.id().to_string());
        }
    }
}

/// 1-based line number of a byte offset.
pub(crate) fn line_of(content: &str, offset: usize) -> usize {
    content[..offset.min(content.len())].matches('\n').count() + 1
}
