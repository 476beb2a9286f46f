//! codeprism-index: parsing, role classification and graph construction.
//!
//! Source files go through tree-sitter grammars (Ruby, Python, TypeScript,
//! JavaScript, Go) into a [`ParsedFragment`](codeprism_core::ParsedFragment),
//! framework extractors enrich the fragment with routes, associations and
//! outbound API calls, and [`build_graph`] links everything into file edges.
//!
//! - **parser**: extension dispatch and the never-failing [`parse_file`]
//! - **languages**: per-grammar structure extraction
//! - **frameworks**: Rails, Express/NestJS, Flask/FastAPI, Go routers, HTTP clients
//! - **classifier**: file roles, before and after the graph exists
//! - **builder**: import, inheritance, association and API-endpoint edges

pub mod builder;
pub mod classifier;
pub mod endpoints;
pub mod frameworks;
pub mod inflect;
pub mod languages;
pub mod parser;

pub use builder::{build_graph, GraphBuilder};
pub use classifier::{apply_graph_roles, classify_role};
pub use parser::{language_for_path, parse_file, parser_for_path, supports_extension, LanguageParser};
