//! codeprism-search: hybrid retrieval over cards.
//!
//! Pipeline per query: cache lookup, optional HyDE rewrite, FTS5 keyword
//! search, vector search (with repository-aware query prefixing), weighted
//! reciprocal-rank fusion, one-hop graph expansion, rerank. The retrieval tools
//! (`context`, `ticket_files`, `save_insight`, `list_flows`) sit on top.

pub mod cache;
pub mod classify;
pub mod engine;
pub mod expand;
pub mod fusion;
pub mod query;
pub mod tools;

use codeprism_core::Card;
use serde::Serialize;

pub use cache::{CacheKey, CacheStats, SearchCache};
pub use classify::{RepoCentroids, RepoClassification};
pub use engine::SearchEngine;
pub use fusion::FusionWeights;
pub use query::{build_hyde_query, build_semantic_query, normalize_query};
pub use tools::{ContextBundle, FileScore};

/// Which stage produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Cache,
    Keyword,
    Vector,
    Hybrid,
    Graph,
}

impl ResultSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Keyword => "keyword",
            Self::Vector => "vector",
            Self::Hybrid => "hybrid",
            Self::Graph => "graph",
        }
    }
}

impl std::fmt::Display for ResultSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A card with its final relevance score in [0, 1].
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCard {
    pub card: Card,
    pub score: f64,
    pub source: ResultSource,
}
