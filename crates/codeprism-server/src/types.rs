use codeprism_core::Card;
use codeprism_search::ScoredCard;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub limit: Option<usize>,
    pub branch: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    /// Whether the results came straight from the search cache.
    #[serde(rename = "cacheHit")]
    pub cache_hit: bool,
}

#[derive(Debug, Serialize)]
pub struct SearchResultItem {
    pub id: String,
    pub title: String,
    pub flow: String,
    pub card_type: String,
    pub score: f64,
    pub source: String,
    pub source_files: Vec<String>,
    pub content: String,
}

impl From<ScoredCard> for SearchResultItem {
    fn from(hit: ScoredCard) -> Self {
        let Card {
            id,
            title,
            flow,
            card_type,
            source_files,
            content,
            ..
        } = hit.card;
        Self {
            id,
            title,
            flow,
            card_type: card_type.to_string(),
            score: hit.score,
            source: hit.source.to_string(),
            source_files,
            content,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CardsQuery {
    pub flow: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
