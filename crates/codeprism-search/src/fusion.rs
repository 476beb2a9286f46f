//! Weighted reciprocal-rank fusion of keyword and vector rankings.
//!
//! `score = w_kw / (k + rank_kw) + w_vec / (k + rank_vec)` with 1-based ranks;
//! a card missing from one list gets nothing from it.

use crate::{ResultSource, ScoredCard};
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub keyword: f64,
    pub vector: f64,
    pub rrf_k: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            keyword: 0.4,
            vector: 0.6,
            rrf_k: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fused {
    pub card_id: String,
    pub score: f64,
    pub source: ResultSource,
}

/// Fuse two ranked id lists (best first). Output is ordered by score, then id.
pub fn fuse(keyword: &[String], vector: &[String], weights: FusionWeights) -> Vec<Fused> {
    let mut acc: HashMap<&str, (f64, bool, bool)> = HashMap::new();
    for (rank, id) in keyword.iter().enumerate() {
        let e = acc.entry(id.as_str()).or_insert((0.0, false, false));
        if !e.1 {
            e.0 += weights.keyword / (weights.rrf_k + rank as f64 + 1.0);
            e.1 = true;
        }
    }
    for (rank, id) in vector.iter().enumerate() {
        let e = acc.entry(id.as_str()).or_insert((0.0, false, false));
        if !e.2 {
            e.0 += weights.vector / (weights.rrf_k + rank as f64 + 1.0);
            e.2 = true;
        }
    }
    let mut out: Vec<Fused> = acc
        .into_iter()
        .map(|(id, (score, kw, vec))| Fused {
            card_id: id.to_string(),
            score,
            source: match (kw, vec) {
                (true, true) => ResultSource::Hybrid,
                (true, false) => ResultSource::Keyword,
                _ => ResultSource::Vector,
            },
        })
        .collect();
    out.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.card_id.cmp(&b.card_id)));
    out
}

/// Final result order: score desc, then specificity desc, usage desc, id asc.
pub fn compare(a: &ScoredCard, b: &ScoredCard) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.card.specificity_score.total_cmp(&a.card.specificity_score))
        .then_with(|| b.card.usage_count.cmp(&a.card.usage_count))
        .then_with(|| a.card.id.cmp(&b.card.id))
}
