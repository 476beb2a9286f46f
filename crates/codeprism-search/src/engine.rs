//! The hybrid search engine.

use crate::cache::{CacheKey, CacheStats, CachedHit, SearchCache};
use crate::classify::RepoCentroids;
use crate::expand::graph_neighbours;
use crate::fusion::{self, fuse, FusionWeights};
use crate::query::{build_hyde_query, build_semantic_query, normalize_query};
use crate::{ResultSource, ScoredCard};
use codeprism_core::{Card, CodeprismConfig, CodeprismError, SearchConfig, VectorBackend, VectorConfig};
use codeprism_embeddings::{EmbeddingProvider, GenerationProvider, LexicalReranker, Reranker};
use codeprism_graph::FileGraph;
use codeprism_storage::{tuning, Storage};
use codeprism_vector::HnswIndex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

/// Characters of card text handed to the reranker.
const RERANK_DOC_CHARS: usize = 2_000;

/// Owns the retrieval state: result cache, vector index and the lazily built
/// graph and repository centroids. Shared behind an `Arc` by every surface.
pub struct SearchEngine {
    storage: Arc<Storage>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn GenerationProvider>>,
    reranker: Arc<dyn Reranker>,
    vectors: Mutex<HnswIndex>,
    cache: SearchCache,
    graph: RwLock<Option<Arc<FileGraph>>>,
    centroids: RwLock<Option<Arc<RepoCentroids>>>,
    config: SearchConfig,
}

fn poisoned(what: &str) -> CodeprismError {
    CodeprismError::LockPoisoned(what.to_string())
}

impl SearchEngine {
    /// Assemble an engine and load stored card embeddings into the vector index.
    /// The index dimension follows the embedder when one is configured.
    pub fn new(
        storage: Arc<Storage>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        generator: Option<Arc<dyn GenerationProvider>>,
        reranker: Arc<dyn Reranker>,
        config: SearchConfig,
        vector: &VectorConfig,
    ) -> Result<Self, CodeprismError> {
        let mut vector = vector.clone();
        if let Some(e) = &embedder {
            vector.dimensions = e.dimensions();
        }
        let index = HnswIndex::rebuild(&vector, &storage.all_embeddings()?)?;
        tracing::info!(
            vectors = index.len(),
            embedder = embedder.as_ref().map(|e| e.name()).unwrap_or("none"),
            generator = generator.as_ref().map(|g| g.name()).unwrap_or("none"),
            reranker = reranker.name(),
            "search engine ready"
        );
        Ok(Self {
            storage,
            embedder,
            generator,
            reranker,
            vectors: Mutex::new(index),
            cache: SearchCache::new(config.cache_capacity),
            graph: RwLock::new(None),
            centroids: RwLock::new(None),
            config,
        })
    }

    /// Keyword-only engine with the lexical reranker.
    pub fn keyword_only(storage: Arc<Storage>) -> Result<Self, CodeprismError> {
        Self::new(
            storage,
            None,
            None,
            Arc::new(LexicalReranker),
            SearchConfig::default(),
            &VectorConfig::default(),
        )
    }

    /// Build providers from configuration.
    pub fn from_config(storage: Arc<Storage>, config: &CodeprismConfig) -> Result<Self, CodeprismError> {
        let embedder = codeprism_embeddings::from_config(&config.embedding)?.map(Arc::from);
        let generator = codeprism_embeddings::generator_from_config(&config.generation)?.map(Arc::from);
        let reranker = Arc::from(codeprism_embeddings::reranker_from_config(&config.reranker));
        Self::new(storage, embedder, generator, reranker, config.search.clone(), &config.vector)
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn generator(&self) -> Option<&Arc<dyn GenerationProvider>> {
        self.generator.as_ref()
    }

    pub fn default_limit(&self) -> usize {
        self.config.default_limit
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn vector_count(&self) -> usize {
        self.vectors.lock().map(|v| v.len()).unwrap_or(0)
    }

    fn vectors(&self) -> Result<MutexGuard<'_, HnswIndex>, CodeprismError> {
        self.vectors.lock().map_err(|_| poisoned("vector index"))
    }

    /// Drop the cached graph; the next search rebuilds it from stored edges.
    pub fn invalidate_graph(&self) {
        if let Ok(mut g) = self.graph.write() {
            *g = None;
        }
    }

    pub fn clear_cache(&self) -> Result<(), CodeprismError> {
        self.cache.clear()
    }

    fn graph(&self) -> Result<Arc<FileGraph>, CodeprismError> {
        if let Some(g) = self.graph.read().map_err(|_| poisoned("graph"))?.as_ref() {
            return Ok(g.clone());
        }
        let built = Arc::new(FileGraph::from_edges(&self.storage.all_edges()?));
        *self.graph.write().map_err(|_| poisoned("graph"))? = Some(built.clone());
        Ok(built)
    }

    fn centroids(&self) -> Result<Arc<RepoCentroids>, CodeprismError> {
        if let Some(c) = self.centroids.read().map_err(|_| poisoned("centroids"))?.as_ref() {
            return Ok(c.clone());
        }
        let embeddings: HashMap<String, Vec<f32>> = self.storage.all_embeddings()?.into_iter().collect();
        let built = Arc::new(RepoCentroids::from_cards(&self.storage.all_cards()?, &embeddings));
        *self.centroids.write().map_err(|_| poisoned("centroids"))? = Some(built.clone());
        Ok(built)
    }

    fn invalidate_centroids(&self) {
        if let Ok(mut c) = self.centroids.write() {
            *c = None;
        }
    }

    /// Embed a card, persist the vector and add it to the index. Returns
    /// `false` when no embedder is configured.
    pub fn index_card(&self, card: &Card) -> Result<bool, CodeprismError> {
        let Some(embedder) = &self.embedder else {
            return Ok(false);
        };
        let embedding = embedder.embed(&card.embedding_text())?;
        self.storage.store_embedding(&card.id, &embedding)?;
        self.vectors()?.insert(&card.id, &embedding)?;
        self.invalidate_centroids();
        Ok(true)
    }

    pub fn remove_card(&self, id: &str) -> Result<bool, CodeprismError> {
        let removed = self.vectors()?.remove(id)?;
        if removed {
            self.invalidate_centroids();
        }
        Ok(removed)
    }

    fn fusion_weights(&self) -> Result<FusionWeights, CodeprismError> {
        let d = FusionWeights::default();
        Ok(FusionWeights {
            keyword: self.storage.tuning_f64(tuning::FUSION_KEYWORD_WEIGHT, d.keyword)?,
            vector: self.storage.tuning_f64(tuning::FUSION_VECTOR_WEIGHT, d.vector)?,
            rrf_k: self.storage.tuning_f64(tuning::FUSION_RRF_K, d.rrf_k)?,
        })
    }

    fn tuning_usize(&self, key: &str, default: usize) -> Result<usize, CodeprismError> {
        Ok(self.storage.tuning_f64(key, default as f64)?.max(0.0) as usize)
    }

    /// Every cached card still exists, is fresh and is valid on `branch`.
    fn all_live(&self, hits: &[CachedHit], branch: Option<&str>) -> Result<bool, CodeprismError> {
        let ids: Vec<String> = hits.iter().map(|h| h.card_id.clone()).collect();
        let cards = self.storage.get_cards(&ids)?;
        Ok(cards.len() == ids.len() && cards.iter().all(|c| !c.stale && c.is_valid_on(branch)))
    }

    /// Rewrite long descriptions into a hypothetical answer when a generator
    /// is available.
    fn rewrite(&self, query: &str) -> Result<String, CodeprismError> {
        let Some(generator) = &self.generator else {
            return Ok(query.to_string());
        };
        if query.chars().count() <= self.config.hyde_min_chars {
            return Ok(query.to_string());
        }
        let timeout_ms = self.storage.tuning_f64(tuning::HYDE_TIMEOUT_MS, 1500.0)?.max(0.0) as u64;
        Ok(build_hyde_query(query, generator.clone(), Duration::from_millis(timeout_ms)))
    }

    /// Vector candidates, best first. Any failure degrades to an empty list.
    fn vector_candidates(&self, text: &str, pool: usize) -> Vec<String> {
        match self.try_vector_candidates(text, pool) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("vector search unavailable, ranking by keywords only: {e}");
                Vec::new()
            }
        }
    }

    fn try_vector_candidates(&self, text: &str, pool: usize) -> Result<Vec<String>, CodeprismError> {
        let Some(embedder) = &self.embedder else {
            return Ok(Vec::new());
        };
        if self.vectors()?.is_empty() {
            return Ok(Vec::new());
        }
        let mut embedding = embedder.embed(text)?;

        if let Some(class) = self.centroids()?.classify(&embedding) {
            let min = self.storage.tuning_f64(tuning::REPO_CLASSIFY_MIN_CONFIDENCE, 0.05)? as f32;
            if class.confidence >= min {
                let tokens = self
                    .storage
                    .repo_profiles()?
                    .into_iter()
                    .find(|p| p.repository == class.repository)
                    .map(|p| p.tokens(2))
                    .unwrap_or_default();
                if !tokens.is_empty() {
                    tracing::debug!(repo = %class.repository, confidence = class.confidence, "query classified");
                    embedding = embedder.embed(&build_semantic_query(text, &tokens))?;
                }
            }
        }

        Ok(self
            .vectors()?
            .search(&embedding, pool)?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    /// Rerank with the configured reranker, blending its score with the
    /// normalized fusion score. Reranker failure keeps the fusion order.
    fn rerank(&self, query: &str, results: &mut [ScoredCard]) {
        let max = results.iter().map(|r| r.score).fold(0.0f64, f64::max);
        if max > 0.0 {
            results.iter_mut().for_each(|r| r.score /= max);
        }
        let docs: Vec<String> = results
            .iter()
            .map(|r| {
                format!("{}\n{}", r.card.title, r.card.content)
                    .chars()
                    .take(RERANK_DOC_CHARS)
                    .collect()
            })
            .collect();
        let doc_refs: Vec<&str> = docs.iter().map(String::as_str).collect();
        match self.reranker.rerank(query, &doc_refs) {
            Ok(scores) if scores.len() == results.len() => {
                let squash = scores.iter().any(|s| !(0.0..=1.0).contains(s));
                for (r, s) in results.iter_mut().zip(scores) {
                    let s = if squash { 1.0 / (1.0 + (-s).exp()) } else { s };
                    r.score = 0.5 * r.score + 0.5 * f64::from(s);
                }
            }
            Ok(_) => tracing::warn!(reranker = self.reranker.name(), "reranker returned the wrong number of scores"),
            Err(e) => tracing::warn!(reranker = self.reranker.name(), "rerank failed, keeping fusion order: {e}"),
        }
        results.sort_by(fusion::compare);
    }

    /// Ranked non-stale cards for `query`, at most `limit`.
    pub fn search(&self, query: &str, branch: Option<&str>, limit: usize) -> Result<Vec<ScoredCard>, CodeprismError> {
        let normalized = normalize_query(query);
        if normalized.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let key = CacheKey::new(&normalized, branch, limit);
        if let Some(hits) = self.cache.get(&key, |hits| self.all_live(hits, branch))? {
            let ids: Vec<String> = hits.iter().map(|h| h.card_id.clone()).collect();
            let mut cards: HashMap<String, Card> =
                self.storage.get_cards(&ids)?.into_iter().map(|c| (c.id.clone(), c)).collect();
            return Ok(hits
                .into_iter()
                .filter_map(|h| {
                    cards.remove(&h.card_id).map(|card| ScoredCard {
                        card,
                        score: h.score,
                        source: ResultSource::Cache,
                    })
                })
                .collect());
        }

        let text = self.rewrite(query.trim())?;
        let pool = (limit * 4).max(20);

        let keyword: Vec<String> = self
            .storage
            .keyword_search(&text, branch, pool)?
            .into_iter()
            .map(|h| h.card_id)
            .collect();
        let vector = self.vector_candidates(&text, pool);
        let fused = fuse(&keyword, &vector, self.fusion_weights()?);

        let ids: Vec<String> = fused.iter().map(|f| f.card_id.clone()).collect();
        let mut cards: HashMap<String, Card> =
            self.storage.get_cards(&ids)?.into_iter().map(|c| (c.id.clone(), c)).collect();
        let mut results: Vec<ScoredCard> = fused
            .into_iter()
            .filter_map(|f| {
                cards
                    .remove(&f.card_id)
                    .filter(|c| !c.stale && c.is_valid_on(branch))
                    .map(|card| ScoredCard {
                        card,
                        score: f.score,
                        source: f.source,
                    })
            })
            .collect();
        results.sort_by(fusion::compare);

        let seeds_n = self.tuning_usize(tuning::GRAPH_EXPAND_SEEDS, 5)?;
        let max_extra = self.tuning_usize(tuning::GRAPH_EXPAND_MAX, 5)?;
        let seeds: Vec<&Card> = results.iter().take(seeds_n).map(|r| &r.card).collect();
        if !seeds.is_empty() {
            let present: HashSet<String> = results.iter().map(|r| r.card.id.clone()).collect();
            let floor = results
                .iter()
                .take(seeds_n)
                .map(|r| r.score)
                .fold(f64::INFINITY, f64::min);
            let extra = graph_neighbours(&self.storage, &*self.graph()?, &seeds, &present, branch, max_extra)?;
            results.extend(extra.into_iter().map(|card| ScoredCard {
                card,
                score: floor * 0.5,
                source: ResultSource::Graph,
            }));
        }

        if !results.is_empty() {
            self.rerank(query, &mut results);
        }
        results.truncate(limit);

        self.cache.put(
            key,
            results
                .iter()
                .map(|r| CachedHit {
                    card_id: r.card.id.clone(),
                    score: r.score,
                })
                .collect(),
        )?;
        let returned: Vec<String> = results.iter().map(|r| r.card.id.clone()).collect();
        self.storage.increment_usage(&returned)?;

        tracing::debug!(
            query = %normalized,
            keyword = keyword.len(),
            vector = vector.len(),
            returned = results.len(),
            "search"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeprism_core::CardType;
    use codeprism_embeddings::HashEmbedder;

    fn card(id: &str, title: &str, content: &str, file: &str) -> Card {
        let mut c = Card::new(id, "billing", title, content, CardType::Flow);
        c.source_files = vec![file.into()];
        c.source_repos = vec!["backend".into()];
        c
    }

    fn engine_with(cards: &[Card], embed: bool) -> SearchEngine {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        for c in cards {
            storage.upsert_card(c).unwrap();
        }
        let embedder: Option<Arc<dyn EmbeddingProvider>> = if embed {
            Some(Arc::new(HashEmbedder::new(64)))
        } else {
            None
        };
        let engine = SearchEngine::new(
            storage,
            embedder,
            None,
            Arc::new(LexicalReranker),
            SearchConfig::default(),
            &VectorConfig::default(),
        )
        .unwrap();
        for c in cards {
            engine.index_card(c).unwrap();
        }
        engine
    }

    #[test]
    fn keyword_results_exclude_stale_cards() {
        let mut stale = card("b", "Invoice export", "invoice export job", "app/jobs/export.rb");
        stale.stale = true;
        let engine = engine_with(
            &[card("a", "Invoice totals", "invoice totals are computed", "app/models/invoice.rb"), stale],
            false,
        );
        let results = engine.search("invoice", None, 5).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.card.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
        assert_eq!(results[0].source, ResultSource::Keyword);
    }

    #[test]
    fn second_identical_query_hits_cache_until_invalidated() {
        let engine = engine_with(
            &[card("a", "Patient billing", "patient billing flow", "app/models/patient.rb")],
            true,
        );
        let first = engine.search("Patient billing", None, 5).unwrap();
        assert_eq!(first.len(), 1);
        assert_ne!(first[0].source, ResultSource::Cache);

        let second = engine.search("  patient   BILLING ", None, 5).unwrap();
        assert_eq!(second[0].source, ResultSource::Cache);
        assert_eq!(engine.cache_stats().hits, 1);

        engine
            .storage()
            .invalidate_cards(&["app/models/patient.rb".to_string()], "backend")
            .unwrap();
        let third = engine.search("patient billing", None, 5).unwrap();
        assert!(third.is_empty());
        assert_eq!(engine.cache_stats().hits, 1);
    }

    #[test]
    fn usage_increments_only_on_fresh_search() {
        let engine = engine_with(&[card("a", "Refunds", "refunds flow", "app/x.rb")], false);
        engine.search("refunds", None, 5).unwrap();
        engine.search("refunds", None, 5).unwrap();
        assert_eq!(engine.storage().get_card("a").unwrap().unwrap().usage_count, 1);
    }

    #[test]
    fn branch_filter_applies() {
        let mut scoped = card("a", "Discounts", "discounts", "app/d.rb");
        scoped.valid_branches = Some(vec!["feature/discounts".into()]);
        let engine = engine_with(&[scoped], false);
        assert!(engine.search("discounts", Some("main"), 5).unwrap().is_empty());
        assert_eq!(engine.search("discounts", Some("feature/discounts"), 5).unwrap().len(), 1);
        assert_eq!(engine.search("discounts", None, 5).unwrap().len(), 1);
    }

    #[test]
    fn graph_expansion_adds_neighbour_cards() {
        let engine = engine_with(
            &[
                card("a", "Appointments", "appointments scheduling", "app/models/appointment.rb"),
                card("b", "Doctors", "doctor roster", "app/models/doctor.rb"),
            ],
            false,
        );
        engine
            .storage()
            .insert_edge(&codeprism_core::GraphEdge::new(
                codeprism_core::EdgeRelation::ModelAssociation,
                ("backend", "app/models/appointment.rb"),
                ("backend", "app/models/doctor.rb"),
            ))
            .unwrap();
        engine.invalidate_graph();

        let results = engine.search("appointments", None, 5).unwrap();
        let sources: Vec<(&str, ResultSource)> =
            results.iter().map(|r| (r.card.id.as_str(), r.source)).collect();
        assert_eq!(sources, vec![("a", ResultSource::Keyword), ("b", ResultSource::Graph)]);
    }

    #[test]
    fn empty_query_returns_nothing() {
        let engine = engine_with(&[], false);
        assert!(engine.search("   ", None, 5).unwrap().is_empty());
        assert!(engine.search("x", None, 0).unwrap().is_empty());
    }
}
