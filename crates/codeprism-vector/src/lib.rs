//! codeprism-vector: HNSW index over card embeddings using usearch.
//!
//! The index lives in memory only. `card_embeddings` in SQLite is the source
//! of truth; `HnswIndex::rebuild` restores the index from it at startup.

use codeprism_core::{CodeprismError, VectorBackend, VectorConfig};
use std::collections::HashMap;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

fn vector_err(e: impl std::fmt::Display) -> CodeprismError {
    CodeprismError::Vector(e.to_string())
}

/// HNSW vector index backed by usearch, cosine metric.
pub struct HnswIndex {
    index: Index,
    dimensions: usize,
    /// Map from card ids to usearch u64 keys.
    id_to_key: HashMap<String, u64>,
    key_to_id: HashMap<u64, String>,
    next_key: u64,
}

impl HnswIndex {
    pub fn new(config: &VectorConfig) -> Result<Self, CodeprismError> {
        let options = IndexOptions {
            dimensions: config.dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: config.m,
            expansion_add: config.ef_construction,
            expansion_search: config.ef_search,
            multi: false,
        };

        let index = Index::new(&options).map_err(vector_err)?;
        index.reserve(1_024).map_err(vector_err)?;

        Ok(Self {
            index,
            dimensions: config.dimensions,
            id_to_key: HashMap::new(),
            key_to_id: HashMap::new(),
            next_key: 0,
        })
    }

    /// 768 dimensions, M=16, efConstruction=200, efSearch=100.
    pub fn with_defaults() -> Result<Self, CodeprismError> {
        Self::new(&VectorConfig::default())
    }

    /// Build a fresh index from stored (card id, embedding) pairs. Vectors of
    /// the wrong dimension are skipped with a warning rather than failing the
    /// whole load, so a provider switch degrades to keyword-only search.
    pub fn rebuild(config: &VectorConfig, items: &[(String, Vec<f32>)]) -> Result<Self, CodeprismError> {
        let mut index = Self::new(config)?;
        let mut skipped = 0usize;
        for (id, embedding) in items {
            if embedding.len() != index.dimensions {
                skipped += 1;
                continue;
            }
            index.insert(id, embedding)?;
        }
        if skipped > 0 {
            tracing::warn!(skipped, dimensions = index.dimensions, "skipped embeddings with mismatched dimensions");
        }
        tracing::debug!(vectors = index.len(), "vector index rebuilt");
        Ok(index)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn contains(&self, id: &str) -> bool {
        self.id_to_key.contains_key(id)
    }

    fn allocate_key(&mut self) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        key
    }
}

impl VectorBackend for HnswIndex {
    fn insert(&mut self, id: &str, embedding: &[f32]) -> Result<(), CodeprismError> {
        if embedding.len() != self.dimensions {
            return Err(CodeprismError::Vector(format!(
                "Expected {} dimensions, got {}",
                self.dimensions,
                embedding.len()
            )));
        }

        if let Some(old_key) = self.id_to_key.remove(id) {
            self.index.remove(old_key).map_err(vector_err)?;
            self.key_to_id.remove(&old_key);
        }

        let key = self.allocate_key();

        if self.index.size() >= self.index.capacity() {
            let new_cap = (self.index.capacity() * 2).max(1_024);
            self.index.reserve(new_cap).map_err(vector_err)?;
        }

        self.index.add(key, embedding).map_err(vector_err)?;
        self.id_to_key.insert(id.to_string(), key);
        self.key_to_id.insert(key, id.to_string());
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>, CodeprismError> {
        if self.is_empty() || k == 0 {
            return Ok(vec![]);
        }
        if query.len() != self.dimensions {
            return Err(CodeprismError::Vector(format!(
                "Expected {} dimensions, got {}",
                self.dimensions,
                query.len()
            )));
        }

        let results = self.index.search(query, k).map_err(vector_err)?;

        let mut output = Vec::with_capacity(results.keys.len());
        for (key, distance) in results.keys.iter().zip(results.distances.iter()) {
            if let Some(id) = self.key_to_id.get(key) {
                // cosine distance -> similarity
                output.push((id.clone(), 1.0 - distance));
            }
        }
        Ok(output)
    }

    fn remove(&mut self, id: &str) -> Result<bool, CodeprismError> {
        match self.id_to_key.remove(id) {
            Some(key) => {
                self.index.remove(key).map_err(vector_err)?;
                self.key_to_id.remove(&key);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn len(&self) -> usize {
        self.id_to_key.len()
    }
}
