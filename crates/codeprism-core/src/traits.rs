use crate::CodeprismError;

/// Nearest-neighbour index over card embeddings.
pub trait VectorBackend: Send + Sync {
    /// Insert or replace the vector stored under `id`.
    fn insert(&mut self, id: &str, embedding: &[f32]) -> Result<(), CodeprismError>;

    /// Search for the `k` nearest neighbours. Returns (id, cosine similarity) pairs.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>, CodeprismError>;

    /// Remove a vector by ID. Returns whether it was present.
    fn remove(&mut self, id: &str) -> Result<bool, CodeprismError>;

    /// Number of stored vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
