//! Deterministic feature-hashing embeddings.
//!
//! Each lowercase word (and each half of a camelCase/snake_case identifier)
//! is hashed into a signed bucket, then the vector is L2-normalized. Texts
//! sharing vocabulary land close together, which is enough for offline use
//! and tests.

use codeprism_core::CodeprismError;
use sha2::{Digest, Sha256};

pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

/// Lowercase word tokens, with identifiers also split at case and `_` boundaries.
pub fn tokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if word.is_empty() {
            continue;
        }
        let lower = word.to_lowercase();
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut prev_lower = false;
        for c in word.chars() {
            if c == '_' || (c.is_uppercase() && prev_lower) {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            if c != '_' {
                current.extend(c.to_lowercase());
            }
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
        if !current.is_empty() {
            parts.push(current);
        }
        if parts.len() > 1 {
            out.extend(parts);
        }
        out.push(lower);
    }
    out
}

impl super::EmbeddingProvider for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, CodeprismError> {
        let mut v = vec![0.0f32; self.dimensions];
        for token in tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let idx = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }

    fn name(&self) -> &str {
        "hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cosine_similarity, EmbeddingProvider};

    #[test]
    fn identifiers_split_into_words() {
        assert_eq!(
            tokens("PatientsController#show"),
            vec!["patients", "controller", "patientscontroller", "show"]
        );
        assert_eq!(tokens("billing_cycle"), vec!["billing", "cycle", "billing_cycle"]);
        assert!(tokens("  ,, ").is_empty());
    }

    #[test]
    fn deterministic_and_similar_for_shared_vocabulary() {
        let e = HashEmbedder::new(64);
        let a = e.embed("patient billing invoice").unwrap();
        assert_eq!(a, e.embed("patient billing invoice").unwrap());
        let b = e.embed("billing invoice for a patient").unwrap();
        let c = e.embed("stylesheet colors tailwind").unwrap();
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
        assert_eq!(e.embed("").unwrap(), vec![0.0; 64]);
    }
}
