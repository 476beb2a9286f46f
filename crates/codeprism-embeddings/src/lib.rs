//! codeprism-embeddings: pluggable embedding, generation and reranking capabilities.
//!
//! Backends:
//! - **Ollama**: local Ollama server (`/api/embeddings`, `/api/generate`)
//! - **OpenAI**: OpenAI or any compatible endpoint (`/embeddings`, `/chat/completions`)
//! - **Hash**: deterministic offline embeddings, no model required
//!
//! Rerankers are either a cross-encoder HTTP endpoint or a lexical fallback.

pub mod hash;
pub mod ollama;
pub mod openai;
pub mod rerank;

use codeprism_core::{CodeprismError, EmbeddingConfig, GenerationConfig, RerankerConfig};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

pub use hash::HashEmbedder;
pub use rerank::{CrossEncoderReranker, LexicalReranker};

/// Default embedding dimensions.
pub const DIMENSIONS: usize = 768;

/// Default LRU cache capacity.
pub const CACHE_CAPACITY: usize = 10_000;

// ── Capability Traits ───────────────────────────────────────────────────────

/// Trait for pluggable embedding providers.
pub trait EmbeddingProvider: Send + Sync {
    /// Embedding vector dimensions.
    fn dimensions(&self) -> usize;

    /// Embed a single text string.
    fn embed(&self, text: &str) -> Result<Vec<f32>, CodeprismError>;

    /// Embed a batch of texts (default: sequential).
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, CodeprismError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Provider name for display.
    fn name(&self) -> &str;

    /// Cache statistics: (current_size, capacity). Returns (0, 0) if no cache.
    fn cache_stats(&self) -> (usize, usize) {
        (0, 0)
    }
}

/// Opaque `generate(prompt) -> text` capability.
pub trait GenerationProvider: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, CodeprismError>;

    fn name(&self) -> &str;
}

/// Scores each document against a query; higher is more relevant.
pub trait Reranker: Send + Sync {
    fn rerank(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>, CodeprismError>;

    fn name(&self) -> &str;
}

// ── Cached Provider Wrapper ───────────────────────────────────────────────

/// Wraps any `EmbeddingProvider` with an LRU cache.
pub struct CachedProvider {
    inner: Box<dyn EmbeddingProvider>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl CachedProvider {
    pub fn new(inner: Box<dyn EmbeddingProvider>, capacity: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LruCache<String, Vec<f32>>>, CodeprismError> {
        self.cache
            .lock()
            .map_err(|e| CodeprismError::LockPoisoned(format!("embedding cache: {e}")))
    }
}

impl EmbeddingProvider for CachedProvider {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, CodeprismError> {
        if let Some(cached) = self.lock()?.get(text) {
            return Ok(cached.clone());
        }
        let embedding = self.inner.embed(text)?;
        self.lock()?.put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, CodeprismError> {
        // Check cache, only forward uncached texts
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut uncached = Vec::new();
        let mut uncached_idx = Vec::new();

        {
            let mut cache = self.lock()?;
            for (i, text) in texts.iter().enumerate() {
                if let Some(cached) = cache.get(*text) {
                    results[i] = Some(cached.clone());
                } else {
                    uncached_idx.push(i);
                    uncached.push(*text);
                }
            }
        }

        if !uncached.is_empty() {
            let new_embeddings = self.inner.embed_batch(&uncached)?;
            let mut cache = self.lock()?;
            for (idx, embedding) in uncached_idx.into_iter().zip(new_embeddings) {
                cache.put(texts[idx].to_string(), embedding.clone());
                results[idx] = Some(embedding);
            }
        }

        results
            .into_iter()
            .map(|r| r.ok_or_else(|| CodeprismError::Embedding("provider returned too few embeddings".into())))
            .collect()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn cache_stats(&self) -> (usize, usize) {
        self.cache
            .lock()
            .map(|cache| (cache.len(), cache.cap().get()))
            .unwrap_or((0, 0))
    }
}

// ── Factories ─────────────────────────────────────────────────────────────

fn api_key(var: &str) -> Option<String> {
    std::env::var(var)
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .ok()
}

/// Build the configured embedding provider, wrapped in an LRU cache.
/// Returns `None` for provider `none` (keyword-only search).
///
/// | `embedding.provider` | Backend | API key |
/// |----------------------|---------|---------|
/// | `ollama` | local Ollama | - |
/// | `openai` | OpenAI-compatible | `CODEPRISM_EMBED_API_KEY` or `OPENAI_API_KEY` |
/// | `hash` | deterministic hashing | - |
/// | `none` | disabled | - |
pub fn from_config(config: &EmbeddingConfig) -> Result<Option<Box<dyn EmbeddingProvider>>, CodeprismError> {
    let inner: Box<dyn EmbeddingProvider> = match config.provider.as_str() {
        "none" | "" => return Ok(None),
        "ollama" => {
            let url = if config.url.is_empty() { ollama::DEFAULT_BASE_URL } else { &config.url };
            Box::new(ollama::OllamaProvider::new(url, &config.model, config.dimensions))
        }
        "openai" => {
            let key = api_key("CODEPRISM_EMBED_API_KEY").ok_or_else(|| {
                CodeprismError::Config(
                    "CODEPRISM_EMBED_API_KEY or OPENAI_API_KEY required for OpenAI embeddings".into(),
                )
            })?;
            let base = (!config.url.is_empty()).then_some(config.url.as_str());
            Box::new(openai::OpenAIProvider::new(&key, &config.model, config.dimensions, base))
        }
        "hash" => Box::new(HashEmbedder::new(config.dimensions)),
        other => {
            return Err(CodeprismError::Config(format!(
                "Unknown embedding provider: '{other}'. Use 'ollama', 'openai', 'hash' or 'none'."
            )))
        }
    };
    tracing::info!(provider = inner.name(), dimensions = inner.dimensions(), "embedding provider ready");
    Ok(Some(Box::new(CachedProvider::new(inner, config.cache_capacity))))
}

/// Build the configured generation capability; `None` for provider `none`.
pub fn generator_from_config(config: &GenerationConfig) -> Result<Option<Box<dyn GenerationProvider>>, CodeprismError> {
    match config.provider.as_str() {
        "none" | "" => Ok(None),
        "ollama" => {
            let url = if config.url.is_empty() { ollama::DEFAULT_BASE_URL } else { &config.url };
            Ok(Some(Box::new(ollama::OllamaGenerator::new(url, &config.model))))
        }
        "openai" => {
            let key = api_key("CODEPRISM_GEN_API_KEY").ok_or_else(|| {
                CodeprismError::Config("CODEPRISM_GEN_API_KEY or OPENAI_API_KEY required for OpenAI generation".into())
            })?;
            let base = (!config.url.is_empty()).then_some(config.url.as_str());
            Ok(Some(Box::new(openai::OpenAIGenerator::new(&key, &config.model, base))))
        }
        other => Err(CodeprismError::Config(format!(
            "Unknown generation provider: '{other}'. Use 'ollama', 'openai' or 'none'."
        ))),
    }
}

/// Cross-encoder when a URL is configured, lexical overlap otherwise.
pub fn reranker_from_config(config: &RerankerConfig) -> Box<dyn Reranker> {
    if config.url.is_empty() {
        Box::new(LexicalReranker)
    } else {
        Box::new(CrossEncoderReranker::new(&config.url, &config.model, config.timeout_ms))
    }
}

/// Cosine similarity; 0.0 for empty, mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}
