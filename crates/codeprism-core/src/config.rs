//! Persistent configuration for codeprism.
//!
//! Loads/saves a TOML config at `~/.codeprism/config.toml`, then overlays a small
//! set of environment variables for the knobs operators tune per deployment.

use crate::CodeprismError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default ingestion batch size limit, in files.
pub const DEFAULT_BATCH_SIZE_LIMIT: usize = 100;
/// Default debounce window for filesystem bursts.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1500;
/// Default inbound-import count at which a domain file becomes an entry point.
pub const DEFAULT_HUB_THRESHOLD: usize = 5;

/// Top-level codeprism configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeprismConfig {
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub watch: WatchConfig,
    pub search: SearchConfig,
    pub vector: VectorConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub reranker: RerankerConfig,
    pub server: ServerConfig,
    /// Per-repository overrides keyed by repository name.
    pub repos: HashMap<String, RepoConfig>,
}

impl CodeprismConfig {
    /// Load configuration from the given path.
    pub fn load(path: &Path) -> Result<Self, CodeprismError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CodeprismError::Config(e.to_string()))
    }

    /// Save configuration to the given path.
    pub fn save(&self, path: &Path) -> Result<(), CodeprismError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| CodeprismError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from the default path (or defaults), then apply environment overrides.
    pub fn load_or_default() -> Self {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load(&path).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {}: {e}", path.display());
                Self::default()
            })
        } else {
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Overlay environment-level settings. `lookup` is injectable for tests.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("CODEPRISM_SYNC_BATCH_SIZE").and_then(|s| s.parse().ok()) {
            self.sync.batch_size_limit = v;
        }
        if let Some(v) = lookup("CODEPRISM_DEBOUNCE_MS").and_then(|s| s.parse().ok()) {
            self.watch.debounce_ms = v;
        }
        if let Some(v) = lookup("CODEPRISM_HUB_THRESHOLD").and_then(|s| s.parse().ok()) {
            self.sync.hub_threshold = v;
        }
        if let Some(v) = lookup("CODEPRISM_DB_PATH") {
            self.storage.db_path = v;
        }
        if let Some(v) = lookup("CODEPRISM_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = lookup("CODEPRISM_EMBED_PROVIDER") {
            self.embedding.provider = v.to_lowercase();
        }
        if let Some(v) = lookup("CODEPRISM_EMBED_URL") {
            self.embedding.url = v;
        }
        if let Some(v) = lookup("CODEPRISM_EMBED_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = lookup("CODEPRISM_GEN_PROVIDER") {
            self.generation.provider = v.to_lowercase();
        }
        if let Some(v) = lookup("CODEPRISM_GEN_MODEL") {
            self.generation.model = v;
        }
        if let Some(v) = lookup("CODEPRISM_RERANK_URL") {
            self.reranker.url = v;
        }
    }

    /// Overrides for `repo`, or the empty default.
    pub fn repo(&self, repo: &str) -> RepoConfig {
        self.repos.get(repo).cloned().unwrap_or_default()
    }

    /// Default config path: `~/.codeprism/config.toml`.
    pub fn default_path() -> PathBuf {
        home_dir().join("config.toml")
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".codeprism")
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// SQLite cache size in MB.
    pub cache_size_mb: u32,
    pub busy_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: home_dir().join("codeprism.db").to_string_lossy().into_owned(),
            cache_size_mb: 64,
            busy_timeout_secs: 5,
        }
    }
}

/// Ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum files accepted in one sync batch.
    pub batch_size_limit: usize,
    /// Inbound-import count that promotes a domain file to entry_point.
    pub hub_threshold: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size_limit: DEFAULT_BATCH_SIZE_LIMIT,
            hub_threshold: DEFAULT_HUB_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub debounce_ms: u64,
    /// A merge marker within this many seconds of a fetch counts as a pull.
    pub pull_window_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            pull_window_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub cache_capacity: usize,
    /// Descriptions longer than this are rewritten into a hypothetical answer first.
    pub hyde_min_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 5,
            cache_capacity: 512,
            hyde_min_chars: 200,
        }
    }
}

/// HNSW parameters for the card vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub dimensions: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dimensions: 768,
            m: 16,
            ef_construction: 200,
            ef_search: 100,
        }
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// "ollama" (default), "openai", "hash", or "none".
    pub provider: String,
    pub model: String,
    pub url: String,
    pub dimensions: usize,
    /// LRU cache capacity.
    pub cache_capacity: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            url: String::new(),
            dimensions: 768,
            cache_capacity: 10_000,
        }
    }
}

/// Text generation provider used for query rewriting and card refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// "ollama" (default), "openai", or "none".
    pub provider: String,
    pub model: String,
    pub url: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerConfig {
    /// Cross-encoder endpoint base URL. Empty selects the lexical reranker.
    pub url: String,
    pub model: String,
    pub timeout_ms: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            model: "bge-reranker-base".to_string(),
            timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:4000".to_string(),
        }
    }
}

/// Per-repository classification overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Local checkout, used by the watcher and branch GC.
    pub root: Option<String>,
    /// Directory prefixes whose files are always tests.
    pub test_dirs: Vec<String>,
    /// Paths that are always entry points.
    pub entry_points: Vec<String>,
    /// Path prefixes kept out of the dependency graph.
    pub exclude_graph: Vec<String>,
}

impl RepoConfig {
    pub fn excludes_from_graph(&self, path: &str) -> bool {
        self.exclude_graph.iter().any(|p| path.starts_with(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrips_through_toml() {
        let config = CodeprismConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).expect("default config should serialize to TOML");
        let parsed: CodeprismConfig =
            toml::from_str(&toml_str).expect("serialized TOML should parse back");
        assert_eq!(parsed.sync.batch_size_limit, DEFAULT_BATCH_SIZE_LIMIT);
        assert_eq!(parsed.watch.debounce_ms, DEFAULT_DEBOUNCE_MS);
        assert_eq!(parsed.vector.dimensions, 768);
    }

    #[test]
    fn load_nonexistent_returns_error() {
        let result = CodeprismConfig::load(Path::new("/tmp/nonexistent_codeprism_config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = CodeprismConfig::default();
        config.sync.hub_threshold = 9;
        config.repos.insert(
            "backend".into(),
            RepoConfig {
                test_dirs: vec!["qa/".into()],
                ..Default::default()
            },
        );

        config.save(&path).expect("save should succeed");
        let loaded = CodeprismConfig::load(&path).expect("load should succeed");

        assert_eq!(loaded.sync.hub_threshold, 9);
        assert_eq!(loaded.repo("backend").test_dirs, vec!["qa/".to_string()]);
        assert_eq!(loaded.repo("frontend"), RepoConfig::default());
    }

    #[test]
    fn partial_toml_uses_defaults_for_missing_fields() {
        let partial = r#"
[watch]
debounce_ms = 250

[repos.frontend]
exclude_graph = ["generated/"]
"#;
        let config: CodeprismConfig = toml::from_str(partial).expect("partial TOML should parse");
        assert_eq!(config.watch.debounce_ms, 250);
        assert_eq!(config.sync.batch_size_limit, DEFAULT_BATCH_SIZE_LIMIT);
        assert!(config.repo("frontend").excludes_from_graph("generated/api.ts"));
        assert!(!config.repo("frontend").excludes_from_graph("src/api.ts"));
    }

    #[test]
    fn env_overrides_apply_to_tunables() {
        let mut config = CodeprismConfig::default();
        config.apply_env_overrides(|key| match key {
            "CODEPRISM_SYNC_BATCH_SIZE" => Some("25".into()),
            "CODEPRISM_DEBOUNCE_MS" => Some("300".into()),
            "CODEPRISM_HUB_THRESHOLD" => Some("not-a-number".into()),
            _ => None,
        });
        assert_eq!(config.sync.batch_size_limit, 25);
        assert_eq!(config.watch.debounce_ms, 300);
        assert_eq!(config.sync.hub_threshold, DEFAULT_HUB_THRESHOLD);
    }

    #[test]
    fn default_path_ends_with_config_toml() {
        assert!(CodeprismConfig::default_path().ends_with("config.toml"));
    }
}
