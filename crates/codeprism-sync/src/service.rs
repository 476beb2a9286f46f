//! The `Codeprism` service object shared by every surface.

use crate::refresh::CardRefresher;
use crate::reindex::{ReindexController, ReindexStatus};
use codeprism_core::{ActiveContext, CodeprismConfig, CodeprismError};
use codeprism_search::SearchEngine;
use codeprism_storage::{tuning, GcReport, Storage, StoreStats};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Default for the `auto_reindex_threshold` tunable.
const DEFAULT_AUTO_REINDEX_THRESHOLD: f64 = 10.0;

/// Store, search engine, configuration and background reindex state.
///
/// Cheap to share: surfaces hold it behind an `Arc`.
pub struct Codeprism {
    storage: Arc<Storage>,
    search: Arc<SearchEngine>,
    config: CodeprismConfig,
    reindex: ReindexController,
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    #[serde(flatten)]
    pub stats: StoreStats,
    pub vectors: usize,
    pub reindex: ReindexStatus,
}

impl Codeprism {
    /// Open the configured store (running migrations) and build providers.
    pub fn open(config: CodeprismConfig) -> Result<Self, CodeprismError> {
        let storage = Arc::new(Storage::open_with(Path::new(&config.storage.db_path), &config.storage)?);
        let search = Arc::new(SearchEngine::from_config(Arc::clone(&storage), &config)?);
        Ok(Self::with_parts(storage, search, config))
    }

    /// Assemble from already-built components.
    pub fn with_parts(storage: Arc<Storage>, search: Arc<SearchEngine>, config: CodeprismConfig) -> Self {
        Self {
            storage,
            search,
            config,
            reindex: ReindexController::new(),
        }
    }

    /// In-memory store with a keyword-only engine.
    pub fn in_memory(config: CodeprismConfig) -> Result<Self, CodeprismError> {
        let storage = Arc::new(Storage::open_in_memory()?);
        let search = Arc::new(SearchEngine::keyword_only(Arc::clone(&storage))?);
        Ok(Self::with_parts(storage, search, config))
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn search(&self) -> &Arc<SearchEngine> {
        &self.search
    }

    pub fn config(&self) -> &CodeprismConfig {
        &self.config
    }

    pub fn reindex_status(&self) -> ReindexStatus {
        self.reindex.status()
    }

    /// Block until a running reindex job finishes.
    pub fn wait_for_reindex(&self) {
        self.reindex.wait();
    }

    /// Start the stale-card refresh job unless one is already running.
    pub fn start_reindex(&self, repo: Option<String>) -> Result<bool, CodeprismError> {
        let refresher = CardRefresher::new(Arc::clone(&self.storage), Arc::clone(&self.search));
        let scope = repo.clone();
        self.reindex
            .try_start(repo, move || refresher.run(scope.as_deref()))
    }

    /// Start a reindex when the stale-card count (scoped to `repo` when
    /// known) has reached the `auto_reindex_threshold` tunable.
    pub fn maybe_auto_reindex(&self, repo: Option<&str>) -> Result<bool, CodeprismError> {
        if self.reindex.is_running() {
            return Ok(false);
        }
        let threshold = self
            .storage
            .tuning_f64(tuning::AUTO_REINDEX_THRESHOLD, DEFAULT_AUTO_REINDEX_THRESHOLD)?;
        let stale = self.storage.count_stale(repo)?;
        if (stale as f64) < threshold {
            tracing::debug!(stale, threshold, "below auto-reindex threshold");
            return Ok(false);
        }
        tracing::info!(repo = repo.unwrap_or("*"), stale, threshold, "auto-reindex threshold reached");
        self.start_reindex(repo.map(str::to_string))
    }

    /// Branch GC for `repo`: purge data of branches outside `live_branches`
    /// and drop deleted cards from the vector index.
    pub fn collect_branches(&self, repo: &str, live_branches: &[String]) -> Result<GcReport, CodeprismError> {
        let report = self.storage.collect_branches(repo, live_branches)?;
        for id in &report.deleted_cards {
            self.search.remove_card(id)?;
        }
        if report.edges > 0 {
            self.search.invalidate_graph();
        }
        if report.file_rows > 0 || report.cards_pruned > 0 || !report.deleted_cards.is_empty() {
            self.search.clear_cache()?;
            tracing::info!(
                repo,
                file_rows = report.file_rows,
                cards_deleted = report.deleted_cards.len(),
                cards_pruned = report.cards_pruned,
                edges = report.edges,
                "branch gc"
            );
        }
        Ok(report)
    }

    pub fn set_active_context(&self, ctx: &ActiveContext) -> Result<(), CodeprismError> {
        self.storage.set_active_context(ctx)
    }

    pub fn health(&self) -> Result<Health, CodeprismError> {
        Ok(Health {
            status: "ok",
            stats: self.storage.stats()?,
            vectors: self.search.vector_count(),
            reindex: self.reindex.status(),
        })
    }
}
