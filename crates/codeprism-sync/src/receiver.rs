//! The sync receiver: one ingestion batch in, one transaction out.

use crate::Codeprism;
use codeprism_core::{ChangedFile, CodeprismError, FileRole, FileStatus, ParsedFile, RepoConfig, SyncRequest, SyncResponse};
use codeprism_graph::{FileGraph, FileKey};
use codeprism_index::{apply_graph_roles, build_graph, classify_role, parse_file};
use codeprism_storage::{edges, file_index, flows, invalidate, Storage};
use std::collections::HashMap;

/// A parsed added/modified file waiting to be written.
struct Pending {
    file: ParsedFile,
    content_hash: String,
    added: bool,
}

/// Parse the batch outside the transaction. Files whose parse fails carry an
/// empty structure and are still indexed.
fn parse_batch(req: &SyncRequest, repo_cfg: &RepoConfig) -> (Vec<Pending>, Vec<String>) {
    let mut pending = Vec::new();
    let mut deleted = Vec::new();
    for ChangedFile { path, content, status } in &req.changed_files {
        match status {
            FileStatus::Deleted => deleted.push(path.clone()),
            FileStatus::Added | FileStatus::Modified => {
                let content = content.as_deref().unwrap_or_else(|| {
                    tracing::warn!(path = %path, "no content sent, indexing as empty");
                    ""
                });
                let fragment = parse_file(content, path);
                let mut file = ParsedFile::new(path, &req.repo, &req.branch, fragment);
                file.role = classify_role(path, &file.structure, Some(repo_cfg));
                pending.push(Pending {
                    file,
                    content_hash: Storage::content_hash(content),
                    added: *status == FileStatus::Added,
                });
            }
        }
    }
    (pending, deleted)
}

#[derive(Debug, Default)]
struct BatchOutcome {
    indexed: usize,
    invalidated: usize,
    edges_changed: bool,
}

impl Codeprism {
    /// Ingest one batch of changed files.
    ///
    /// Deleted files leave the file index and every flow; added and modified
    /// files are parsed and upserted. Roles and graph edges touching the batch
    /// are recomputed, newly added files join their neighbours' flow, and
    /// cards built from the changed files are marked stale. Merge-like events
    /// and full syncs also stale project docs and propagate staleness across
    /// repositories. Everything runs in one transaction.
    pub fn handle_sync(&self, req: &SyncRequest) -> Result<SyncResponse, CodeprismError> {
        if req.changed_files.is_empty() {
            return Ok(SyncResponse::default());
        }
        if req.repo.trim().is_empty() || req.branch.trim().is_empty() {
            return Err(CodeprismError::InvalidInput("repo and branch are required".into()));
        }
        let limit = self.config().sync.batch_size_limit;
        if req.changed_files.len() > limit {
            return Err(CodeprismError::InvalidInput(format!(
                "batch of {} files exceeds the limit of {limit}",
                req.changed_files.len()
            )));
        }

        let repo_cfg = self.config().repo(&req.repo);
        let (pending, deleted) = parse_batch(req, &repo_cfg);
        let outcome = self.storage().with_transaction(|tx| {
            let mut out = BatchOutcome::default();
            let repo = req.repo.as_str();
            let branch = req.branch.as_str();

            for path in &deleted {
                file_index::delete_file(tx, repo, branch, path)?;
                flows::remove_file_from_flows(tx, repo, path)?;
                out.indexed += 1;
            }
            for p in &pending {
                file_index::upsert_file(tx, &p.file, req.commit_sha.as_deref(), &p.content_hash)?;
                out.indexed += 1;
            }

            let changed: Vec<String> = req.changed_files.iter().map(|f| f.path.clone()).collect();
            out.invalidated += invalidate::invalidate_cards(tx, &changed, repo)?;
            if req.event_type.is_merge_like() || req.full_sync {
                let docs =
                    invalidate::invalidate_project_docs(tx, &changed, repo, req.event_type.is_merge_like())?;
                tracing::debug!(repo, docs, "project docs invalidated");
                // Edges still describe the code the cards were built from.
                out.invalidated += invalidate::propagate_cross_repo_staleness(tx, &changed, repo)?;
            }

            // Graph over this branch plus the latest view of every other repository.
            let mut universe = file_index::parsed_files_for_branch(tx, repo, branch)?;
            let stored_roles: HashMap<String, FileRole> =
                universe.iter().map(|f| (f.path.clone(), f.role)).collect();
            // Graph roles are recomputed from scratch, so start from the static ones.
            for file in universe.iter_mut() {
                file.role = classify_role(&file.path, &file.structure, Some(&repo_cfg));
            }
            let own = universe.len();
            universe.extend(file_index::latest_parsed_files_outside(tx, repo)?);

            let graph_input: Vec<ParsedFile> = universe
                .iter()
                .filter(|f| f.repository != repo || !repo_cfg.excludes_from_graph(&f.path))
                .cloned()
                .collect();
            let new_edges = build_graph(&graph_input);

            let promoted = apply_graph_roles(&mut universe[..own], &new_edges, self.config().sync.hub_threshold);
            let mut roles_changed = 0;
            for file in &universe[..own] {
                if stored_roles.get(&file.path) != Some(&file.role) {
                    file_index::update_parsed(tx, file)?;
                    roles_changed += 1;
                }
            }

            let touched: Vec<(String, String)> = changed.iter().map(|p| (repo.to_string(), p.clone())).collect();
            let (removed, inserted) = edges::replace_edges_touching(tx, &touched, &new_edges)?;
            out.edges_changed = removed > 0 || inserted > 0;

            let graph = FileGraph::from_edges(&new_edges);
            for p in pending.iter().filter(|p| p.added) {
                let neighbours: Vec<(String, String)> = graph
                    .neighbors(&FileKey::new(repo, &p.file.path))
                    .into_iter()
                    .map(|k| (k.repository, k.path))
                    .collect();
                if let Some(flow) = flows::assign_by_neighbours(tx, repo, &p.file.path, &neighbours)? {
                    tracing::debug!(path = %p.file.path, flow = %flow, "file joined flow");
                }
            }

            tracing::debug!(
                repo,
                branch,
                edges_removed = removed,
                edges_inserted = inserted,
                promoted,
                roles_changed,
                "graph refreshed"
            );
            Ok(out)
        })?;

        if outcome.edges_changed {
            self.search().invalidate_graph();
        }
        tracing::info!(
            repo = %req.repo,
            branch = %req.branch,
            event = %req.event_type,
            indexed = outcome.indexed,
            invalidated = outcome.invalidated,
            "sync batch applied"
        );
        if outcome.invalidated > 0 {
            if let Err(e) = self.maybe_auto_reindex(Some(&req.repo)) {
                tracing::warn!("auto-reindex check failed: {e}");
            }
        }
        Ok(SyncResponse {
            indexed: outcome.indexed,
            invalidated: outcome.invalidated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeprism_core::{Card, CardType, CodeprismConfig, EventType};

    fn file(path: &str, content: &str, status: FileStatus) -> ChangedFile {
        ChangedFile {
            path: path.into(),
            content: Some(content.into()),
            status,
        }
    }

    fn request(files: Vec<ChangedFile>) -> SyncRequest {
        let mut req = SyncRequest::new("backend", "main", EventType::Save);
        req.changed_files = files;
        req
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let cp = Codeprism::in_memory(CodeprismConfig::default()).unwrap();
        let resp = cp.handle_sync(&SyncRequest::new("", "", EventType::Save)).unwrap();
        assert_eq!(resp, SyncResponse::default());
    }

    #[test]
    fn oversized_or_anonymous_batches_are_rejected() {
        let mut config = CodeprismConfig::default();
        config.sync.batch_size_limit = 1;
        let cp = Codeprism::in_memory(config).unwrap();
        let two = request(vec![
            file("a.rb", "", FileStatus::Added),
            file("b.rb", "", FileStatus::Added),
        ]);
        assert!(matches!(cp.handle_sync(&two), Err(CodeprismError::InvalidInput(_))));

        let mut anon = request(vec![file("a.rb", "", FileStatus::Added)]);
        anon.repo = " ".into();
        assert!(cp.handle_sync(&anon).is_err());
    }

    #[test]
    fn unparseable_content_still_counts() {
        let cp = Codeprism::in_memory(CodeprismConfig::default()).unwrap();
        let resp = cp
            .handle_sync(&request(vec![file("app/models/broken.rb", "class <<<< end end (", FileStatus::Added)]))
            .unwrap();
        assert_eq!(resp.indexed, 1);
        let entry = cp.storage().get_file("backend", "main", "app/models/broken.rb").unwrap().unwrap();
        assert_eq!(entry.parsed.role, FileRole::Domain);
    }

    #[test]
    fn roles_follow_repository_config() {
        let mut config = CodeprismConfig::default();
        config.repos.insert(
            "backend".into(),
            RepoConfig {
                test_dirs: vec!["checks".into()],
                ..Default::default()
            },
        );
        let cp = Codeprism::in_memory(config).unwrap();
        cp.handle_sync(&request(vec![file("checks/patient_check.rb", "class PatientCheck; end", FileStatus::Added)]))
            .unwrap();
        let entry = cp.storage().get_file("backend", "main", "checks/patient_check.rb").unwrap().unwrap();
        assert_eq!(entry.parsed.role, FileRole::Test);
    }

    #[test]
    fn import_hubs_are_promoted() {
        let mut config = CodeprismConfig::default();
        config.sync.hub_threshold = 2;
        let cp = Codeprism::in_memory(config).unwrap();
        cp.handle_sync(&request(vec![
            file("app/core.py", "class Core:\n    pass\n", FileStatus::Added),
            file("app/one.py", "from app.core import Core\n", FileStatus::Added),
            file("app/two.py", "from app.core import Core\n", FileStatus::Added),
        ]))
        .unwrap();
        let hub = cp.storage().get_file("backend", "main", "app/core.py").unwrap().unwrap();
        assert_eq!(hub.parsed.role, FileRole::EntryPoint);
        assert!(!cp.storage().edges_from("backend", "app/one.py").unwrap().is_empty());
    }

    #[test]
    fn deleted_file_leaves_flows_and_edges() {
        let cp = Codeprism::in_memory(CodeprismConfig::default()).unwrap();
        cp.handle_sync(&request(vec![
            file("app/core.py", "class Core:\n    pass\n", FileStatus::Added),
            file("app/one.py", "from app.core import Core\n", FileStatus::Added),
        ]))
        .unwrap();
        let mut card = Card::new("c1", "core", "Core", "core things", CardType::Flow);
        card.source_files = vec!["app/core.py".into()];
        card.source_repos = vec!["backend".into()];
        cp.storage().upsert_card(&card).unwrap();
        cp.storage().link_card_files(&card).unwrap();
        assert_eq!(cp.storage().flows_for_file("backend", "app/core.py").unwrap(), vec!["core"]);

        let resp = cp
            .handle_sync(&request(vec![ChangedFile {
                path: "app/core.py".into(),
                content: None,
                status: FileStatus::Deleted,
            }]))
            .unwrap();
        assert_eq!(resp, SyncResponse { indexed: 1, invalidated: 1 });
        assert!(cp.storage().flows_for_file("backend", "app/core.py").unwrap().is_empty());
        assert!(cp.storage().edges_from("backend", "app/one.py").unwrap().is_empty());
    }
}
