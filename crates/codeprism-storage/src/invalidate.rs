//! Staleness invalidation.
//!
//! All three operations return how many rows went from fresh to stale, so a
//! repeated call with the same input returns 0. They take a `&Connection` so
//! the sync receiver can run them inside its batch transaction.

use crate::{storage_err, Storage};
use codeprism_core::{CodeprismError, DocType, WORKSPACE_REPO};
use rusqlite::{params, Connection};
use std::collections::BTreeSet;

/// Stale every fresh card whose `source_files` contains a changed file and
/// whose `source_repos` contains `repo`.
pub fn invalidate_cards(conn: &Connection, changed_files: &[String], repo: &str) -> Result<usize, CodeprismError> {
    let now = chrono::Utc::now().timestamp();
    let mut total = 0;
    for path in changed_files {
        total += conn
            .execute(
                "UPDATE cards SET stale = 1, updated_at = ?3
                 WHERE stale = 0
                   AND EXISTS (SELECT 1 FROM json_each(cards.source_files) WHERE value = ?1)
                   AND EXISTS (SELECT 1 FROM json_each(cards.source_repos) WHERE value = ?2)",
                params![path, repo, now],
            )
            .map_err(storage_err)?;
    }
    if total > 0 {
        tracing::debug!(repo, files = changed_files.len(), cards = total, "invalidated cards");
    }
    Ok(total)
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn is_schema_file(path: &str) -> bool {
    path.ends_with("db/schema.rb")
        || path.ends_with("schema.prisma")
        || path.ends_with("structure.sql")
        || path.ends_with(".sql")
        || path.contains("migrations/")
        || path.contains("db/migrate/")
}

fn is_model_file(path: &str) -> bool {
    let name = basename(path);
    path.contains("app/models/")
        || path.starts_with("models/")
        || path.contains("/models/")
        || path.contains("entities/")
        || name == "models.py"
        || name.ends_with(".model.ts")
        || name.ends_with(".model.js")
}

fn is_stylesheet(path: &str) -> bool {
    let name = basename(path);
    let ext = name.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
    matches!(ext, "css" | "scss" | "sass" | "less") || name.starts_with("tailwind.config")
}

const MANIFESTS: &[&str] = &[
    "package.json",
    "Gemfile",
    "Gemfile.lock",
    "requirements.txt",
    "pyproject.toml",
    "go.mod",
    "Cargo.toml",
    "composer.json",
];

/// Doc types affected by a change set, before cascades.
pub fn affected_doc_types(changed_files: &[String], is_merge_event: bool) -> BTreeSet<DocType> {
    let mut types = BTreeSet::new();
    for path in changed_files {
        if is_schema_file(path) {
            types.extend([DocType::Architecture, DocType::Rules]);
        }
        if is_model_file(path) {
            types.extend([DocType::About, DocType::Architecture, DocType::Rules]);
        }
        if is_stylesheet(path) {
            types.insert(DocType::Styles);
        }
        if MANIFESTS.contains(&basename(path)) {
            types.insert(DocType::Readme);
        }
    }
    if is_merge_event && !changed_files.is_empty() {
        types.insert(DocType::Changelog);
    }
    types
}

/// Apply the path-pattern rule table to the repository's project docs.
///
/// About/architecture changes cascade to the repository specialist and the
/// workspace-level specialist.
pub fn invalidate_project_docs(
    conn: &Connection,
    changed_files: &[String],
    repo: &str,
    is_merge_event: bool,
) -> Result<usize, CodeprismError> {
    let types = affected_doc_types(changed_files, is_merge_event);
    if types.is_empty() {
        return Ok(0);
    }
    let cascade = types.contains(&DocType::About) || types.contains(&DocType::Architecture);

    let now = chrono::Utc::now().timestamp();
    let stale = |target_repo: &str, doc_type: DocType| -> Result<usize, CodeprismError> {
        conn.execute(
            "UPDATE project_docs SET stale = 1, updated_at = ?3 WHERE repository = ?1 AND doc_type = ?2 AND stale = 0",
            params![target_repo, doc_type.as_str(), now],
        )
        .map_err(storage_err)
    };

    let mut total = 0;
    for doc_type in &types {
        total += stale(repo, *doc_type)?;
    }
    if cascade {
        total += stale(repo, DocType::Specialist)?;
        if repo != WORKSPACE_REPO {
            total += stale(WORKSPACE_REPO, DocType::Specialist)?;
        }
    }
    if total > 0 {
        tracing::debug!(repo, docs = total, "invalidated project docs");
    }
    Ok(total)
}

/// Follow edges leaving the changed files of `repo` into other repositories
/// and stale every fresh cross-service card that references a target file
/// in the target repository.
pub fn propagate_cross_repo_staleness(
    conn: &Connection,
    changed_files: &[String],
    repo: &str,
) -> Result<usize, CodeprismError> {
    let mut targets: BTreeSet<(String, String)> = BTreeSet::new();
    {
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT target_repo, target_file FROM graph_edges
                 WHERE repository = ?1 AND source_file = ?2 AND target_repo != ?1",
            )
            .map_err(storage_err)?;
        for path in changed_files {
            let rows = stmt
                .query_map(params![repo, path], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(storage_err)?;
            for row in rows {
                targets.insert(row.map_err(storage_err)?);
            }
        }
    }

    let now = chrono::Utc::now().timestamp();
    let mut total = 0;
    for (target_repo, target_file) in &targets {
        total += conn
            .execute(
                "UPDATE cards SET stale = 1, updated_at = ?3
                 WHERE stale = 0 AND card_type = 'cross_service'
                   AND EXISTS (SELECT 1 FROM json_each(cards.source_files) WHERE value = ?2)
                   AND EXISTS (SELECT 1 FROM json_each(cards.source_repos) WHERE value = ?1)",
                params![target_repo, target_file, now],
            )
            .map_err(storage_err)?;
    }
    if total > 0 {
        tracing::info!(repo, targets = targets.len(), cards = total, "propagated staleness across repositories");
    }
    Ok(total)
}

impl Storage {
    pub fn invalidate_cards(&self, changed_files: &[String], repo: &str) -> Result<usize, CodeprismError> {
        self.with_transaction(|tx| invalidate_cards(tx, changed_files, repo))
    }

    pub fn invalidate_project_docs(
        &self,
        changed_files: &[String],
        repo: &str,
        is_merge_event: bool,
    ) -> Result<usize, CodeprismError> {
        self.with_transaction(|tx| invalidate_project_docs(tx, changed_files, repo, is_merge_event))
    }

    pub fn propagate_cross_repo_staleness(&self, changed_files: &[String], repo: &str) -> Result<usize, CodeprismError> {
        self.with_transaction(|tx| propagate_cross_repo_staleness(tx, changed_files, repo))
    }
}
