//! Branch garbage collection.

use crate::{cards, storage_err, Storage};
use codeprism_core::CodeprismError;
use rusqlite::{params, Connection};

/// What one GC pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct GcReport {
    pub file_rows: usize,
    pub cards_pruned: usize,
    /// Ids of deleted cards, so callers can drop them from the vector index.
    pub deleted_cards: Vec<String>,
    pub edges: usize,
    pub flow_members: usize,
}

/// Purge data for branches of `repo` that are no longer in `live_branches`.
///
/// An empty live set is treated as "unknown" and removes nothing.
pub fn collect_branches(
    conn: &Connection,
    repo: &str,
    live_branches: &[String],
) -> Result<GcReport, CodeprismError> {
    let mut report = GcReport::default();
    if live_branches.is_empty() {
        return Ok(report);
    }
    let live_json = serde_json::to_string(live_branches)?;

    report.file_rows = conn
        .execute(
            "DELETE FROM file_index WHERE repository = ?1
               AND branch NOT IN (SELECT value FROM json_each(?2))",
            params![repo, live_json],
        )
        .map_err(storage_err)?;

    // Branch-scoped cards sourced from this repository.
    let scoped: Vec<(String, String)> = {
        let mut stmt = conn
            .prepare(
                "SELECT id, valid_branches FROM cards
                 WHERE valid_branches IS NOT NULL AND valid_branches != '[]'
                   AND EXISTS (SELECT 1 FROM json_each(cards.source_repos) WHERE value = ?1)
                 ORDER BY id",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![repo], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(storage_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(storage_err)?
    };
    for (id, raw) in scoped {
        let branches: Vec<String> = serde_json::from_str(&raw).unwrap_or_default();
        let kept: Vec<String> = branches
            .iter()
            .filter(|b| live_branches.contains(b))
            .cloned()
            .collect();
        if kept.len() == branches.len() {
            continue;
        }
        if kept.is_empty() {
            cards::delete_card(conn, &id)?;
            report.deleted_cards.push(id);
        } else {
            conn.execute(
                "UPDATE cards SET valid_branches = ?1 WHERE id = ?2",
                params![serde_json::to_string(&kept)?, id],
            )
            .map_err(storage_err)?;
            report.cards_pruned += 1;
        }
    }

    report.edges = conn
        .execute(
            "DELETE FROM graph_edges
             WHERE NOT EXISTS (SELECT 1 FROM file_index f WHERE f.repository = graph_edges.repository AND f.path = graph_edges.source_file)
                OR NOT EXISTS (SELECT 1 FROM file_index f WHERE f.repository = graph_edges.target_repo AND f.path = graph_edges.target_file)",
            [],
        )
        .map_err(storage_err)?;

    report.flow_members = conn
        .execute(
            "DELETE FROM flow_files WHERE repository = ?1
               AND NOT EXISTS (SELECT 1 FROM file_index f WHERE f.repository = flow_files.repository AND f.path = flow_files.path)",
            params![repo],
        )
        .map_err(storage_err)?;

    Ok(report)
}

impl Storage {
    /// Run branch GC for one repository in a single transaction.
    pub fn collect_branches(&self, repo: &str, live_branches: &[String]) -> Result<GcReport, CodeprismError> {
        let report = self.with_transaction(|tx| collect_branches(tx, repo, live_branches))?;
        tracing::info!(
            repo,
            files = report.file_rows,
            cards_deleted = report.deleted_cards.len(),
            cards_pruned = report.cards_pruned,
            edges = report.edges,
            "branch gc"
        );
        Ok(report)
    }
}
