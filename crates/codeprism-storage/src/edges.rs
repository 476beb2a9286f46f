//! Persisted graph edges.

use crate::{storage_err, Storage};
use codeprism_core::{CodeprismError, GraphEdge};
use rusqlite::{params, Connection};
use std::collections::{BTreeMap, HashSet};

fn row_to_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, String, String, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn query_edges(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<GraphEdge>, CodeprismError> {
    let mut stmt = conn.prepare(sql).map_err(storage_err)?;
    let rows = stmt.query_map(params, row_to_edge).map_err(storage_err)?;
    let mut out = Vec::new();
    for row in rows {
        let (source_file, target_file, relation, metadata, repository, target_repository) =
            row.map_err(storage_err)?;
        let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata).unwrap_or_default();
        out.push(GraphEdge {
            source_file,
            target_file,
            relation: relation.parse()?,
            metadata,
            repository,
            target_repository,
        });
    }
    Ok(out)
}

const EDGE_COLUMNS: &str = "source_file, target_file, relation, metadata, repository, target_repo";

pub fn insert_edge(conn: &Connection, edge: &GraphEdge) -> Result<(), CodeprismError> {
    conn.execute(
        &format!("INSERT OR REPLACE INTO graph_edges ({EDGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
        params![
            edge.source_file,
            edge.target_file,
            edge.relation.as_str(),
            serde_json::to_string(&edge.metadata)?,
            edge.repository,
            edge.target_repository,
        ],
    )
    .map_err(storage_err)?;
    Ok(())
}

/// Recompute the edges touching `files` (repository, path): every stored edge
/// with either endpoint in the set is dropped and the subset of `edges` with
/// either endpoint in the set is inserted. Returns (removed, inserted).
pub fn replace_edges_touching(
    conn: &Connection,
    files: &[(String, String)],
    edges: &[GraphEdge],
) -> Result<(usize, usize), CodeprismError> {
    let mut removed = 0;
    for (repo, path) in files {
        removed += conn
            .execute(
                "DELETE FROM graph_edges WHERE (repository = ?1 AND source_file = ?2) OR (target_repo = ?1 AND target_file = ?2)",
                params![repo, path],
            )
            .map_err(storage_err)?;
    }

    let touched: HashSet<(&str, &str)> = files.iter().map(|(r, p)| (r.as_str(), p.as_str())).collect();
    let mut inserted = 0;
    for edge in edges {
        let hits = touched.contains(&(edge.repository.as_str(), edge.source_file.as_str()))
            || touched.contains(&(edge.target_repository.as_str(), edge.target_file.as_str()));
        if hits {
            insert_edge(conn, edge)?;
            inserted += 1;
        }
    }
    Ok((removed, inserted))
}

pub fn all_edges(conn: &Connection) -> Result<Vec<GraphEdge>, CodeprismError> {
    query_edges(
        conn,
        &format!("SELECT {EDGE_COLUMNS} FROM graph_edges ORDER BY id"),
        [],
    )
}

/// Edges leaving `path` in `repo`.
pub fn edges_from(conn: &Connection, repo: &str, path: &str) -> Result<Vec<GraphEdge>, CodeprismError> {
    query_edges(
        conn,
        &format!("SELECT {EDGE_COLUMNS} FROM graph_edges WHERE repository = ?1 AND source_file = ?2 ORDER BY id"),
        params![repo, path],
    )
}

impl Storage {
    pub fn all_edges(&self) -> Result<Vec<GraphEdge>, CodeprismError> {
        all_edges(&*self.conn()?)
    }

    pub fn edges_from(&self, repo: &str, path: &str) -> Result<Vec<GraphEdge>, CodeprismError> {
        edges_from(&*self.conn()?, repo, path)
    }

    pub fn insert_edge(&self, edge: &GraphEdge) -> Result<(), CodeprismError> {
        insert_edge(&*self.conn()?, edge)
    }
}
