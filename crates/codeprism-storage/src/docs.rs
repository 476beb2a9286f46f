//! Project documents, unique per (repository, doc_type).

use crate::{storage_err, timestamp, Storage};
use codeprism_core::{CodeprismError, DocType, ProjectDoc};
use rusqlite::{params, Connection, OptionalExtension};

pub fn upsert_doc(conn: &Connection, doc: &ProjectDoc) -> Result<(), CodeprismError> {
    conn.execute(
        "INSERT INTO project_docs (repository, doc_type, content, stale, source_file_paths, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(repository, doc_type) DO UPDATE SET
            content = excluded.content,
            stale = excluded.stale,
            source_file_paths = excluded.source_file_paths,
            updated_at = excluded.updated_at",
        params![
            doc.repository,
            doc.doc_type.as_str(),
            doc.content,
            doc.stale,
            serde_json::to_string(&doc.source_file_paths)?,
            doc.updated_at.timestamp(),
        ],
    )
    .map_err(storage_err)?;
    Ok(())
}

pub fn get_doc(conn: &Connection, repo: &str, doc_type: DocType) -> Result<Option<ProjectDoc>, CodeprismError> {
    let row = conn
        .query_row(
            "SELECT content, stale, source_file_paths, updated_at FROM project_docs WHERE repository = ?1 AND doc_type = ?2",
            params![repo, doc_type.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )
        .optional()
        .map_err(storage_err)?;
    Ok(row.map(|(content, stale, paths, updated_at)| ProjectDoc {
        repository: repo.to_string(),
        doc_type,
        content,
        stale,
        source_file_paths: serde_json::from_str(&paths).unwrap_or_default(),
        updated_at: timestamp(updated_at),
    }))
}

impl Storage {
    pub fn upsert_doc(&self, doc: &ProjectDoc) -> Result<(), CodeprismError> {
        upsert_doc(&*self.conn()?, doc)
    }

    pub fn get_doc(&self, repo: &str, doc_type: DocType) -> Result<Option<ProjectDoc>, CodeprismError> {
        get_doc(&*self.conn()?, repo, doc_type)
    }
}
