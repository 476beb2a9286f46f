//! Card CRUD, the FTS5 keyword index and card embeddings.

use crate::{storage_err, timestamp, Storage};
use codeprism_core::{Card, CodeprismError};
use rusqlite::{params, Connection, OptionalExtension};

const CARD_COLUMNS: &str = "id, flow, title, content, card_type, source_files, source_repos, tags, stale, usage_count, specificity_score, identifiers, valid_branches, commit_sha, created_at, updated_at";

/// SQL fragment: card `c` is valid on branch parameter `?N` (NULL = any branch).
fn branch_clause(param: usize) -> String {
    format!(
        "(?{param} IS NULL OR c.valid_branches IS NULL OR c.valid_branches = '[]'
          OR EXISTS (SELECT 1 FROM json_each(c.valid_branches) WHERE value = ?{param}))"
    )
}

/// A keyword match: card id plus a relevance score (higher is better).
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    pub card_id: String,
    pub score: f64,
}

struct CardRow {
    id: String,
    flow: String,
    title: String,
    content: String,
    card_type: String,
    source_files: String,
    source_repos: String,
    tags: String,
    stale: bool,
    usage_count: i64,
    specificity_score: f64,
    identifiers: String,
    valid_branches: Option<String>,
    commit_sha: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl CardRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            flow: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            card_type: row.get(4)?,
            source_files: row.get(5)?,
            source_repos: row.get(6)?,
            tags: row.get(7)?,
            stale: row.get(8)?,
            usage_count: row.get(9)?,
            specificity_score: row.get(10)?,
            identifiers: row.get(11)?,
            valid_branches: row.get(12)?,
            commit_sha: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    fn into_card(self) -> Result<Card, CodeprismError> {
        Ok(Card {
            card_type: self.card_type.parse()?,
            source_files: serde_json::from_str(&self.source_files).unwrap_or_default(),
            source_repos: serde_json::from_str(&self.source_repos).unwrap_or_default(),
            tags: serde_json::from_str(&self.tags).unwrap_or_default(),
            valid_branches: self
                .valid_branches
                .as_deref()
                .and_then(|v| serde_json::from_str(v).ok()),
            id: self.id,
            flow: self.flow,
            title: self.title,
            content: self.content,
            stale: self.stale,
            usage_count: self.usage_count.max(0) as u64,
            specificity_score: self.specificity_score,
            identifiers: self.identifiers,
            commit_sha: self.commit_sha,
            created_at: timestamp(self.created_at),
            updated_at: timestamp(self.updated_at),
        })
    }
}

fn query_cards(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Card>, CodeprismError> {
    let mut stmt = conn.prepare(sql).map_err(storage_err)?;
    let rows = stmt
        .query_map(params, CardRow::from_row)
        .map_err(storage_err)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(storage_err)?.into_card()?);
    }
    Ok(out)
}

fn sync_fts(conn: &Connection, card: &Card) -> Result<(), CodeprismError> {
    conn.execute("DELETE FROM cards_fts WHERE card_id = ?1", params![card.id])
        .map_err(storage_err)?;
    conn.execute(
        "INSERT INTO cards_fts (card_id, title, content, flow, tags, identifiers) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            card.id,
            card.title,
            card.content,
            card.flow,
            card.tags.join(" "),
            card.identifiers
        ],
    )
    .map_err(storage_err)?;
    Ok(())
}

/// Insert or fully replace a card and its keyword index row.
pub fn upsert_card(conn: &Connection, card: &Card) -> Result<(), CodeprismError> {
    let valid_branches = card
        .valid_branches
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO cards ({CARD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
        ),
        params![
            card.id,
            card.flow,
            card.title,
            card.content,
            card.card_type.as_str(),
            serde_json::to_string(&card.source_files)?,
            serde_json::to_string(&card.source_repos)?,
            serde_json::to_string(&card.tags)?,
            card.stale,
            card.usage_count as i64,
            card.specificity_score,
            card.identifiers,
            valid_branches,
            card.commit_sha,
            card.created_at.timestamp(),
            card.updated_at.timestamp(),
        ],
    )
    .map_err(storage_err)?;
    sync_fts(conn, card)
}

pub fn get_card(conn: &Connection, id: &str) -> Result<Option<Card>, CodeprismError> {
    let row = conn
        .query_row(
            &format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1"),
            params![id],
            CardRow::from_row,
        )
        .optional()
        .map_err(storage_err)?;
    row.map(CardRow::into_card).transpose()
}

/// Replace a stale card's content and mark it fresh.
pub fn refresh_card(
    conn: &Connection,
    id: &str,
    content: &str,
    commit_sha: Option<&str>,
) -> Result<bool, CodeprismError> {
    let n = conn
        .execute(
            "UPDATE cards SET content = ?1, commit_sha = COALESCE(?2, commit_sha), stale = 0, updated_at = ?3 WHERE id = ?4",
            params![content, commit_sha, chrono::Utc::now().timestamp(), id],
        )
        .map_err(storage_err)?;
    if let Some(card) = get_card(conn, id)? {
        sync_fts(conn, &card)?;
    }
    Ok(n > 0)
}

/// Delete a card with its keyword row and embedding.
pub fn delete_card(conn: &Connection, id: &str) -> Result<bool, CodeprismError> {
    conn.execute("DELETE FROM cards_fts WHERE card_id = ?1", params![id])
        .map_err(storage_err)?;
    conn.execute("DELETE FROM card_embeddings WHERE card_id = ?1", params![id])
        .map_err(storage_err)?;
    let n = conn
        .execute("DELETE FROM cards WHERE id = ?1", params![id])
        .map_err(storage_err)?;
    Ok(n > 0)
}

/// Stale cards, optionally limited to cards sourced from `repo`.
pub fn stale_cards(conn: &Connection, repo: Option<&str>, limit: usize) -> Result<Vec<Card>, CodeprismError> {
    query_cards(
        conn,
        &format!(
            "SELECT {CARD_COLUMNS} FROM cards c WHERE c.stale = 1
               AND (?1 IS NULL OR EXISTS (SELECT 1 FROM json_each(c.source_repos) WHERE value = ?1))
             ORDER BY c.updated_at, c.id LIMIT ?2"
        ),
        params![repo, limit as i64],
    )
}

pub fn count_stale(conn: &Connection, repo: Option<&str>) -> Result<usize, CodeprismError> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM cards c WHERE c.stale = 1
               AND (?1 IS NULL OR EXISTS (SELECT 1 FROM json_each(c.source_repos) WHERE value = ?1))",
            params![repo],
            |row| row.get(0),
        )
        .map_err(storage_err)?;
    Ok(n as usize)
}

/// Full-text search over title, content, flow, tags and identifiers of
/// non-stale cards valid on `branch`.
pub fn keyword_search(
    conn: &Connection,
    query: &str,
    branch: Option<&str>,
    limit: usize,
) -> Result<Vec<KeywordHit>, CodeprismError> {
    let Some(fts) = fts_query(query) else {
        return Ok(Vec::new());
    };
    let sql = format!(
        "SELECT cards_fts.card_id, bm25(cards_fts, 0.0, 3.0, 1.0, 2.0, 1.0, 2.0) AS rank
         FROM cards_fts JOIN cards c ON c.id = cards_fts.card_id
         WHERE cards_fts MATCH ?1 AND c.stale = 0 AND {}
         ORDER BY rank, c.id LIMIT ?2",
        branch_clause(3)
    );
    let mut stmt = conn.prepare(&sql).map_err(storage_err)?;
    let rows = stmt
        .query_map(params![fts, limit as i64, branch], |row| {
            Ok(KeywordHit {
                card_id: row.get(0)?,
                score: -row.get::<_, f64>(1)?,
            })
        })
        .map_err(storage_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(storage_err)
}

/// OR-joined quoted terms; `None` when the query has nothing searchable.
fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.chars().count() >= 2)
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" OR "))
}

pub fn increment_usage(conn: &Connection, ids: &[String]) -> Result<(), CodeprismError> {
    for id in ids {
        conn.execute(
            "UPDATE cards SET usage_count = usage_count + 1 WHERE id = ?1",
            params![id],
        )
        .map_err(storage_err)?;
    }
    Ok(())
}

pub fn store_embedding(conn: &Connection, card_id: &str, embedding: &[f32]) -> Result<(), CodeprismError> {
    let blob: Vec<u8> = embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
    conn.execute(
        "INSERT OR REPLACE INTO card_embeddings (card_id, dimensions, embedding) VALUES (?1, ?2, ?3)",
        params![card_id, embedding.len() as i64, blob],
    )
    .map_err(storage_err)?;
    Ok(())
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

impl Storage {
    pub fn upsert_card(&self, card: &Card) -> Result<(), CodeprismError> {
        upsert_card(&*self.conn()?, card)
    }

    pub fn get_card(&self, id: &str) -> Result<Option<Card>, CodeprismError> {
        get_card(&*self.conn()?, id)
    }

    /// Cards for `ids`, in the order given; unknown ids are skipped.
    pub fn get_cards(&self, ids: &[String]) -> Result<Vec<Card>, CodeprismError> {
        let conn = self.conn()?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(card) = get_card(&conn, id)? {
                out.push(card);
            }
        }
        Ok(out)
    }

    pub fn cards_by_flow(&self, flow: &str) -> Result<Vec<Card>, CodeprismError> {
        query_cards(
            &*self.conn()?,
            &format!("SELECT {CARD_COLUMNS} FROM cards WHERE flow = ?1 ORDER BY title, id"),
            params![flow],
        )
    }

    /// Every card, stale ones included, ordered by id.
    pub fn all_cards(&self) -> Result<Vec<Card>, CodeprismError> {
        query_cards(
            &*self.conn()?,
            &format!("SELECT {CARD_COLUMNS} FROM cards ORDER BY id"),
            [],
        )
    }

    /// Non-stale cards valid on `branch` whose source files include any of `files`
    /// (given as (repository, path) pairs).
    pub fn live_cards_touching(
        &self,
        files: &[(String, String)],
        branch: Option<&str>,
    ) -> Result<Vec<Card>, CodeprismError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {CARD_COLUMNS} FROM cards c WHERE c.stale = 0 AND {}
               AND EXISTS (SELECT 1 FROM json_each(c.source_files) WHERE value = ?1)
               AND EXISTS (SELECT 1 FROM json_each(c.source_repos) WHERE value = ?2)
             ORDER BY c.id",
            branch_clause(3)
        );
        let mut out: Vec<Card> = Vec::new();
        for (repo, path) in files {
            for card in query_cards(&conn, &sql, params![path, repo, branch])? {
                if !out.iter().any(|c| c.id == card.id) {
                    out.push(card);
                }
            }
        }
        Ok(out)
    }

    pub fn stale_cards(&self, repo: Option<&str>, limit: usize) -> Result<Vec<Card>, CodeprismError> {
        stale_cards(&*self.conn()?, repo, limit)
    }

    pub fn count_stale(&self, repo: Option<&str>) -> Result<usize, CodeprismError> {
        count_stale(&*self.conn()?, repo)
    }

    pub fn refresh_card(&self, id: &str, content: &str, commit_sha: Option<&str>) -> Result<bool, CodeprismError> {
        self.with_transaction(|tx| refresh_card(tx, id, content, commit_sha))
    }

    pub fn delete_card(&self, id: &str) -> Result<bool, CodeprismError> {
        self.with_transaction(|tx| delete_card(tx, id))
    }

    pub fn keyword_search(&self, query: &str, branch: Option<&str>, limit: usize) -> Result<Vec<KeywordHit>, CodeprismError> {
        keyword_search(&*self.conn()?, query, branch, limit)
    }

    pub fn increment_usage(&self, ids: &[String]) -> Result<(), CodeprismError> {
        increment_usage(&*self.conn()?, ids)
    }

    pub fn store_embedding(&self, card_id: &str, embedding: &[f32]) -> Result<(), CodeprismError> {
        store_embedding(&*self.conn()?, card_id, embedding)
    }

    pub fn get_embedding(&self, card_id: &str) -> Result<Option<Vec<f32>>, CodeprismError> {
        let conn = self.conn()?;
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT embedding FROM card_embeddings WHERE card_id = ?1",
                params![card_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;
        Ok(blob.map(|b| decode_embedding(&b)))
    }

    /// Every stored card embedding, ordered by card id.
    pub fn all_embeddings(&self) -> Result<Vec<(String, Vec<f32>)>, CodeprismError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT card_id, embedding FROM card_embeddings ORDER BY card_id")
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((id, blob))
            })
            .map_err(storage_err)?;
        let mut result = Vec::new();
        for row in rows {
            let (id, blob) = row.map_err(storage_err)?;
            result.push((id, decode_embedding(&blob)));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeprism_core::CardType;

    fn card(id: &str, title: &str, content: &str) -> Card {
        let mut c = Card::new(id, "billing", title, content, CardType::Flow);
        c.source_files = vec!["app/models/invoice.rb".into()];
        c.source_repos = vec!["backend".into()];
        c
    }

    #[test]
    fn card_roundtrip_preserves_fields() {
        let storage = Storage::open_in_memory().unwrap();
        let mut c = card("c1", "Invoice lifecycle", "Invoices move from draft to paid");
        c.tags = vec!["billing".into()];
        c.valid_branches = Some(vec!["main".into()]);
        c.specificity_score = 0.7;
        storage.upsert_card(&c).unwrap();
        let got = storage.get_card("c1").unwrap().unwrap();
        assert_eq!(got.tags, c.tags);
        assert_eq!(got.valid_branches, c.valid_branches);
        assert_eq!(got.source_repos, vec!["backend"]);
        assert_eq!(got.card_type, CardType::Flow);
        assert!(storage.get_card("missing").unwrap().is_none());
    }

    #[test]
    fn keyword_search_skips_stale_and_wrong_branch() {
        let storage = Storage::open_in_memory().unwrap();
        storage.upsert_card(&card("a", "Invoice lifecycle", "draft to paid invoices")).unwrap();
        let mut stale = card("b", "Invoice refunds", "refund an invoice");
        stale.stale = true;
        storage.upsert_card(&stale).unwrap();
        let mut branch_only = card("c", "Invoice exports", "csv invoice export");
        branch_only.valid_branches = Some(vec!["feature/export".into()]);
        storage.upsert_card(&branch_only).unwrap();

        let ids = |hits: Vec<KeywordHit>| hits.into_iter().map(|h| h.card_id).collect::<Vec<_>>();
        let main = ids(storage.keyword_search("invoice", Some("main"), 10).unwrap());
        assert_eq!(main, vec!["a"]);
        let mut any = ids(storage.keyword_search("invoice", None, 10).unwrap());
        any.sort();
        assert_eq!(any, vec!["a", "c"]);
        assert!(storage.keyword_search("?!", None, 10).unwrap().is_empty());
    }

    #[test]
    fn refresh_clears_stale_and_updates_index() {
        let storage = Storage::open_in_memory().unwrap();
        let mut c = card("a", "Invoice lifecycle", "old words");
        c.stale = true;
        storage.upsert_card(&c).unwrap();
        assert_eq!(storage.count_stale(Some("backend")).unwrap(), 1);
        assert_eq!(storage.count_stale(Some("web")).unwrap(), 0);

        assert!(storage.refresh_card("a", "reconciliation ledger", Some("abc")).unwrap());
        assert_eq!(storage.count_stale(None).unwrap(), 0);
        let hits = storage.keyword_search("reconciliation", None, 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(storage.keyword_search("old", None, 5).unwrap().is_empty());
    }

    #[test]
    fn embeddings_roundtrip_and_cascade_on_delete() {
        let storage = Storage::open_in_memory().unwrap();
        storage.upsert_card(&card("a", "t", "c")).unwrap();
        storage.store_embedding("a", &[0.5, -1.0, 2.0]).unwrap();
        assert_eq!(storage.get_embedding("a").unwrap(), Some(vec![0.5, -1.0, 2.0]));
        assert_eq!(storage.all_embeddings().unwrap().len(), 1);
        assert!(storage.delete_card("a").unwrap());
        assert!(storage.get_embedding("a").unwrap().is_none());
    }

    #[test]
    fn usage_and_touching_lookup() {
        let storage = Storage::open_in_memory().unwrap();
        storage.upsert_card(&card("a", "t", "c")).unwrap();
        storage.increment_usage(&["a".to_string(), "a".to_string()]).unwrap();
        assert_eq!(storage.get_card("a").unwrap().unwrap().usage_count, 2);

        let touching = storage
            .live_cards_touching(&[("backend".into(), "app/models/invoice.rb".into())], None)
            .unwrap();
        assert_eq!(touching.len(), 1);
        let other_repo = storage
            .live_cards_touching(&[("web".into(), "app/models/invoice.rb".into())], None)
            .unwrap();
        assert!(other_repo.is_empty());
    }
}
