//! File index rows keyed by (path, repository, branch).

use crate::{storage_err, timestamp, Storage};
use codeprism_core::{CodeprismError, FileIndexEntry, ParsedFile};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, BTreeSet, HashSet};

const HEAT_HALF_LIFE_DAYS: f64 = 7.0;
const HEAT_INCREMENT: f64 = 0.25;

/// Decay `previous` by the elapsed time, then add one change.
pub fn next_heat(previous: f64, elapsed_secs: i64) -> f64 {
    let days = elapsed_secs.max(0) as f64 / 86_400.0;
    let decayed = previous * 0.5f64.powf(days / HEAT_HALF_LIFE_DAYS);
    (decayed + HEAT_INCREMENT).clamp(0.0, 1.0)
}

/// Languages and frameworks observed in one repository's file index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoProfile {
    pub repository: String,
    /// Languages by descending file count.
    pub languages: Vec<(String, usize)>,
    pub frameworks: Vec<String>,
}

impl RepoProfile {
    /// Tokens prefixed to a query classified to this repository.
    pub fn tokens(&self, max_languages: usize) -> Vec<String> {
        self.languages
            .iter()
            .take(max_languages)
            .map(|(l, _)| l.clone())
            .chain(self.frameworks.iter().cloned())
            .collect()
    }
}

/// Insert or replace a parsed file. Returns the new heat score.
pub fn upsert_file(
    conn: &Connection,
    file: &ParsedFile,
    commit_sha: Option<&str>,
    content_hash: &str,
) -> Result<f64, CodeprismError> {
    let now = chrono::Utc::now().timestamp();
    let previous: Option<(f64, i64)> = conn
        .query_row(
            "SELECT heat_score, updated_at FROM file_index WHERE path = ?1 AND repository = ?2 AND branch = ?3",
            params![file.path, file.repository, file.branch],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(storage_err)?;
    let heat = match previous {
        Some((h, at)) => next_heat(h, now - at),
        None => next_heat(0.0, 0),
    };

    conn.execute(
        "INSERT INTO file_index (path, repository, branch, commit_sha, language, role, frameworks, parsed, content_hash, heat_score, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(path, repository, branch) DO UPDATE SET
            commit_sha = excluded.commit_sha,
            language = excluded.language,
            role = excluded.role,
            frameworks = excluded.frameworks,
            parsed = excluded.parsed,
            content_hash = excluded.content_hash,
            heat_score = excluded.heat_score,
            updated_at = excluded.updated_at",
        params![
            file.path,
            file.repository,
            file.branch,
            commit_sha,
            file.language(),
            file.role.as_str(),
            serde_json::to_string(&file.structure.frameworks)?,
            serde_json::to_string(file)?,
            content_hash,
            heat,
            now,
        ],
    )
    .map_err(storage_err)?;
    Ok(heat)
}

/// Rewrite only the stored role and parse record of an existing row.
pub fn update_parsed(conn: &Connection, file: &ParsedFile) -> Result<(), CodeprismError> {
    conn.execute(
        "UPDATE file_index SET role = ?1, parsed = ?2 WHERE path = ?3 AND repository = ?4 AND branch = ?5",
        params![
            file.role.as_str(),
            serde_json::to_string(file)?,
            file.path,
            file.repository,
            file.branch
        ],
    )
    .map_err(storage_err)?;
    Ok(())
}

pub fn delete_file(conn: &Connection, repo: &str, branch: &str, path: &str) -> Result<bool, CodeprismError> {
    let n = conn
        .execute(
            "DELETE FROM file_index WHERE path = ?1 AND repository = ?2 AND branch = ?3",
            params![path, repo, branch],
        )
        .map_err(storage_err)?;
    Ok(n > 0)
}

pub fn get_file(
    conn: &Connection,
    repo: &str,
    branch: &str,
    path: &str,
) -> Result<Option<FileIndexEntry>, CodeprismError> {
    let row = conn
        .query_row(
            "SELECT commit_sha, parsed, content_hash, heat_score, updated_at FROM file_index
             WHERE path = ?1 AND repository = ?2 AND branch = ?3",
            params![path, repo, branch],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )
        .optional()
        .map_err(storage_err)?;

    match row {
        Some((commit_sha, parsed, content_hash, heat_score, updated_at)) => Ok(Some(FileIndexEntry {
            path: path.to_string(),
            repository: repo.to_string(),
            branch: branch.to_string(),
            commit_sha,
            parsed: serde_json::from_str(&parsed)?,
            content_hash,
            heat_score,
            updated_at: timestamp(updated_at),
        })),
        None => Ok(None),
    }
}

fn collect_parsed(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<ParsedFile>, CodeprismError> {
    let mut stmt = conn.prepare(sql).map_err(storage_err)?;
    let rows = stmt
        .query_map(params, |row| row.get::<_, String>(0))
        .map_err(storage_err)?;
    let mut out = Vec::new();
    for row in rows {
        let raw = row.map_err(storage_err)?;
        match serde_json::from_str::<ParsedFile>(&raw) {
            Ok(parsed) => out.push(parsed),
            Err(e) => tracing::warn!("skipping unreadable parse record: {e}"),
        }
    }
    Ok(out)
}

/// Every parsed file of one repository branch, ordered by path.
pub fn parsed_files_for_branch(
    conn: &Connection,
    repo: &str,
    branch: &str,
) -> Result<Vec<ParsedFile>, CodeprismError> {
    collect_parsed(
        conn,
        "SELECT parsed FROM file_index WHERE repository = ?1 AND branch = ?2 ORDER BY path",
        params![repo, branch],
    )
}

/// The most recently updated record of each (repository, path) outside `repo`.
pub fn latest_parsed_files_outside(conn: &Connection, repo: &str) -> Result<Vec<ParsedFile>, CodeprismError> {
    let all = collect_parsed(
        conn,
        "SELECT parsed FROM file_index WHERE repository != ?1 ORDER BY updated_at DESC, branch",
        params![repo],
    )?;
    let mut seen = HashSet::new();
    let mut out: Vec<ParsedFile> = all
        .into_iter()
        .filter(|f| seen.insert((f.repository.clone(), f.path.clone())))
        .collect();
    out.sort_by(|a, b| (&a.repository, &a.path).cmp(&(&b.repository, &b.path)));
    Ok(out)
}

/// Latest parse record for a (repository, path) on any branch.
pub fn latest_parsed_file(conn: &Connection, repo: &str, path: &str) -> Result<Option<ParsedFile>, CodeprismError> {
    Ok(collect_parsed(
        conn,
        "SELECT parsed FROM file_index WHERE repository = ?1 AND path = ?2 ORDER BY updated_at DESC LIMIT 1",
        params![repo, path],
    )?
    .into_iter()
    .next())
}

pub fn branches(conn: &Connection, repo: &str) -> Result<Vec<String>, CodeprismError> {
    let mut stmt = conn
        .prepare("SELECT DISTINCT branch FROM file_index WHERE repository = ?1 ORDER BY branch")
        .map_err(storage_err)?;
    let rows = stmt
        .query_map(params![repo], |row| row.get(0))
        .map_err(storage_err)?;
    rows.collect::<Result<Vec<String>, _>>().map_err(storage_err)
}

/// Repositories that index `path` on any branch.
pub fn repositories_for_path(conn: &Connection, path: &str) -> Result<Vec<String>, CodeprismError> {
    let mut stmt = conn
        .prepare("SELECT DISTINCT repository FROM file_index WHERE path = ?1 ORDER BY repository")
        .map_err(storage_err)?;
    let rows = stmt
        .query_map(params![path], |row| row.get(0))
        .map_err(storage_err)?;
    rows.collect::<Result<Vec<String>, _>>().map_err(storage_err)
}

/// Per-repository language counts and framework ids, sorted by repository.
pub fn repo_profiles(conn: &Connection) -> Result<Vec<RepoProfile>, CodeprismError> {
    let mut languages: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    let mut frameworks: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    let mut stmt = conn
        .prepare("SELECT repository, language, frameworks FROM file_index")
        .map_err(storage_err)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .map_err(storage_err)?;
    for row in rows {
        let (repo, language, fw) = row.map_err(storage_err)?;
        if language != "unknown" {
            *languages
                .entry(repo.clone())
                .or_default()
                .entry(language)
                .or_default() += 1;
        }
        let fw: Vec<String> = serde_json::from_str(&fw).unwrap_or_default();
        frameworks.entry(repo).or_default().extend(fw);
    }

    let repos: BTreeSet<String> = languages.keys().chain(frameworks.keys()).cloned().collect();
    Ok(repos
        .into_iter()
        .map(|repo| {
            let mut langs: Vec<(String, usize)> = languages
                .remove(&repo)
                .unwrap_or_default()
                .into_iter()
                .collect();
            langs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            RepoProfile {
                frameworks: frameworks.remove(&repo).unwrap_or_default().into_iter().collect(),
                repository: repo,
                languages: langs,
            }
        })
        .collect())
}

impl Storage {
    pub fn get_file(&self, repo: &str, branch: &str, path: &str) -> Result<Option<FileIndexEntry>, CodeprismError> {
        get_file(&*self.conn()?, repo, branch, path)
    }

    pub fn parsed_files_for_branch(&self, repo: &str, branch: &str) -> Result<Vec<ParsedFile>, CodeprismError> {
        parsed_files_for_branch(&*self.conn()?, repo, branch)
    }

    pub fn latest_parsed_file(&self, repo: &str, path: &str) -> Result<Option<ParsedFile>, CodeprismError> {
        latest_parsed_file(&*self.conn()?, repo, path)
    }

    pub fn indexed_branches(&self, repo: &str) -> Result<Vec<String>, CodeprismError> {
        branches(&*self.conn()?, repo)
    }

    pub fn repo_profiles(&self) -> Result<Vec<RepoProfile>, CodeprismError> {
        repo_profiles(&*self.conn()?)
    }

    pub fn repositories_for_path(&self, path: &str) -> Result<Vec<String>, CodeprismError> {
        repositories_for_path(&*self.conn()?, path)
    }
}
