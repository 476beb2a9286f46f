//! Flow membership and flow listings.

use crate::{storage_err, Storage};
use codeprism_core::{Card, CodeprismError, FlowSummary};
use rusqlite::{params, Connection};
use std::collections::{BTreeMap, BTreeSet};

pub fn add_file_to_flow(conn: &Connection, flow: &str, repo: &str, path: &str) -> Result<bool, CodeprismError> {
    let n = conn
        .execute(
            "INSERT OR IGNORE INTO flow_files (flow, repository, path) VALUES (?1, ?2, ?3)",
            params![flow, repo, path],
        )
        .map_err(storage_err)?;
    Ok(n > 0)
}

/// Drop a file from every flow. Returns the number of memberships removed.
pub fn remove_file_from_flows(conn: &Connection, repo: &str, path: &str) -> Result<usize, CodeprismError> {
    conn.execute(
        "DELETE FROM flow_files WHERE repository = ?1 AND path = ?2",
        params![repo, path],
    )
    .map_err(storage_err)
}

pub fn flows_for_file(conn: &Connection, repo: &str, path: &str) -> Result<Vec<String>, CodeprismError> {
    let mut stmt = conn
        .prepare("SELECT flow FROM flow_files WHERE repository = ?1 AND path = ?2 ORDER BY flow")
        .map_err(storage_err)?;
    let rows = stmt
        .query_map(params![repo, path], |row| row.get(0))
        .map_err(storage_err)?;
    rows.collect::<Result<Vec<String>, _>>().map_err(storage_err)
}

/// Put a file with no flow into the flow owning most of its neighbours
/// (ties broken by flow name). Returns the chosen flow.
pub fn assign_by_neighbours(
    conn: &Connection,
    repo: &str,
    path: &str,
    neighbours: &[(String, String)],
) -> Result<Option<String>, CodeprismError> {
    if !flows_for_file(conn, repo, path)?.is_empty() {
        return Ok(None);
    }
    let mut votes: BTreeMap<String, usize> = BTreeMap::new();
    for (n_repo, n_path) in neighbours {
        for flow in flows_for_file(conn, n_repo, n_path)? {
            *votes.entry(flow).or_default() += 1;
        }
    }
    // Highest vote count; ties go to the alphabetically first flow.
    let winner = votes
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(flow, _)| flow);
    if let Some(flow) = &winner {
        add_file_to_flow(conn, flow, repo, path)?;
    }
    Ok(winner)
}

/// Record a card's source files as members of its flow. Each path is paired
/// with the source repositories that index it, or with the only source
/// repository when none do.
pub fn link_card_files(conn: &Connection, card: &Card) -> Result<usize, CodeprismError> {
    let mut added = 0;
    for path in &card.source_files {
        let mut linked = false;
        for repo in &card.source_repos {
            let indexed: bool = conn
                .query_row(
                    "SELECT EXISTS (SELECT 1 FROM file_index WHERE repository = ?1 AND path = ?2)",
                    params![repo, path],
                    |row| row.get(0),
                )
                .map_err(storage_err)?;
            if indexed {
                linked = true;
                added += usize::from(add_file_to_flow(conn, &card.flow, repo, path)?);
            }
        }
        if !linked && card.source_repos.len() == 1 {
            added += usize::from(add_file_to_flow(conn, &card.flow, &card.source_repos[0], path)?);
        }
    }
    Ok(added)
}

/// Flows with their non-stale card counts, descending by count then by name.
pub fn list_flows(conn: &Connection) -> Result<Vec<FlowSummary>, CodeprismError> {
    let mut stmt = conn
        .prepare("SELECT flow, stale, source_repos FROM cards")
        .map_err(storage_err)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .map_err(storage_err)?;

    let mut acc: BTreeMap<String, (usize, BTreeSet<String>)> = BTreeMap::new();
    for row in rows {
        let (flow, stale, repos) = row.map_err(storage_err)?;
        let entry = acc.entry(flow).or_default();
        if !stale {
            entry.0 += 1;
        }
        let repos: Vec<String> = serde_json::from_str(&repos).unwrap_or_default();
        entry.1.extend(repos);
    }

    let mut stmt = conn
        .prepare("SELECT flow, COUNT(*) FROM flow_files GROUP BY flow")
        .map_err(storage_err)?;
    let file_counts = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .map_err(storage_err)?
        .collect::<Result<BTreeMap<String, i64>, _>>()
        .map_err(storage_err)?;

    let mut flows: Vec<FlowSummary> = acc
        .into_iter()
        .map(|(flow, (card_count, repos))| FlowSummary {
            file_count: file_counts.get(&flow).copied().unwrap_or(0) as usize,
            flow,
            card_count,
            repos: repos.into_iter().collect(),
        })
        .collect();
    flows.sort_by(|a, b| b.card_count.cmp(&a.card_count).then_with(|| a.flow.cmp(&b.flow)));
    Ok(flows)
}

impl Storage {
    pub fn list_flows(&self) -> Result<Vec<FlowSummary>, CodeprismError> {
        list_flows(&*self.conn()?)
    }

    pub fn flows_for_file(&self, repo: &str, path: &str) -> Result<Vec<String>, CodeprismError> {
        flows_for_file(&*self.conn()?, repo, path)
    }

    pub fn link_card_files(&self, card: &Card) -> Result<usize, CodeprismError> {
        link_card_files(&*self.conn()?, card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::upsert_card;
    use codeprism_core::CardType;

    fn pair(r: &str, p: &str) -> (String, String) {
        (r.to_string(), p.to_string())
    }

    #[test]
    fn majority_neighbour_flow_wins_with_name_tiebreak() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.conn().unwrap();
        add_file_to_flow(&conn, "billing", "r", "a").unwrap();
        add_file_to_flow(&conn, "billing", "r", "b").unwrap();
        add_file_to_flow(&conn, "auth", "r", "c").unwrap();
        add_file_to_flow(&conn, "zeta", "r", "d").unwrap();

        let flow = assign_by_neighbours(&conn, "r", "new", &[pair("r", "a"), pair("r", "b"), pair("r", "c")]).unwrap();
        assert_eq!(flow.as_deref(), Some("billing"));

        let tie = assign_by_neighbours(&conn, "r", "other", &[pair("r", "c"), pair("r", "d")]).unwrap();
        assert_eq!(tie.as_deref(), Some("auth"));

        assert_eq!(assign_by_neighbours(&conn, "r", "new", &[pair("r", "c")]).unwrap(), None);
        assert_eq!(assign_by_neighbours(&conn, "r", "lonely", &[]).unwrap(), None);

        assert_eq!(remove_file_from_flows(&conn, "r", "new").unwrap(), 1);
        assert!(flows_for_file(&conn, "r", "new").unwrap().is_empty());
    }

    #[test]
    fn list_flows_counts_live_cards_descending() {
        let storage = Storage::open_in_memory().unwrap();
        {
            let conn = storage.conn().unwrap();
            let mk = |id: &str, flow: &str, stale: bool, repo: &str| {
                let mut c = Card::new(id, flow, id, "x", CardType::Flow);
                c.stale = stale;
                c.source_repos = vec![repo.to_string()];
                c
            };
            upsert_card(&conn, &mk("1", "billing", false, "backend")).unwrap();
            upsert_card(&conn, &mk("2", "billing", false, "web")).unwrap();
            upsert_card(&conn, &mk("3", "auth", false, "backend")).unwrap();
            upsert_card(&conn, &mk("4", "auth", true, "backend")).unwrap();
            upsert_card(&conn, &mk("5", "admin", false, "backend")).unwrap();
        }
        let flows = storage.list_flows().unwrap();
        let got: Vec<(&str, usize)> = flows.iter().map(|f| (f.flow.as_str(), f.card_count)).collect();
        assert_eq!(got, vec![("billing", 2), ("admin", 1), ("auth", 1)]);
        assert_eq!(flows[0].repos, vec!["backend", "web"]);
        assert_eq!(flows[0].file_count, 0);
    }

    #[test]
    fn file_count_is_distinct_members() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.conn().unwrap();
        upsert_card(&conn, &Card::new("1", "billing", "Billing", "x", CardType::Flow)).unwrap();
        add_file_to_flow(&conn, "billing", "backend", "app/models/invoice.rb").unwrap();
        add_file_to_flow(&conn, "billing", "backend", "app/models/invoice.rb").unwrap();
        add_file_to_flow(&conn, "billing", "web", "app/models/invoice.rb").unwrap();
        add_file_to_flow(&conn, "auth", "backend", "app/models/user.rb").unwrap();

        let flows = list_flows(&conn).unwrap();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].flow, "billing");
        assert_eq!(flows[0].file_count, 2);
    }

    #[test]
    fn card_files_link_to_indexed_repo() {
        let storage = Storage::open_in_memory().unwrap();
        let mut card = Card::new("c", "billing", "t", "x", CardType::CrossService);
        card.source_files = vec!["src/api.ts".into()];
        card.source_repos = vec!["backend".into(), "web".into()];
        {
            let conn = storage.conn().unwrap();
            let parsed = codeprism_core::ParsedFile::new(
                "src/api.ts",
                "web",
                "main",
                codeprism_core::ParsedFragment::empty("typescript"),
            );
            crate::file_index::upsert_file(&conn, &parsed, None, "h").unwrap();
        }
        assert_eq!(storage.link_card_files(&card).unwrap(), 1);
        assert_eq!(storage.flows_for_file("web", "src/api.ts").unwrap(), vec!["billing"]);
        assert!(storage.flows_for_file("backend", "src/api.ts").unwrap().is_empty());
    }
}
