//! One-hop graph expansion around the best results.

use codeprism_core::{Card, CodeprismError};
use codeprism_graph::{FileGraph, FileKey};
use codeprism_storage::Storage;
use std::collections::HashSet;

/// Graph nodes for a card's sources: every (repository, file) pairing that the
/// graph knows about.
pub fn card_nodes(graph: &FileGraph, card: &Card) -> Vec<FileKey> {
    card.source_repos
        .iter()
        .flat_map(|repo| card.source_files.iter().map(move |path| FileKey::new(repo, path)))
        .filter(|key| graph.contains(key))
        .collect()
}

/// Up to `max` non-stale cards, valid on `branch`, whose sources sit one hop
/// (either direction) from the seeds' sources. Cards in `exclude` are skipped.
pub fn graph_neighbours(
    storage: &Storage,
    graph: &FileGraph,
    seeds: &[&Card],
    exclude: &HashSet<String>,
    branch: Option<&str>,
    max: usize,
) -> Result<Vec<Card>, CodeprismError> {
    if max == 0 || seeds.is_empty() || graph.edge_count() == 0 {
        return Ok(Vec::new());
    }
    let seed_nodes: Vec<FileKey> = seeds.iter().flat_map(|c| card_nodes(graph, c)).collect();
    let neighbours = graph.neighbors_of(&seed_nodes);
    if neighbours.is_empty() {
        return Ok(Vec::new());
    }
    let pairs: Vec<(String, String)> = neighbours
        .into_iter()
        .map(|k| (k.repository, k.path))
        .collect();

    let mut found: Vec<Card> = storage
        .live_cards_touching(&pairs, branch)?
        .into_iter()
        .filter(|c| !exclude.contains(&c.id))
        .collect();
    found.sort_by(|a, b| {
        b.specificity_score
            .total_cmp(&a.specificity_score)
            .then_with(|| b.usage_count.cmp(&a.usage_count))
            .then_with(|| a.id.cmp(&b.id))
    });
    found.truncate(max);
    tracing::debug!(seeds = seeds.len(), added = found.len(), "graph expansion");
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeprism_core::{CardType, EdgeRelation, GraphEdge};

    fn card(id: &str, repo: &str, file: &str) -> Card {
        let mut c = Card::new(id, "f", id, "x", CardType::Flow);
        c.source_repos = vec![repo.into()];
        c.source_files = vec![file.into()];
        c
    }

    #[test]
    fn pulls_in_one_hop_cards_only() {
        let storage = Storage::open_in_memory().unwrap();
        let edges = vec![
            GraphEdge::new(EdgeRelation::Import, ("r", "a.rb"), ("r", "b.rb")),
            GraphEdge::new(EdgeRelation::Import, ("r", "c.rb"), ("r", "a.rb")),
            GraphEdge::new(EdgeRelation::Import, ("r", "b.rb"), ("r", "far.rb")),
        ];
        let graph = FileGraph::from_edges(&edges);

        let seed = card("seed", "r", "a.rb");
        storage.upsert_card(&seed).unwrap();
        storage.upsert_card(&card("down", "r", "b.rb")).unwrap();
        storage.upsert_card(&card("up", "r", "c.rb")).unwrap();
        storage.upsert_card(&card("far", "r", "far.rb")).unwrap();
        let mut stale = card("stale", "r", "b.rb");
        stale.stale = true;
        storage.upsert_card(&stale).unwrap();

        let exclude: HashSet<String> = ["seed".to_string()].into_iter().collect();
        let got = graph_neighbours(&storage, &graph, &[&seed], &exclude, None, 5).unwrap();
        let ids: Vec<&str> = got.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["down", "up"]);

        let capped = graph_neighbours(&storage, &graph, &[&seed], &exclude, None, 1).unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn unknown_sources_expand_to_nothing() {
        let storage = Storage::open_in_memory().unwrap();
        let graph = FileGraph::from_edges(&[GraphEdge::new(EdgeRelation::Import, ("r", "a"), ("r", "b"))]);
        let seed = card("s", "other", "a");
        assert!(card_nodes(&graph, &seed).is_empty());
        assert!(graph_neighbours(&storage, &graph, &[&seed], &HashSet::new(), None, 5).unwrap().is_empty());
    }
}
