//! codeprism-graph: in-memory file dependency graph.
//!
//! A petgraph view over persisted [`GraphEdge`]s. Nodes are `(repository, path)`
//! pairs so cross-repository edges are ordinary edges.

use codeprism_core::{EdgeRelation, GraphEdge};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet};

/// A file node key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileKey {
    pub repository: String,
    pub path: String,
}

impl FileKey {
    pub fn new(repository: &str, path: &str) -> Self {
        Self {
            repository: repository.to_string(),
            path: path.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct FileGraph {
    graph: DiGraph<FileKey, EdgeRelation>,
    index: HashMap<FileKey, NodeIndex>,
}

impl FileGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_edges(edges: &[GraphEdge]) -> Self {
        let mut graph = Self::new();
        for edge in edges {
            graph.add_edge(edge);
        }
        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "built file graph"
        );
        graph
    }

    fn node(&mut self, key: FileKey) -> NodeIndex {
        if let Some(idx) = self.index.get(&key) {
            return *idx;
        }
        let idx = self.graph.add_node(key.clone());
        self.index.insert(key, idx);
        idx
    }

    pub fn add_edge(&mut self, edge: &GraphEdge) {
        let src = self.node(FileKey::new(&edge.repository, &edge.source_file));
        let dst = self.node(FileKey::new(&edge.target_repository, &edge.target_file));
        self.graph.add_edge(src, dst, edge.relation);
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, key: &FileKey) -> bool {
        self.index.contains_key(key)
    }

    /// Files one hop away in either direction, sorted, excluding `key` itself.
    pub fn neighbors(&self, key: &FileKey) -> Vec<FileKey> {
        let Some(&idx) = self.index.get(key) else {
            return Vec::new();
        };
        let set: BTreeSet<FileKey> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .chain(self.graph.neighbors_directed(idx, Direction::Incoming))
            .filter(|n| *n != idx)
            .filter_map(|n| self.graph.node_weight(n).cloned())
            .collect();
        set.into_iter().collect()
    }

    /// One-hop neighbourhood of a set of files, excluding the seeds.
    pub fn neighbors_of<'a>(&self, seeds: impl IntoIterator<Item = &'a FileKey>) -> Vec<FileKey> {
        let seeds: HashSet<&FileKey> = seeds.into_iter().collect();
        let mut out = BTreeSet::new();
        for seed in &seeds {
            for n in self.neighbors(seed) {
                if !seeds.contains(&n) {
                    out.insert(n);
                }
            }
        }
        out.into_iter().collect()
    }

    /// Number of distinct files with an edge of `relation` into `key`.
    pub fn inbound_degree(&self, key: &FileKey, relation: EdgeRelation) -> usize {
        let Some(&idx) = self.index.get(key) else {
            return 0;
        };
        let sources: HashSet<NodeIndex> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .filter(|e| *e.weight() == relation)
            .map(|e| e.source())
            .collect();
        sources.len()
    }
}
