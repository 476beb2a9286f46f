//! Retrieval tools layered on the search engine.

use crate::{ScoredCard, SearchEngine};
use codeprism_core::{Card, CardType, CodeprismError, FlowSummary};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Cards considered when assembling a context bundle.
const CONTEXT_LIMIT: usize = 8;
/// Cards whose scores feed `ticket_files`.
const TICKET_CARD_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct ContextBundle {
    pub cards: Vec<ScoredCard>,
    /// Source files of the returned cards, in card order, without repeats.
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileScore {
    pub path: String,
    pub score: f64,
    /// Number of matching cards referencing the file.
    pub cards: usize,
}

/// CamelCase / snake_case words of `text` plus the stems of `files`.
fn extract_identifiers(text: &str, files: &[String]) -> String {
    let mut out: BTreeSet<String> = BTreeSet::new();
    for word in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
        let inner_upper = word.chars().skip(1).any(|c| c.is_uppercase());
        let snake = word.contains('_') && word.len() > 2;
        if inner_upper || snake {
            out.insert(word.to_string());
        }
    }
    for file in files {
        let name = file.rsplit('/').next().unwrap_or(file);
        let stem = name.split('.').next().unwrap_or(name);
        if !stem.is_empty() {
            out.insert(stem.to_string());
        }
    }
    out.into_iter().collect::<Vec<_>>().join(" ")
}

impl SearchEngine {
    /// Ranked cards for a task description, deduplicated by title and ordered
    /// by card-type priority (flows first), plus the files they reference.
    pub fn context(&self, description: &str, branch: Option<&str>) -> Result<ContextBundle, CodeprismError> {
        let hits = self.search(description, branch, CONTEXT_LIMIT)?;

        let mut seen_titles = HashSet::new();
        let mut cards: Vec<ScoredCard> = hits
            .into_iter()
            .filter(|h| seen_titles.insert(h.card.title.trim().to_lowercase()))
            .collect();
        // Stable: score order is kept within a priority class.
        cards.sort_by_key(|h| h.card.card_type.priority());

        let mut seen_files = HashSet::new();
        let files = cards
            .iter()
            .flat_map(|h| h.card.source_files.iter())
            .filter(|f| seen_files.insert(f.as_str()))
            .cloned()
            .collect();
        Ok(ContextBundle { cards, files })
    }

    /// Files likely touched by a ticket: each matching card's score is added
    /// to every file it references.
    pub fn ticket_files(&self, description: &str, limit: usize) -> Result<Vec<FileScore>, CodeprismError> {
        let hits = self.search(description, None, TICKET_CARD_LIMIT)?;
        let mut acc: HashMap<&str, (f64, usize)> = HashMap::new();
        for hit in &hits {
            for file in &hit.card.source_files {
                let e = acc.entry(file.as_str()).or_insert((0.0, 0));
                e.0 += hit.score;
                e.1 += 1;
            }
        }
        let mut out: Vec<FileScore> = acc
            .into_iter()
            .map(|(path, (score, cards))| FileScore {
                path: path.to_string(),
                score,
                cards,
            })
            .collect();
        out.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
        out.truncate(limit);
        Ok(out)
    }

    /// Persist a developer insight as a searchable card. Returns the card id.
    pub fn save_insight(
        &self,
        flow: &str,
        title: &str,
        content: &str,
        files: &[String],
    ) -> Result<String, CodeprismError> {
        for (name, value) in [("flow", flow), ("title", title), ("content", content)] {
            if value.trim().is_empty() {
                return Err(CodeprismError::InvalidInput(format!("'{name}' must not be empty")));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let mut card = Card::new(&id, flow.trim(), title.trim(), content, CardType::Insight);
        card.source_files = files.to_vec();
        let mut repos = BTreeSet::new();
        for file in files {
            repos.extend(self.storage().repositories_for_path(file)?);
        }
        card.source_repos = repos.into_iter().collect();
        card.tags = vec!["insight".to_string()];
        card.identifiers = extract_identifiers(&format!("{title} {content}"), files);
        card.specificity_score = if files.is_empty() { 0.3 } else { 1.0 / files.len() as f64 };

        self.storage().upsert_card(&card)?;
        self.storage().link_card_files(&card)?;
        if let Err(e) = self.index_card(&card) {
            tracing::warn!(card = %id, "insight saved without embedding: {e}");
        }
        self.clear_cache()?;
        tracing::info!(card = %id, flow = %card.flow, files = files.len(), "saved insight");
        Ok(id)
    }

    pub fn list_flows(&self) -> Result<Vec<FlowSummary>, CodeprismError> {
        self.storage().list_flows()
    }
}
