//! The stale-card refresh job.
//!
//! Each stale card is rewritten by the generation provider from its current
//! content plus the structural records of its source files, then re-embedded
//! and marked fresh.

use crate::reindex::RefreshReport;
use codeprism_core::{Card, CodeprismError, ParsedFile};
use codeprism_embeddings::GenerationProvider;
use codeprism_search::SearchEngine;
use codeprism_storage::Storage;
use std::sync::Arc;

/// Stale cards handled per run.
const REFRESH_BATCH: usize = 200;
/// Items listed per structural field in the prompt.
const PROMPT_ITEMS: usize = 12;

pub struct CardRefresher {
    storage: Arc<Storage>,
    search: Arc<SearchEngine>,
}

impl CardRefresher {
    pub fn new(storage: Arc<Storage>, search: Arc<SearchEngine>) -> Self {
        Self { storage, search }
    }

    /// Refresh stale cards, optionally scoped to cards sourced from `repo`.
    ///
    /// Per-card failures are logged and counted. The run fails only when no
    /// generator is configured or when every attempted card failed.
    pub fn run(&self, repo: Option<&str>) -> Result<RefreshReport, CodeprismError> {
        let generator = self
            .search
            .generator()
            .cloned()
            .ok_or_else(|| CodeprismError::Generation("no generation provider configured".into()))?;

        let stale = self.storage.stale_cards(repo, REFRESH_BATCH)?;
        let mut report = RefreshReport::default();
        for card in &stale {
            match self.refresh_one(card, generator.as_ref()) {
                Ok(()) => report.refreshed += 1,
                Err(e) => {
                    tracing::warn!(card = %card.id, "refresh failed: {e}");
                    report.failed += 1;
                }
            }
        }
        if report.refreshed > 0 {
            self.search.clear_cache()?;
        }
        if report.refreshed == 0 && report.failed > 0 {
            return Err(CodeprismError::Generation(format!(
                "all {} stale cards failed to refresh",
                report.failed
            )));
        }
        Ok(report)
    }

    fn refresh_one(&self, card: &Card, generator: &dyn GenerationProvider) -> Result<(), CodeprismError> {
        let mut sources = Vec::new();
        for repo in &card.source_repos {
            for path in &card.source_files {
                if let Some(parsed) = self.storage.latest_parsed_file(repo, path)? {
                    sources.push(parsed);
                }
            }
        }
        let content = generator.generate(&refresh_prompt(card, &sources))?;
        if content.trim().is_empty() {
            return Err(CodeprismError::Generation("empty completion".into()));
        }
        if !self.storage.refresh_card(&card.id, content.trim(), None)? {
            return Err(CodeprismError::NotFound(format!("card {}", card.id)));
        }
        let Some(updated) = self.storage.get_card(&card.id)? else {
            return Err(CodeprismError::NotFound(format!("card {}", card.id)));
        };
        if let Err(e) = self.search.index_card(&updated) {
            tracing::warn!(card = %card.id, "refreshed without embedding: {e}");
        }
        tracing::debug!(card = %card.id, sources = sources.len(), "card refreshed");
        Ok(())
    }
}

fn list<T>(items: &[T], f: impl Fn(&T) -> String) -> String {
    let mut out: Vec<String> = items.iter().take(PROMPT_ITEMS).map(f).collect();
    if items.len() > PROMPT_ITEMS {
        out.push(format!("... {} more", items.len() - PROMPT_ITEMS));
    }
    out.join(", ")
}

fn describe(file: &ParsedFile) -> String {
    let s = &file.structure;
    let mut lines = vec![format!("- {}:{} ({}, {})", file.repository, file.path, s.language, file.role)];
    if !s.classes.is_empty() {
        lines.push(format!("  classes: {}", list(&s.classes, |c| c.name.clone())));
    }
    if !s.associations.is_empty() {
        lines.push(format!(
            "  associations: {}",
            list(&s.associations, |a| format!("{} {}", a.kind, a.name))
        ));
    }
    if !s.routes.is_empty() {
        lines.push(format!("  routes: {}", list(&s.routes, |r| format!("{} {}", r.method, r.path))));
    }
    if !s.api_calls.is_empty() {
        lines.push(format!("  calls: {}", list(&s.api_calls, |c| format!("{} {}", c.method, c.url))));
    }
    if !s.imports.is_empty() {
        lines.push(format!("  imports: {}", list(&s.imports, Clone::clone)));
    }
    lines.join("\n")
}

/// Prompt asking the generator to rewrite `card` against the current code.
pub fn refresh_prompt(card: &Card, sources: &[ParsedFile]) -> String {
    let structure = if sources.is_empty() {
        "(no indexed source files)".to_string()
    } else {
        sources.iter().map(describe).collect::<Vec<_>>().join("\n")
    };
    format!(
        "The source code behind this knowledge card changed. Rewrite the card so it matches the current structure. \
         Keep the same purpose and roughly the same length. Reply with the card body only.\n\n\
         Title: {}\nFlow: {}\nType: {}\n\nCurrent card:\n{}\n\nCurrent structure:\n{}",
        card.title, card.flow, card.card_type, card.content, structure
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeprism_core::{CardType, ClassInfo, ClassKind, ParsedFragment};

    #[test]
    fn prompt_lists_structure_of_sources() {
        let mut card = Card::new("c", "patients", "Patient model", "old body", CardType::Model);
        card.source_files = vec!["app/models/patient.rb".into()];
        let mut fragment = ParsedFragment::empty("ruby");
        fragment.classes.push(ClassInfo {
            name: "Patient".into(),
            parent: Some("ApplicationRecord".into()),
            kind: ClassKind::Model,
            line: 1,
        });
        let file = ParsedFile::new("app/models/patient.rb", "backend", "main", fragment);

        let prompt = refresh_prompt(&card, &[file]);
        assert!(prompt.contains("old body"));
        assert!(prompt.contains("backend:app/models/patient.rb"));
        assert!(prompt.contains("classes: Patient"));
        assert!(refresh_prompt(&card, &[]).contains("no indexed source files"));
    }

    #[test]
    fn long_lists_are_capped() {
        let items: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        let s = list(&items, Clone::clone);
        assert!(s.ends_with("... 8 more"));
    }
}
