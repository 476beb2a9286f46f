//! Query normalization and rewriting.

use codeprism_embeddings::GenerationProvider;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// Lowercase, whitespace-collapsed form used as the cache key.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Prefix `query` with a repository's language/framework tokens so its
/// embedding lands nearer that repository's cards.
pub fn build_semantic_query(query: &str, repo_tokens: &[String]) -> String {
    let query = query.trim();
    if repo_tokens.is_empty() {
        return query.to_string();
    }
    format!("{} {query}", repo_tokens.join(" "))
}

pub fn hyde_prompt(description: &str) -> String {
    format!(
        "You are documenting a codebase. Write a short technical passage (under 120 words) \
         that would answer the following request. Name the likely classes, files, routes \
         and data models involved. Do not add a preamble.\n\nRequest:\n{}\n",
        description.trim()
    )
}

/// Rewrite a long description into a hypothetical answer.
///
/// The generation call runs on its own thread and races `timeout`. When the
/// timeout wins, or generation fails or returns nothing, the description is
/// returned unchanged; a late generation finishes in the background and its
/// result is discarded.
pub fn build_hyde_query(description: &str, generator: Arc<dyn GenerationProvider>, timeout: Duration) -> String {
    let (tx, rx) = mpsc::channel();
    let prompt = hyde_prompt(description);
    let spawned = std::thread::Builder::new()
        .name("codeprism-hyde".into())
        .spawn(move || {
            let _ = tx.send(generator.generate(&prompt));
        });
    if let Err(e) = spawned {
        tracing::warn!("HyDE thread failed to start: {e}");
        return description.to_string();
    }

    match rx.recv_timeout(timeout) {
        Ok(Ok(text)) if !text.trim().is_empty() => {
            tracing::debug!(chars = text.len(), "HyDE rewrite applied");
            text
        }
        Ok(Ok(_)) => description.to_string(),
        Ok(Err(e)) => {
            tracing::warn!("HyDE generation failed, using plain description: {e}");
            description.to_string()
        }
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "HyDE timed out, using plain description");
            description.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeprism_core::CodeprismError;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Slow {
        delay: Duration,
        finished: Arc<AtomicBool>,
    }

    impl GenerationProvider for Slow {
        fn generate(&self, _prompt: &str) -> Result<String, CodeprismError> {
            std::thread::sleep(self.delay);
            self.finished.store(true, Ordering::SeqCst);
            Ok("PatientsController#index lists patients".into())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    struct Failing;

    impl GenerationProvider for Failing {
        fn generate(&self, _prompt: &str) -> Result<String, CodeprismError> {
            Err(CodeprismError::Generation("offline".into()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn normalization_collapses_case_and_space() {
        assert_eq!(normalize_query("  Billing   FILTER\tbug "), "billing filter bug");
        assert_eq!(normalize_query(""), "");
    }

    #[test]
    fn semantic_query_prefixes_tokens() {
        assert_eq!(
            build_semantic_query("list patients", &["ruby".into(), "rails".into()]),
            "ruby rails list patients"
        );
        assert_eq!(build_semantic_query(" q ", &[]), "q");
    }

    #[test]
    fn hyde_uses_generation_when_fast() {
        let finished = Arc::new(AtomicBool::new(false));
        let gen = Arc::new(Slow {
            delay: Duration::from_millis(0),
            finished,
        });
        let out = build_hyde_query("describe", gen, Duration::from_secs(5));
        assert_eq!(out, "PatientsController#index lists patients");
    }

    #[test]
    fn hyde_timeout_falls_back_and_lets_generation_finish() {
        let finished = Arc::new(AtomicBool::new(false));
        let gen = Arc::new(Slow {
            delay: Duration::from_millis(200),
            finished: finished.clone(),
        });
        let out = build_hyde_query("the plain description", gen, Duration::from_millis(10));
        assert_eq!(out, "the plain description");
        assert!(!finished.load(Ordering::SeqCst));
        std::thread::sleep(Duration::from_millis(400));
        assert!(finished.load(Ordering::SeqCst), "background generation was not cancelled");
    }

    #[test]
    fn hyde_failure_falls_back() {
        assert_eq!(
            build_hyde_query("desc", Arc::new(Failing), Duration::from_secs(1)),
            "desc"
        );
    }
}
