//! Result rerankers.

use crate::hash::tokens;
use codeprism_core::CodeprismError;
use std::collections::HashSet;
use std::time::Duration;

/// Share of distinct query tokens present in the document. Needs no model.
pub struct LexicalReranker;

impl super::Reranker for LexicalReranker {
    fn rerank(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>, CodeprismError> {
        let query: HashSet<String> = tokens(query).into_iter().filter(|t| t.len() > 1).collect();
        if query.is_empty() {
            return Ok(vec![0.0; documents.len()]);
        }
        Ok(documents
            .iter()
            .map(|doc| {
                let doc: HashSet<String> = tokens(doc).into_iter().collect();
                query.iter().filter(|t| doc.contains(*t)).count() as f32 / query.len() as f32
            })
            .collect())
    }

    fn name(&self) -> &str {
        "lexical"
    }
}

/// Cross-encoder served over HTTP (`POST {url}/v1/rerank`).
///
/// Expects `{"results": [{"index": n, "relevance_score": s}, ...]}`; documents
/// the server omits score 0.
pub struct CrossEncoderReranker {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl CrossEncoderReranker {
    pub fn new(base_url: &str, model: &str, timeout_ms: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(timeout_ms.max(1)))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("reranker client without timeout: {e}");
                reqwest::blocking::Client::new()
            });
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        }
    }
}

impl super::Reranker for CrossEncoderReranker {
    fn rerank(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>, CodeprismError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": documents,
        });
        let response = self
            .client
            .post(format!("{}/v1/rerank", self.base_url))
            .json(&body)
            .send()
            .map_err(|e| CodeprismError::Embedding(format!("Reranker request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(CodeprismError::Embedding(format!(
                "Reranker returned status {}",
                response.status()
            )));
        }
        let json: serde_json::Value = response
            .json()
            .map_err(|e| CodeprismError::Embedding(format!("Reranker response parse error: {e}")))?;

        let results = json
            .get("results")
            .and_then(|v| v.as_array())
            .ok_or_else(|| CodeprismError::Embedding("Missing 'results' field in reranker response".into()))?;

        let mut scores = vec![0.0f32; documents.len()];
        for item in results {
            let index = item.get("index").and_then(|v| v.as_u64()).map(|i| i as usize);
            let score = item.get("relevance_score").and_then(|v| v.as_f64());
            if let (Some(index), Some(score)) = (index, score) {
                if let Some(slot) = scores.get_mut(index) {
                    *slot = score as f32;
                }
            }
        }
        Ok(scores)
    }

    fn name(&self) -> &str {
        "cross-encoder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Reranker;

    #[test]
    fn lexical_scores_query_coverage() {
        let scores = LexicalReranker
            .rerank(
                "patient billing",
                &["Billing for every patient", "Patient records", "Stylesheet"],
            )
            .unwrap();
        assert_eq!(scores, vec![1.0, 0.5, 0.0]);
        assert_eq!(LexicalReranker.rerank("", &["a"]).unwrap(), vec![0.0]);
    }

    #[test]
    fn cross_encoder_maps_results_by_index() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/v1/rerank")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"results": [{"index": 2, "relevance_score": 0.9}, {"index": 0, "relevance_score": 0.1}, {"index": 7, "relevance_score": 1.0}]}"#)
            .create();

        let reranker = CrossEncoderReranker::new(&server.url(), "bge-reranker-base", 500);
        let scores = reranker.rerank("q", &["a", "b", "c"]).unwrap();
        mock.assert();
        assert_eq!(scores, vec![0.1, 0.0, 0.9]);
    }

    #[test]
    fn cross_encoder_failure_is_an_error() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("POST", "/v1/rerank").with_status(503).create();
        let reranker = CrossEncoderReranker::new(&server.url(), "m", 500);
        assert!(reranker.rerank("q", &["a"]).is_err());
        assert!(reranker.rerank("q", &[]).unwrap().is_empty());
    }
}
