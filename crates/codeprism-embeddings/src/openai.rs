//! OpenAI-compatible providers.
//!
//! Works with OpenAI, Azure OpenAI, Together.ai, and any OpenAI-compatible API.
//! Default embedding model: text-embedding-3-small.

use codeprism_core::CodeprismError;

/// Default OpenAI API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default embedding model.
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Default chat model for generation.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

struct Client {
    api_key: String,
    base_url: String,
    http: reqwest::blocking::Client,
}

impl Client {
    fn new(api_key: &str, base_url: Option<&str>) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').to_string(),
            http: reqwest::blocking::Client::new(),
        }
    }

    fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
        wrap: fn(String) -> CodeprismError,
    ) -> Result<serde_json::Value, CodeprismError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .map_err(|e| wrap(format!("OpenAI request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(wrap(format!("OpenAI returned status {status}: {body}")));
        }

        response
            .json()
            .map_err(|e| wrap(format!("OpenAI response parse error: {e}")))
    }
}

/// OpenAI embedding provider.
pub struct OpenAIProvider {
    client: Client,
    model: String,
    dimensions: usize,
}

impl OpenAIProvider {
    pub fn new(api_key: &str, model: &str, dimensions: usize, base_url: Option<&str>) -> Self {
        Self {
            client: Client::new(api_key, base_url),
            model: model.to_string(),
            dimensions,
        }
    }

    /// text-embedding-3-small at 768 dimensions.
    pub fn with_api_key(api_key: &str) -> Self {
        Self::new(api_key, DEFAULT_MODEL, 768, None)
    }

    fn request(&self, input: serde_json::Value) -> Result<Vec<Vec<f32>>, CodeprismError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": input,
        });
        // text-embedding-3-* supports custom dimensions
        if self.model.starts_with("text-embedding-3") {
            body["dimensions"] = serde_json::json!(self.dimensions);
        }
        let json = self.client.post("/embeddings", &body, CodeprismError::Embedding)?;

        let data = json
            .get("data")
            .and_then(|v| v.as_array())
            .ok_or_else(|| CodeprismError::Embedding("Missing data in OpenAI response".into()))?;

        // Items carry an index; the API does not promise input order.
        let mut items: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
        for (pos, item) in data.iter().enumerate() {
            let index = item
                .get("index")
                .and_then(|v| v.as_u64())
                .map(|i| i as usize)
                .unwrap_or(pos);
            let embedding = item
                .get("embedding")
                .and_then(|v| v.as_array())
                .ok_or_else(|| CodeprismError::Embedding("Missing embedding in OpenAI response".into()))?
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            items.push((index, embedding));
        }
        items.sort_by_key(|(i, _)| *i);
        Ok(items.into_iter().map(|(_, e)| e).collect())
    }
}

impl super::EmbeddingProvider for OpenAIProvider {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, CodeprismError> {
        self.request(serde_json::json!(text))?
            .into_iter()
            .next()
            .ok_or_else(|| CodeprismError::Embedding("Missing embedding in OpenAI response".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, CodeprismError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let out = self.request(serde_json::json!(texts))?;
        if out.len() != texts.len() {
            return Err(CodeprismError::Embedding(format!(
                "OpenAI returned {} embeddings for {} inputs",
                out.len(),
                texts.len()
            )));
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Chat-completions generation.
pub struct OpenAIGenerator {
    client: Client,
    model: String,
}

impl OpenAIGenerator {
    pub fn new(api_key: &str, model: &str, base_url: Option<&str>) -> Self {
        Self {
            client: Client::new(api_key, base_url),
            model: model.to_string(),
        }
    }
}

impl super::GenerationProvider for OpenAIGenerator {
    fn generate(&self, prompt: &str) -> Result<String, CodeprismError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.2,
        });
        let json = self.client.post("/chat/completions", &body, CodeprismError::Generation)?;
        json.pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| CodeprismError::Generation("Missing message content in OpenAI response".into()))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EmbeddingProvider, GenerationProvider};

    #[test]
    fn openai_provider_construction() {
        let provider = OpenAIProvider::with_api_key("test-key");
        assert_eq!(provider.model, DEFAULT_MODEL);
        assert_eq!(provider.dimensions(), 768);
        assert_eq!(provider.client.base_url, DEFAULT_BASE_URL);

        let custom = OpenAIProvider::new("k", "custom-model", 1536, Some("https://api.together.xyz/v1/"));
        assert_eq!(custom.client.base_url, "https://api.together.xyz/v1");
    }

    #[test]
    fn openai_batch_reorders_by_index() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/embeddings")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]}"#,
            )
            .create();

        let provider = OpenAIProvider::new("test-key", "custom", 2, Some(&server.url()));
        let out = provider.embed_batch(&["first", "second"]).unwrap();
        mock.assert();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn openai_error_status_includes_body() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/embeddings")
            .with_status(401)
            .with_body("bad key")
            .create();

        let provider = OpenAIProvider::new("k", "custom", 2, Some(&server.url()));
        let err = provider.embed("x").unwrap_err().to_string();
        assert!(err.contains("401"), "{err}");
        assert!(err.contains("bad key"), "{err}");
    }

    #[test]
    fn openai_chat_generation() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": [{"message": {"role": "assistant", "content": "Billing runs nightly."}}]}"#)
            .create();

        let generator = OpenAIGenerator::new("k", DEFAULT_CHAT_MODEL, Some(&server.url()));
        assert_eq!(generator.generate("q").unwrap(), "Billing runs nightly.");
        mock.assert();
    }
}
