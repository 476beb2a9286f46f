//! Ollama providers.
//!
//! Embeddings go through `/api/embeddings` (default model nomic-embed-text,
//! 768 dimensions); generation through non-streaming `/api/generate`.

use codeprism_core::CodeprismError;

/// Default Ollama base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default Ollama embedding model.
pub const DEFAULT_MODEL: &str = "nomic-embed-text";

/// Default Ollama generation model.
pub const DEFAULT_GENERATION_MODEL: &str = "llama3.2";

fn post_json(
    client: &reqwest::blocking::Client,
    url: &str,
    body: &serde_json::Value,
    wrap: fn(String) -> CodeprismError,
) -> Result<serde_json::Value, CodeprismError> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .map_err(|e| wrap(format!("Ollama request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(wrap(format!("Ollama returned status {}", response.status())));
    }

    response
        .json()
        .map_err(|e| wrap(format!("Ollama response parse error: {e}")))
}

/// Ollama embedding provider.
pub struct OllamaProvider {
    base_url: String,
    model: String,
    dimensions: usize,
    client: reqwest::blocking::Client,
}

impl OllamaProvider {
    pub fn new(base_url: &str, model: &str, dimensions: usize) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimensions,
            client: reqwest::blocking::Client::new(),
        }
    }

    /// localhost:11434, nomic-embed-text.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_MODEL, 768)
    }
}

impl super::EmbeddingProvider for OllamaProvider {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, CodeprismError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });
        let json = post_json(&self.client, &url, &body, CodeprismError::Embedding)?;

        let embedding: Vec<f32> = json
            .get("embedding")
            .and_then(|v| v.as_array())
            .ok_or_else(|| CodeprismError::Embedding("Missing 'embedding' field in response".into()))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        if embedding.len() != self.dimensions {
            return Err(CodeprismError::Embedding(format!(
                "Ollama returned {} dimensions, expected {}",
                embedding.len(),
                self.dimensions
            )));
        }
        Ok(embedding)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Ollama text generation.
pub struct OllamaGenerator {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl OllamaGenerator {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl super::GenerationProvider for OllamaGenerator {
    fn generate(&self, prompt: &str) -> Result<String, CodeprismError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        let json = post_json(&self.client, &url, &body, CodeprismError::Generation)?;
        json.get("response")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| CodeprismError::Generation("Missing 'response' field in response".into()))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EmbeddingProvider, GenerationProvider};

    #[test]
    fn ollama_provider_construction() {
        let provider = OllamaProvider::with_defaults();
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
        assert_eq!(provider.model, DEFAULT_MODEL);
        assert_eq!(provider.dimensions(), 768);
        assert_eq!(provider.name(), "ollama");

        let custom = OllamaProvider::new("http://myhost:11434/", "mxbai-embed-large", 1024);
        assert_eq!(custom.base_url, "http://myhost:11434");
        assert_eq!(custom.dimensions(), 1024);
    }

    #[test]
    fn ollama_embed_success_mock() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"embedding": [0.1, 0.2, 0.3]}"#)
            .create();

        let provider = OllamaProvider::new(&server.url(), "nomic-embed-text", 3);
        let result = provider.embed("test");
        mock.assert();

        let embedding = result.unwrap();
        assert_eq!(embedding.len(), 3);
        assert!((embedding[0] - 0.1).abs() < 1e-6);
        assert!((embedding[2] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn ollama_embed_dimension_mismatch_is_an_error() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"embedding": [0.1, 0.2]}"#)
            .create();

        let provider = OllamaProvider::new(&server.url(), "nomic-embed-text", 768);
        let result = provider.embed("test");
        mock.assert();
        assert!(matches!(result, Err(CodeprismError::Embedding(_))));
    }

    #[test]
    fn ollama_embed_server_error_mock() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/embeddings")
            .with_status(500)
            .with_body("Internal Server Error")
            .create();

        let provider = OllamaProvider::new(&server.url(), "nomic-embed-text", 768);
        let result = provider.embed("test");
        mock.assert();

        assert!(result.is_err());
    }

    #[test]
    fn ollama_generate_mock() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({"stream": false})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"response": "  The PatientsController renders records.\n", "done": true}"#)
            .create();

        let generator = OllamaGenerator::new(&server.url(), DEFAULT_GENERATION_MODEL);
        let text = generator.generate("explain").unwrap();
        mock.assert();
        assert_eq!(text, "The PatientsController renders records.");
    }

    #[test]
    fn ollama_generate_missing_field() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"done": true}"#)
            .create();

        let generator = OllamaGenerator::new(&server.url(), DEFAULT_GENERATION_MODEL);
        assert!(matches!(generator.generate("x"), Err(CodeprismError::Generation(_))));
    }
}
