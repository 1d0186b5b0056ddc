//! OpenAI-compatible HTTP embedding provider.
//!
//! - Endpoint: `POST {base_url}/embeddings` (default `https://api.openai.com/v1`)
//! - Auth: `Authorization: Bearer {api_key}`
//! - Body: `{ model, input, dimensions }`
//! - Response: `{ data: [{ embedding, index }] }`

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::{Result, VigilError};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// Embedding provider for OpenAI and OpenAI-compatible APIs (Azure, vLLM, LiteLLM).
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    dimensions: usize,
    max_input_chars: usize,
}

impl OpenAiEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                VigilError::config("OpenAI embedding provider requires an API key (OPENAI_API_KEY)")
            })?;

        // The local model name is meaningless to the API; fall back to the default.
        let model = if config.model.trim().is_empty() || config.model == "all-MiniLM-L6-v2" {
            DEFAULT_MODEL.to_string()
        } else {
            config.model.clone()
        };

        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VigilError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model,
            endpoint,
            dimensions: config.dimensions,
            max_input_chars: config.max_input_chars,
        })
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "input": text,
            "dimensions": self.dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(text))
            .send()
            .await
            .map_err(|e| VigilError::embedding(format!("request to {} failed: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .and_then(|d| d.message)
                .unwrap_or(body);
            return Err(VigilError::embedding(format!(
                "embedding API returned HTTP {}: {message}",
                status.as_u16()
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| VigilError::embedding(format!("failed to parse embedding response: {e}")))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| VigilError::embedding("embedding response contained no data"))?;

        if embedding.len() != self.dimensions {
            return Err(VigilError::embedding(format!(
                "embedding has {} dimensions, expected {}",
                embedding.len(),
                self.dimensions
            )));
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    fn name(&self) -> &str {
        "openai"
    }
}
