use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{EmbeddingConfig, ProviderType};

/// Turns text into a fixed-dimension vector.
///
/// Implementations must be deterministic for a given model: vocabulary
/// vectors are computed once and compared against prompt vectors later.
pub trait TextEmbedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Model identifier, used to key cached vocabulary vectors.
    fn model_name(&self) -> &str;

    /// Get the provider name for display
    fn provider_name(&self) -> &'static str;
}

// ============================================================================
// OpenAI-compatible provider (LM Studio, OpenAI and compatible APIs)
// ============================================================================

pub struct OpenAICompatibleEmbedder {
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAICompatibleEmbedder {
    pub fn new(endpoint: &str, model: &str, api_key: Option<&str>) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.map(|s| s.to_string()),
        }
    }
}

impl TextEmbedder for OpenAICompatibleEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
        };

        let url = format!("{}/embeddings", self.endpoint);

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(60))
            .build();

        let mut req = agent.post(&url).set("Content-Type", "application/json");

        if let Some(ref api_key) = self.api_key {
            req = req.set("Authorization", &format!("Bearer {}", api_key));
        }

        let response = req
            .send_json(&request)
            .map_err(|e| anyhow!("Embedding request failed: {}", e))?;

        let embedding_response: EmbeddingResponse = response
            .into_json()
            .map_err(|e| anyhow!("Failed to parse embedding response: {}", e))?;

        embedding_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow!("No embedding in response"))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &'static str {
        "OpenAI-compatible"
    }
}

// ============================================================================
// Ollama provider
// ============================================================================

pub struct OllamaEmbedder {
    endpoint: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(endpoint: Option<&str>, model: &str) -> Self {
        Self {
            endpoint: endpoint
                .unwrap_or("http://localhost:11434")
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
        }
    }
}

impl TextEmbedder for OllamaEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = OllamaEmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let url = format!("{}/api/embeddings", self.endpoint);

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(60))
            .build();

        let response = agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_json(&request)
            .map_err(|e| anyhow!("Ollama embedding request failed: {}", e))?;

        let embedding_response: OllamaEmbeddingResponse = response
            .into_json()
            .map_err(|e| anyhow!("Failed to parse Ollama embedding response: {}", e))?;

        if embedding_response.embedding.is_empty() {
            return Err(anyhow!("Ollama returned an empty embedding"));
        }
        Ok(embedding_response.embedding)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &'static str {
        "Ollama"
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create a text embedder from configuration. `None` when embeddings are disabled.
pub fn create_embedder(config: &EmbeddingConfig) -> Option<Box<dyn TextEmbedder>> {
    match config.provider {
        ProviderType::LmStudio => Some(Box::new(OpenAICompatibleEmbedder::new(
            &config.endpoint,
            &config.model,
            config.api_key.as_deref(),
        ))),
        ProviderType::OpenAI => Some(Box::new(OpenAICompatibleEmbedder::new(
            "https://api.openai.com/v1",
            &config.model,
            config.api_key.as_deref(),
        ))),
        ProviderType::Ollama => Some(Box::new(OllamaEmbedder::new(
            Some(&config.endpoint),
            &config.model,
        ))),
        ProviderType::None => None,
    }
}
