use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::GenericImageView;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::io::Cursor;
use std::time::Duration;

use super::DetectedLabel;
use crate::config::{LabelConfig, ProviderType};

/// Detects labels in an image.
pub trait LabelDetector: Send + Sync {
    fn detect_labels(&self, image: &[u8]) -> Result<Vec<DetectedLabel>>;

    /// Get the provider name for display
    fn provider_name(&self) -> &'static str;
}

#[derive(Debug, Deserialize)]
struct LabelResponse {
    labels: Vec<DetectedLabel>,
}

fn label_prompt(max_labels: usize) -> String {
    format!(
        r#"List the objects, scenes and concepts visible in this image.

Return at most {max_labels} labels. Each label is a short noun phrase in title case
(for example "Dog", "Beach", "Sunset"). Give each label a confidence from 0 to 100.

Return the results as JSON in this exact format:
{{"labels": [{{"name": "<label>", "confidence": <number 0-100>}}]}}

Return ONLY the JSON, no other text."#
    )
}

/// Parse the model's reply into labels. Accepts an optional markdown fence.
fn parse_labels(content: &str) -> Result<Vec<DetectedLabel>> {
    let json_str = extract_json(content);
    let parsed: LabelResponse = serde_json::from_str(&json_str)
        .map_err(|e| anyhow!("Failed to parse label JSON: {} - Response was: {}", e, content))?;
    Ok(parsed.labels)
}

/// Parse a reply and keep the `max_labels` most confident labels.
fn strongest_labels(content: &str, max_labels: usize) -> Result<Vec<DetectedLabel>> {
    let mut labels = parse_labels(content)?;
    labels.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
    labels.truncate(max_labels);
    Ok(labels)
}

// ============================================================================
// OpenAI-compatible vision chat (LM Studio, OpenAI and compatible APIs)
// ============================================================================

pub struct OpenAICompatibleDetector {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_labels: usize,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl OpenAICompatibleDetector {
    pub fn new(endpoint: &str, model: &str, api_key: Option<&str>, max_labels: usize) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.map(|s| s.to_string()),
            max_labels,
        }
    }
}

impl LabelDetector for OpenAICompatibleDetector {
    fn detect_labels(&self, image: &[u8]) -> Result<Vec<DetectedLabel>> {
        let (base64_image, mime_type) = encode_image(image, 1024)?;
        let data_url = format!("data:{};base64,{}", mime_type, base64_image);

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: label_prompt(self.max_labels),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            max_tokens: 500,
            temperature: 0.2,
        };

        let url = format!("{}/chat/completions", self.endpoint);

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(120))
            .build();

        let mut req = agent.post(&url).set("Content-Type", "application/json");

        if let Some(ref api_key) = self.api_key {
            req = req.set("Authorization", &format!("Bearer {}", api_key));
        }

        let response = req
            .send_json(&request)
            .map_err(|e| anyhow!("Label detection request failed: {}", e))?;

        let chat_response: ChatResponse = response
            .into_json()
            .map_err(|e| anyhow!("Failed to parse label detection response: {}", e))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("No response from label detector"))?;

        strongest_labels(&content, self.max_labels)
    }

    fn provider_name(&self) -> &'static str {
        "OpenAI-compatible"
    }
}

// ============================================================================
// Ollama provider
// ============================================================================

pub struct OllamaDetector {
    endpoint: String,
    model: String,
    max_labels: usize,
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    images: Vec<String>,
    stream: bool,
    format: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaDetector {
    pub fn new(endpoint: Option<&str>, model: &str, max_labels: usize) -> Self {
        Self {
            endpoint: endpoint
                .unwrap_or("http://localhost:11434")
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            max_labels,
        }
    }
}

impl LabelDetector for OllamaDetector {
    fn detect_labels(&self, image: &[u8]) -> Result<Vec<DetectedLabel>> {
        let (base64_image, _) = encode_image(image, 1024)?;

        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: label_prompt(self.max_labels),
            images: vec![base64_image],
            stream: false,
            format: "json".to_string(),
        };

        let url = format!("{}/api/generate", self.endpoint);

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(120))
            .build();

        let response = agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_json(&request)
            .map_err(|e| anyhow!("Ollama label request failed: {}", e))?;

        let ollama_response: OllamaResponse = response
            .into_json()
            .map_err(|e| anyhow!("Failed to parse Ollama response: {}", e))?;

        strongest_labels(&ollama_response.response, self.max_labels)
    }

    fn provider_name(&self) -> &'static str {
        "Ollama"
    }
}

/// Decode image bytes, shrink to fit `max_dimension`, re-encode as JPEG and
/// base64 the result.
fn encode_image(bytes: &[u8], max_dimension: u32) -> Result<(String, &'static str)> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| anyhow!("Failed to decode image: {}", e))?;

    let (width, height) = img.dimensions();
    let img = if width > max_dimension || height > max_dimension {
        img.resize(
            max_dimension,
            max_dimension,
            image::imageops::FilterType::Triangle,
        )
    } else {
        img
    };

    // JPEG has no alpha channel.
    let img = image::DynamicImage::ImageRgb8(img.to_rgb8());

    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, 85);
    img.write_with_encoder(encoder)
        .map_err(|e| anyhow!("Failed to encode image as JPEG: {}", e))?;

    Ok((BASE64.encode(buf.into_inner()), "image/jpeg"))
}

/// Strip a surrounding markdown code fence, if any.
fn extract_json(content: &str) -> String {
    let trimmed = content.trim();

    if trimmed.starts_with("```") {
        if let Some(start) = trimmed.find('\n') {
            let body = &trimmed[start + 1..];
            if let Some(end) = body.rfind("```") {
                return body[..end].trim().to_string();
            }
        }
    }

    trimmed.to_string()
}

// ============================================================================
// Factory function
// ============================================================================

/// Create a label detector from configuration. `None` when detection is disabled.
pub fn create_detector(config: &LabelConfig) -> Option<Box<dyn LabelDetector>> {
    match config.provider {
        ProviderType::LmStudio => Some(Box::new(OpenAICompatibleDetector::new(
            &config.endpoint,
            &config.model,
            config.api_key.as_deref(),
            config.max_labels,
        ))),
        ProviderType::OpenAI => Some(Box::new(OpenAICompatibleDetector::new(
            "https://api.openai.com/v1",
            &config.model,
            config.api_key.as_deref(),
            config.max_labels,
        ))),
        ProviderType::Ollama => Some(Box::new(OllamaDetector::new(
            Some(&config.endpoint),
            &config.model,
            config.max_labels,
        ))),
        ProviderType::None => None,
    }
}
