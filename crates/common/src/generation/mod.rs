//! Text generation clients
//!
//! - Google Gemini `generateContent`
//! - OpenAI-compatible chat completions
//! - A recording mock for tests

use crate::config::GenerationConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Trait for answer generation from a prompt
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(AppError::GenerationError {
        message: format!("API error {}: {}", status, body),
    })
}

// ============================================================================
// Gemini
// ============================================================================

pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPartIn<'a>>,
}

#[derive(Serialize)]
struct GeminiPartIn<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentOut>,
}

#[derive(Deserialize)]
struct GeminiContentOut {
    #[serde(default)]
    parts: Vec<GeminiPartOut>,
}

#[derive(Deserialize)]
struct GeminiPartOut {
    #[serde(default)]
    text: String,
}

impl GeminiResponse {
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().map(|p| p.text).collect();
        (!text.is_empty()).then_some(text)
    }
}

impl GeminiGenerator {
    pub fn new(api_key: String, config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            model: config.model.clone(),
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPartIn { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                max_output_tokens: self.max_tokens,
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::GenerationError {
                message: format!("Gemini request failed: {}", e),
            })?;

        let parsed: GeminiResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::GenerationError {
                message: format!("Failed to parse Gemini response: {}", e),
            })?;

        parsed.text().ok_or_else(|| AppError::GenerationError {
            message: "Empty response from Gemini".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// OpenAI-compatible chat completions
// ============================================================================

pub struct OpenAIChatGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAIChatGenerator {
    pub fn new(api_key: String, config: &GenerationConfig) -> Result<Self> {
        let base = config
            .api_base
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl Generator for OpenAIChatGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::GenerationError {
                message: format!("LLM API request failed: {}", e),
            })?;

        let chat_response: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::GenerationError {
                message: format!("Failed to parse LLM response: {}", e),
            })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::GenerationError {
                message: "Empty response from LLM".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Mock
// ============================================================================

/// Returns a fixed answer and records every prompt it receives
#[derive(Default)]
pub struct MockGenerator {
    answer: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer(answer: impl Into<String>) -> Self {
        Self {
            answer: Some(answer.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, oldest first
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().await.push(prompt.to_string());
        Ok(self.answer.clone().unwrap_or_else(|| {
            "Based on the provided course material, here is what I found. \
             [Mock response - generation API key not configured]"
                .to_string()
        }))
    }

    fn model_name(&self) -> &str {
        "mock-generator"
    }
}

/// Create a generator based on configuration
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    let key = || {
        config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: format!(
                    "generation.api_key is required for provider '{}'",
                    config.provider
                ),
            })
    };

    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiGenerator::new(key()?, config)?)),
        "openai" => Ok(Arc::new(OpenAIChatGenerator::new(key()?, config)?)),
        "mock" => Ok(Arc::new(MockGenerator::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown generation provider '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_prompts() {
        let generator = MockGenerator::with_answer("42");
        assert_eq!(generator.generate("first").await.unwrap(), "42");
        generator.generate("second").await.unwrap();
        assert_eq!(generator.prompts().await, vec!["first", "second"]);
    }

    #[test]
    fn test_gemini_request_shape() {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPartIn { text: "hi" }],
            }],
            generation_config: GeminiGenerationConfig {
                max_output_tokens: 256,
                temperature: 0.5,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn test_gemini_response_joins_parts() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Hello, " }, { "text": "student." }] }
            }]
        });
        let parsed: GeminiResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.text().as_deref(), Some("Hello, student."));

        let empty: GeminiResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(empty.text().is_none());
    }

    #[test]
    fn test_create_generator_requires_key() {
        let config = GenerationConfig {
            provider: "gemini".to_string(),
            api_key: None,
            ..Default::default()
        };
        assert!(matches!(
            create_generator(&config),
            Err(AppError::Configuration { .. })
        ));
    }
}
