//! Gemini implementation of the reasoning client
//!
//! Uses a long-lived reqwest::Client for connection pooling. The search
//! path enables the Google Search grounding tool and harvests grounding
//! chunks into source references.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::Settings;
use crate::error::OrchestrationError;
use crate::llm::{ModelTier, ReasoningClient, SearchResponse, SourceRef};
use crate::Result;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    heavy_model: String,
    fast_model: String,
    max_output_tokens: u32,
}

impl GeminiClient {
    pub fn new(settings: &Settings) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key: settings.google_api_key.clone(),
            heavy_model: settings.heavy_model.clone(),
            fast_model: settings.fast_model.clone(),
            max_output_tokens: settings.max_output_tokens,
        }
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Heavy => &self.heavy_model,
            ModelTier::Fast => &self.fast_model,
        }
    }

    async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<GenerateResponse> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::ConfigError(
                "GOOGLE_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}/{}:generateContent?key={}", BASE_URL, model, self.api_key);

        debug!(model, "Calling Gemini API");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                OrchestrationError::LlmError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(OrchestrationError::LlmError(format!(
                "Gemini API error: {}",
                error_text
            )));
        }

        response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            OrchestrationError::LlmError(format!("Gemini parse error: {}", e))
        })
    }

    fn build_request(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
        with_search: bool,
    ) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature,
                max_output_tokens: self.max_output_tokens,
            },
            system_instruction: system.map(|s| SystemInstruction {
                parts: vec![Part {
                    text: s.to_string(),
                }],
            }),
            tools: with_search.then(|| vec![Tool {
                google_search: GoogleSearch {},
            }]),
        }
    }
}

fn first_text(response: &GenerateResponse) -> Result<String> {
    response
        .candidates
        .first()
        .and_then(|c| c.content.parts.first())
        .map(|p| p.text.clone())
        .ok_or_else(|| OrchestrationError::LlmError("Empty response from Gemini".to_string()))
}

fn grounding_sources(response: &GenerateResponse) -> Vec<SourceRef> {
    let Some(candidate) = response.candidates.first() else {
        return Vec::new();
    };
    let Some(metadata) = &candidate.grounding_metadata else {
        return Vec::new();
    };

    metadata
        .grounding_chunks
        .iter()
        .filter_map(|chunk| chunk.web.as_ref())
        .map(|web| SourceRef {
            title: web
                .title
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            url: web.uri.clone().unwrap_or_default(),
        })
        .collect()
}

#[async_trait]
impl ReasoningClient for GeminiClient {
    async fn think(
        &self,
        prompt: &str,
        system: Option<&str>,
        tier: ModelTier,
        temperature: f32,
    ) -> Result<String> {
        let request = self.build_request(prompt, system, temperature, false);
        let response = self.generate(self.model_for(tier), &request).await?;
        first_text(&response)
    }

    async fn search(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
    ) -> Result<SearchResponse> {
        // Grounded calls always run on the fast model.
        let request = self.build_request(prompt, system, temperature, true);
        let response = self.generate(&self.fast_model, &request).await?;

        Ok(SearchResponse {
            text: first_text(&response)?,
            sources: grounding_sources(&response),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Content,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    title: Option<String>,
    uri: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let settings = Settings::for_tests();
        let client = GeminiClient::new(&settings);
        let request = client.build_request("Analyze TSLA", Some("You are an analyst"), 0.5, true);

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("Analyze TSLA"));
        assert!(json.contains("google_search"));
        assert!(json.contains("systemInstruction"));
    }

    #[test]
    fn test_grounding_sources_extraction() {
        let raw = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "{}"}]},
                "groundingMetadata": {
                    "groundingChunks": [
                        {"web": {"title": "Example", "uri": "https://example.com"}},
                        {"web": {"uri": "https://untitled.example.com"}},
                        {}
                    ]
                }
            }]
        }"#;

        let response: GenerateResponse = serde_json::from_str(raw).unwrap();
        let sources = grounding_sources(&response);

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].title, "Example");
        assert_eq!(sources[1].title, "Unknown");
    }
}
