//! Reasoning client abstraction
//!
//! All LLM interaction goes through the [`ReasoningClient`] trait:
//! `think` for plain reasoning, `search` for grounded calls that must pull
//! in live web data. The production implementation is [`GeminiClient`];
//! tests and the demo binary use [`MockReasoningClient`].

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::OrchestrationError;
use crate::Result;

pub mod gemini;
pub use gemini::GeminiClient;

/// Reasoning tier for a call: heavy models for analysis and synthesis,
/// fast models for screening, parsing, and intent classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Heavy,
    Fast,
}

/// A web source cited by a grounded call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
}

/// Response from the search-augmented path: generated text plus the web
/// sources that grounded it.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub text: String,
    pub sources: Vec<SourceRef>,
}

/// Uniform interface to the external reasoning service.
///
/// Both calls are potentially slow and potentially failing; callers bound
/// them with a timeout and treat any error as an ordinary branch failure.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Generate a response without web search.
    async fn think(
        &self,
        prompt: &str,
        system: Option<&str>,
        tier: ModelTier,
        temperature: f32,
    ) -> Result<String>;

    /// Generate a response with web-search grounding.
    async fn search(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
    ) -> Result<SearchResponse>;
}

// =============================
// Mock client for tests / demo
// =============================

enum MockResponse {
    Text(String),
    Search {
        text: String,
        sources: Vec<SourceRef>,
    },
    Fail(String),
}

struct MockRule {
    needle: String,
    response: MockResponse,
}

/// Scripted reasoning client. Rules are matched, in registration order,
/// against the concatenation of system prompt and user prompt; the first
/// match wins. Unmatched calls return an empty JSON object.
///
/// Keeps the full pipeline stack functional without an LLM dependency.
pub struct MockReasoningClient {
    rules: Vec<MockRule>,
    calls: Mutex<Vec<String>>,
}

impl MockReasoningClient {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Respond with `text` whenever `needle` appears in the call.
    pub fn respond(mut self, needle: &str, text: &str) -> Self {
        self.rules.push(MockRule {
            needle: needle.to_string(),
            response: MockResponse::Text(text.to_string()),
        });
        self
    }

    /// Respond with `text` and the given sources on the search path.
    pub fn respond_with_sources(mut self, needle: &str, text: &str, sources: Vec<SourceRef>) -> Self {
        self.rules.push(MockRule {
            needle: needle.to_string(),
            response: MockResponse::Search {
                text: text.to_string(),
                sources,
            },
        });
        self
    }

    /// Fail the call whenever `needle` appears.
    pub fn fail(mut self, needle: &str, message: &str) -> Self {
        self.rules.push(MockRule {
            needle: needle.to_string(),
            response: MockResponse::Fail(message.to_string()),
        });
        self
    }

    /// Needles matched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("mock call log poisoned").clone()
    }

    fn respond_to(&self, prompt: &str, system: Option<&str>) -> Result<SearchResponse> {
        let haystack = format!("{}\n{}", system.unwrap_or(""), prompt);

        for rule in &self.rules {
            if haystack.contains(&rule.needle) {
                self.calls
                    .lock()
                    .expect("mock call log poisoned")
                    .push(rule.needle.clone());

                return match &rule.response {
                    MockResponse::Text(text) => Ok(SearchResponse {
                        text: text.clone(),
                        sources: Vec::new(),
                    }),
                    MockResponse::Search { text, sources } => Ok(SearchResponse {
                        text: text.clone(),
                        sources: sources.clone(),
                    }),
                    MockResponse::Fail(message) => {
                        Err(OrchestrationError::LlmError(message.clone()))
                    }
                };
            }
        }

        self.calls
            .lock()
            .expect("mock call log poisoned")
            .push("<default>".to_string());

        Ok(SearchResponse {
            text: "{}".to_string(),
            sources: Vec::new(),
        })
    }
}

impl Default for MockReasoningClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReasoningClient for MockReasoningClient {
    async fn think(
        &self,
        prompt: &str,
        system: Option<&str>,
        _tier: ModelTier,
        _temperature: f32,
    ) -> Result<String> {
        self.respond_to(prompt, system).map(|r| r.text)
    }

    async fn search(
        &self,
        prompt: &str,
        system: Option<&str>,
        _temperature: f32,
    ) -> Result<SearchResponse> {
        self.respond_to(prompt, system)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_rule_matching() {
        let client = MockReasoningClient::new()
            .respond("Fundamentals", r#"{"score": 8}"#)
            .fail("Moat", "quota exceeded");

        let text = client
            .think("Analyze TSLA", Some("You are the Fundamentals Analyst"), ModelTier::Heavy, 0.5)
            .await
            .unwrap();
        assert_eq!(text, r#"{"score": 8}"#);

        let err = client
            .think("Analyze TSLA", Some("You are the Moat Analyst"), ModelTier::Heavy, 0.6)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));

        assert_eq!(client.calls(), vec!["Fundamentals", "Moat"]);
    }

    #[tokio::test]
    async fn test_mock_default_response() {
        let client = MockReasoningClient::new();
        let response = client.search("anything", None, 0.7).await.unwrap();
        assert_eq!(response.text, "{}");
        assert!(response.sources.is_empty());
    }
}
