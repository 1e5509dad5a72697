//! Agent invocation
//!
//! [`AgentInvoker`] is the single path every agent call takes: build the
//! prompt from task + context, dispatch on the agent's capability flag to
//! the plain or search-augmented reasoning path, bound the call with the
//! configured timeout, and run the response through JSON recovery.
//!
//! Parsing failure degrades the payload; it is never an error. Transport
//! failures and timeouts are errors, and retry policy belongs to callers.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::time::timeout;
use tracing::debug;

use crate::agents::json::AgentPayload;
use crate::agents::AgentSpec;
use crate::error::OrchestrationError;
use crate::llm::{ReasoningClient, SourceRef};
use crate::Result;

/// Output of one agent invocation: the recovered payload plus any web
/// sources the grounded path consulted.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResult {
    pub agent: String,
    pub payload: AgentPayload,
    pub sources: Vec<SourceRef>,
}

impl AgentResult {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn is_degraded(&self) -> bool {
        self.payload.is_degraded()
    }
}

/// Uniform `invoke(spec, task, context)` contract over the reasoning client.
#[derive(Clone)]
pub struct AgentInvoker {
    client: Arc<dyn ReasoningClient>,
    call_timeout: Duration,
}

impl AgentInvoker {
    pub fn new(client: Arc<dyn ReasoningClient>, call_timeout: Duration) -> Self {
        Self {
            client,
            call_timeout,
        }
    }

    /// Execute one agent call. No retries at this layer.
    pub async fn invoke(
        &self,
        spec: &AgentSpec,
        task: &str,
        context: &Map<String, Value>,
    ) -> Result<AgentResult> {
        let prompt = build_prompt(task, context);

        debug!(agent = spec.name, search = spec.needs_external_data, "Invoking agent");

        let (text, sources) = if spec.needs_external_data {
            let response = self
                .bounded(self.client.search(&prompt, Some(spec.system_prompt), spec.temperature))
                .await?;
            (response.text, response.sources)
        } else {
            let text = self
                .bounded(self.client.think(
                    &prompt,
                    Some(spec.system_prompt),
                    spec.tier,
                    spec.temperature,
                ))
                .await?;
            (text, Vec::new())
        };

        Ok(AgentResult {
            agent: spec.name.to_string(),
            payload: AgentPayload::recover(&text),
            sources,
        })
    }

    async fn bounded<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        match timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(OrchestrationError::Timeout(self.call_timeout.as_secs())),
        }
    }
}

fn build_prompt(task: &str, context: &Map<String, Value>) -> String {
    if context.is_empty() {
        return task.to_string();
    }

    let context_json = serde_json::to_string_pretty(context)
        .unwrap_or_else(|_| Value::Object(context.clone()).to_string());

    format!("{task}\n\nContext:\n{context_json}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentRegistry;
    use crate::llm::{MockReasoningClient, ModelTier, SearchResponse};
    use async_trait::async_trait;
    use serde_json::json;

    fn invoker(client: MockReasoningClient) -> AgentInvoker {
        AgentInvoker::new(Arc::new(client), Duration::from_secs(30))
    }

    fn context(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("context must be an object"),
        }
    }

    #[tokio::test]
    async fn test_invoke_think_path() {
        let registry = AgentRegistry::new();
        let client = MockReasoningClient::new()
            .respond("Thesis Writer", r#"{"recommendation": "buy", "conviction": 0.7}"#);

        let result = invoker(client)
            .invoke(
                &registry.research.thesis_writer,
                "Create a complete investment thesis for NVDA.",
                &context(json!({"ticker": "NVDA"})),
            )
            .await
            .unwrap();

        assert_eq!(result.payload.str_field("recommendation"), Some("buy"));
        assert!(result.sources.is_empty());
    }

    #[tokio::test]
    async fn test_invoke_search_path_merges_sources() {
        let registry = AgentRegistry::new();
        let client = MockReasoningClient::new().respond_with_sources(
            "Fundamentals",
            r#"{"score": 8}"#,
            vec![SourceRef {
                title: "10-K".to_string(),
                url: "https://example.com/10k".to_string(),
            }],
        );

        let result = invoker(client)
            .invoke(
                &registry.research.fundamentals,
                "Analyze NVDA",
                &context(json!({"ticker": "NVDA"})),
            )
            .await
            .unwrap();

        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].title, "10-K");
    }

    #[tokio::test]
    async fn test_unparsable_response_degrades_not_errors() {
        let registry = AgentRegistry::new();
        let client = MockReasoningClient::new().respond("Screener", "I could not help with that.");

        let result = invoker(client)
            .invoke(&registry.research.screener, "Screen these stocks", &Map::new())
            .await
            .unwrap();

        assert!(result.is_degraded());
        assert_eq!(result.payload.to_value()["parse_error"], true);
    }

    struct HangingClient;

    #[async_trait]
    impl ReasoningClient for HangingClient {
        async fn think(
            &self,
            _prompt: &str,
            _system: Option<&str>,
            _tier: ModelTier,
            _temperature: f32,
        ) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(String::new())
        }

        async fn search(
            &self,
            _prompt: &str,
            _system: Option<&str>,
            _temperature: f32,
        ) -> Result<SearchResponse> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(SearchResponse {
                text: String::new(),
                sources: Vec::new(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_an_ordinary_error() {
        let registry = AgentRegistry::new();
        let invoker = AgentInvoker::new(Arc::new(HangingClient), Duration::from_secs(5));

        let err = invoker
            .invoke(&registry.research.screener, "Screen these stocks", &Map::new())
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestrationError::Timeout(5)));
    }
}
