use std::sync::Arc;

use fund_agent_orchestrator::{
    agents::{AgentInvoker, AgentRegistry},
    config::Settings,
    conversation::ConversationEngine,
    llm::{GeminiClient, MockReasoningClient, ReasoningClient},
    store::InMemoryStore,
};
use tracing::info;

/// Demo run: create a fund conversationally, then walk it through
/// scouting, analysis, and portfolio construction. Uses the real Gemini
/// client when an API key is configured, otherwise a scripted mock.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Fund agent orchestrator starting");

    let settings = Settings::from_env();
    let client: Arc<dyn ReasoningClient> = match &settings {
        Ok(settings) => {
            info!("Using Gemini reasoning client");
            Arc::new(GeminiClient::new(settings))
        }
        Err(_) => {
            info!("No API key configured; using scripted mock client");
            Arc::new(demo_client())
        }
    };
    let timeout = settings
        .map(|s| s.agent_timeout())
        .unwrap_or_else(|_| Settings::for_tests().agent_timeout());

    let registry = Arc::new(AgentRegistry::new());
    let invoker = AgentInvoker::new(client, timeout);
    let store = Arc::new(InMemoryStore::new());
    let engine = ConversationEngine::new(registry, invoker, store);

    let outcome = engine
        .chat(None, None, "Build me a fund around AI infrastructure and fintech")
        .await?;
    info!(intent = ?outcome.intent, "Chat: {}", outcome.message);

    let conversation_id = outcome.conversation_id;
    for action in outcome.actions {
        let result = engine.execute(conversation_id, &action).await?;
        info!(action = %action, "Action result: {}", serde_json::to_string_pretty(&result)?);
    }

    Ok(())
}

fn demo_client() -> MockReasoningClient {
    MockReasoningClient::new()
        .respond(
            "intent parser",
            r#"{
                "intent": "create_fund",
                "fund_params": {"themes": ["AI infrastructure", "fintech"], "mandate": "US growth"},
                "suggested_response": "Creating your fund now."
            }"#,
        )
        .respond(
            "Emerging Leaders Scout",
            r#"{"stocks": [{"ticker": "NVDA", "company": "NVIDIA"}, {"ticker": "SQ", "company": "Block"}], "summary": "Two leaders"}"#,
        )
        .respond(
            "Smart Money Scout",
            r#"{"stocks": [{"ticker": "NVDA"}, {"ticker": "MSFT", "company": "Microsoft"}], "summary": "Institutional favorites"}"#,
        )
        .respond(
            "Disruption Scout",
            r#"{"stocks": [{"ticker": "COIN", "company": "Coinbase"}], "summary": "One challenger"}"#,
        )
        .respond(
            "Thematic Scout",
            r#"{"stocks": [{"ticker": "AVGO", "company": "Broadcom"}], "summary": "Theme enabler"}"#,
        )
        .respond(
            "Stock Screener",
            r#"{
                "screened_stocks": {
                    "hot": [{"ticker": "NVDA"}, {"ticker": "MSFT"}],
                    "warm": [{"ticker": "AVGO"}, {"ticker": "SQ"}],
                    "cold": [{"ticker": "COIN"}]
                },
                "summary": "Two clear leaders, two watches, one pass"
            }"#,
        )
        .respond("Fundamentals", r#"{"score": 8, "summary": "Strong growth, fortress balance sheet"}"#)
        .respond("Moat Analyst", r#"{"score": 8, "summary": "Ecosystem lock-in"}"#)
        .respond("Sentiment", r#"{"score": 6, "summary": "Crowded but supported"}"#)
        .respond("Valuation", r#"{"score": 5, "summary": "Priced for excellence"}"#)
        .respond(
            "Thesis Writer",
            r#"{
                "recommendation": "buy",
                "conviction": 0.75,
                "target_weight": 0.07,
                "thesis_summary": "Category leader compounding through the AI buildout.",
                "score_breakdown": {"fundamentals": 8, "moat": 8, "sentiment": 6, "valuation": 5, "overall": 7}
            }"#,
        )
        .respond(
            "Portfolio Manager",
            r#"{
                "positions": [
                    {"ticker": "NVDA", "company": "NVIDIA", "weight": 0.08},
                    {"ticker": "MSFT", "company": "Microsoft", "weight": 0.07}
                ],
                "summary": "Concentrated in the two highest-conviction names"
            }"#,
        )
}
