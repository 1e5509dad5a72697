//! Conversational engine
//!
//! Turns free-form user messages into fund-building workflow stages. Each
//! turn appends to the history, classifies intent with the interpreter
//! agent, transitions the phase state machine, and persists the
//! conversation before returning. Pipeline stages run in a separate,
//! explicitly triggered execute step so slow work never blocks a chat
//! turn.
//!
//! A turn never fails because a pipeline stage failed: stage errors are
//! reported in-band and the conversation stays resumable.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::{AgentInvoker, AgentRegistry, AgentResult};
use crate::error::OrchestrationError;
use crate::models::{Fund, FundStatus, Position, ThesisDigest};
use crate::pipelines::{AnalysisPipeline, DiscoveryPipeline};
use crate::store::Store;
use crate::Result;

pub mod state;
pub use state::{ChatRole, ChatTurn, Conversation, FundParams, Phase};

/// How many history turns the intent interpreter sees.
const HISTORY_WINDOW: usize = 10;
/// Hot tickers retained from a scouting run.
const MAX_DISCOVERED: usize = 10;
/// Tickers analyzed per analyzing action.
const MAX_ANALYZED: usize = 5;

const FALLBACK_CLARIFICATION: &str = "Could you tell me more about what you'd like to do? \
     I can help you create funds, analyze stocks, or manage your portfolio.";

/// Result of one chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub conversation_id: Uuid,
    pub message: String,
    pub intent: Option<String>,
    pub data: Option<Value>,
    pub actions: Vec<String>,
}

/// Result of one execute-action step.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionOutcome {
    Scouted {
        message: String,
        tickers: Vec<String>,
    },
    Analyzed {
        message: String,
        theses: Vec<ThesisDigest>,
    },
    PortfolioBuilt {
        message: String,
        fund_id: Option<Uuid>,
        positions: Vec<String>,
        portfolio: Value,
    },
    Failed {
        action: String,
        message: String,
    },
    UnknownAction {
        action: String,
    },
}

/// Intent as extracted by the interpreter agent.
#[derive(Debug, Clone, Default, Deserialize)]
struct ParsedIntent {
    #[serde(default)]
    intent: String,
    #[serde(default)]
    fund_params: Option<FundParams>,
    #[serde(default)]
    trade_params: Option<TradeParams>,
    #[serde(default)]
    clarification_needed: Option<String>,
    #[serde(default)]
    suggested_response: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct TradeParams {
    #[serde(default)]
    ticker: Option<String>,
    #[serde(default)]
    action: Option<String>,
}

impl ParsedIntent {
    fn from_result(result: &AgentResult) -> Self {
        let mut parsed: Self = serde_json::from_value(result.payload.to_value())
            .unwrap_or_default();
        parsed.intent = parsed.intent.trim().to_lowercase();
        if parsed.intent.is_empty() {
            parsed.intent = "unclear".to_string();
        }
        parsed
    }

    fn unclear() -> Self {
        Self {
            intent: "unclear".to_string(),
            ..Self::default()
        }
    }
}

pub struct ConversationEngine {
    registry: Arc<AgentRegistry>,
    invoker: AgentInvoker,
    store: Arc<dyn Store>,
    discovery: DiscoveryPipeline,
    analysis: AnalysisPipeline,
}

impl ConversationEngine {
    pub fn new(registry: Arc<AgentRegistry>, invoker: AgentInvoker, store: Arc<dyn Store>) -> Self {
        let discovery = DiscoveryPipeline::new(registry.clone(), invoker.clone());
        // Analysis from chat runs strictly sequentially: discovered tickers
        // arrive in bulk and the external call rate stays bounded.
        let analysis = AnalysisPipeline::new(registry.clone(), invoker.clone(), 1);
        Self {
            registry,
            invoker,
            store,
            discovery,
            analysis,
        }
    }

    /// Handle a chat message, loading or creating the conversation.
    pub async fn chat(
        &self,
        conversation_id: Option<Uuid>,
        fund_id: Option<Uuid>,
        message: &str,
    ) -> Result<ChatOutcome> {
        let mut conversation = match conversation_id {
            Some(id) => self
                .store
                .load_conversation(id)
                .await?
                .unwrap_or_else(|| Conversation::new(fund_id)),
            None => Conversation::new(fund_id),
        };

        self.handle_message(&mut conversation, message).await
    }

    /// Run one turn against a caller-owned conversation.
    pub async fn handle_message(
        &self,
        conversation: &mut Conversation,
        message: &str,
    ) -> Result<ChatOutcome> {
        conversation.add_message(ChatRole::User, message);

        let intent = self.classify_intent(conversation, message).await;
        info!(intent = %intent.intent, conversation = %conversation.id, "Chat turn classified");

        let mut data = None;
        let mut actions = Vec::new();

        let response_text = match intent.intent.as_str() {
            "create_fund" => {
                let params = intent.fund_params.clone().unwrap_or_default();
                let (fund, text) = self.create_fund(&params).await?;

                conversation.fund_id = Some(fund.id);
                conversation.phase = Phase::Scouting { params };

                data = Some(json!({ "fund_id": fund.id, "fund_name": fund.name }));
                actions = vec![
                    "scouting".to_string(),
                    "analyzing".to_string(),
                    "building_portfolio".to_string(),
                ];
                text
            }
            "query_performance" => {
                actions = vec!["fetch_performance".to_string()];
                "Let me check the fund's performance for you.".to_string()
            }
            "query_risk" => {
                actions = vec!["run_risk_analysis".to_string()];
                "I'll run a risk analysis on your portfolio.".to_string()
            }
            "command_trade" => {
                let trade = intent.trade_params.clone().unwrap_or_default();
                let ticker = trade.ticker.clone().unwrap_or_default();
                let action = trade.action.clone().unwrap_or_default();

                data = Some(json!({ "trade": trade }));
                actions = vec!["confirm_trade".to_string()];
                format!(
                    "You want to {action} {ticker}. Let me confirm: Should I proceed with this trade?"
                )
            }
            "unclear" => intent
                .clarification_needed
                .clone()
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| FALLBACK_CLARIFICATION.to_string()),
            _ => intent
                .suggested_response
                .clone()
                .unwrap_or_else(|| "I'm processing your request...".to_string()),
        };

        conversation.add_message(ChatRole::Assistant, response_text.clone());
        self.store.save_conversation(conversation).await?;

        Ok(ChatOutcome {
            conversation_id: conversation.id,
            message: response_text,
            intent: Some(intent.intent),
            data,
            actions,
        })
    }

    /// Execute a previously proposed action against a conversation.
    pub async fn execute(&self, conversation_id: Uuid, action: &str) -> Result<ActionOutcome> {
        let mut conversation = self
            .store
            .load_conversation(conversation_id)
            .await?
            .ok_or_else(|| {
                OrchestrationError::NotFound(format!("Conversation {conversation_id}"))
            })?;

        let outcome = match action {
            "scouting" => self.run_scouting(&mut conversation).await,
            "analyzing" => self.run_analyzing(&mut conversation).await,
            "building_portfolio" => self.run_building_portfolio(&mut conversation).await,
            other => {
                return Ok(ActionOutcome::UnknownAction {
                    action: other.to_string(),
                })
            }
        };

        match outcome {
            Ok(outcome) => {
                self.store.save_conversation(&conversation).await?;
                Ok(outcome)
            }
            // A failed stage leaves the phase untouched so the action can
            // be retried; the failure is reported in-band.
            Err(e) => {
                warn!(action, error = %e, "Action failed");
                Ok(ActionOutcome::Failed {
                    action: action.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    async fn classify_intent(&self, conversation: &Conversation, message: &str) -> ParsedIntent {
        let current_fund = match conversation.fund_id {
            Some(id) => match self.store.get_fund(id).await {
                Ok(Some(fund)) => json!({ "name": fund.name, "status": fund.status }),
                _ => Value::Null,
            },
            None => Value::Null,
        };

        let mut context = Map::new();
        context.insert("message".to_string(), json!(message));
        context.insert(
            "history".to_string(),
            Value::Array(conversation.recent_history(HISTORY_WINDOW)),
        );
        context.insert("current_fund".to_string(), current_fund);

        match self
            .invoker
            .invoke(
                &self.registry.conversation.intent_interpreter,
                "Parse this user message",
                &context,
            )
            .await
        {
            Ok(result) => ParsedIntent::from_result(&result),
            Err(e) => {
                warn!(error = %e, "Intent classification failed, treating turn as unclear");
                ParsedIntent::unclear()
            }
        }
    }

    async fn create_fund(&self, params: &FundParams) -> Result<(Fund, String)> {
        let name = derive_fund_name(params);
        let slug = slugify(&name);

        let fund = Fund::new(
            name.clone(),
            slug,
            Some(params.category.clone().unwrap_or_else(|| "growth".to_string())),
            params.mandate.clone(),
        );
        self.store.save_fund(&fund).await?;

        info!(fund = %fund.name, id = %fund.id, "Fund registered");

        let mut text = format!("Creating **{name}**! ");
        if !params.themes.is_empty() {
            text.push_str(&format!("Focused on {}. ", params.themes.join(", ")));
        }
        if !params.specific_stocks.is_empty() {
            text.push_str(&format!("Including {}. ", params.specific_stocks.join(", ")));
        }
        text.push_str("Now scouting for opportunities...");

        Ok((fund, text))
    }

    async fn run_scouting(&self, conversation: &mut Conversation) -> Result<ActionOutcome> {
        let params = conversation.phase.params().cloned().unwrap_or_default();
        let themes = if params.themes.is_empty() {
            vec!["growth".to_string()]
        } else {
            params.themes.clone()
        };

        let discovery = self
            .discovery
            .discover(&themes, params.mandate.as_deref(), &params.exclude, false)
            .await?;

        let tickers: Vec<String> = discovery
            .universe
            .hot
            .iter()
            .take(MAX_DISCOVERED)
            .map(|s| s.ticker.clone())
            .collect();

        let message = format!("Found {} promising stocks to analyze.", tickers.len());
        conversation.phase = Phase::Discovered {
            params,
            tickers: tickers.clone(),
        };

        Ok(ActionOutcome::Scouted { message, tickers })
    }

    async fn run_analyzing(&self, conversation: &mut Conversation) -> Result<ActionOutcome> {
        let (params, tickers) = match &conversation.phase {
            Phase::Discovered { params, tickers } => (params.clone(), tickers.clone()),
            _ => (conversation.phase.params().cloned().unwrap_or_default(), Vec::new()),
        };

        // Sequential on purpose: bounded external call rate. Individual
        // failures are swallowed so one bad ticker can't sink the batch.
        let mut theses = Vec::new();
        for ticker in tickers.iter().take(MAX_ANALYZED) {
            match self.analysis.analyze(ticker).await {
                Ok(report) => {
                    if let Err(e) = self
                        .store
                        .save_thesis(&crate::models::ThesisRecord::from_report(
                            &report,
                            conversation.fund_id,
                        ))
                        .await
                    {
                        warn!(ticker = %ticker, error = %e, "Failed to persist thesis");
                    }
                    theses.push(ThesisDigest::from(&report));
                }
                Err(e) => {
                    warn!(ticker = %ticker, error = %e, "Analysis failed for ticker");
                }
            }
        }

        let message = format!("Analyzed {} stocks.", theses.len());
        conversation.phase = Phase::Analyzed {
            params,
            theses: theses.clone(),
        };

        Ok(ActionOutcome::Analyzed { message, theses })
    }

    async fn run_building_portfolio(
        &self,
        conversation: &mut Conversation,
    ) -> Result<ActionOutcome> {
        let (params, theses) = match &conversation.phase {
            Phase::Analyzed { params, theses } => (params.clone(), theses.clone()),
            _ => (conversation.phase.params().cloned().unwrap_or_default(), Vec::new()),
        };

        let mut context = Map::new();
        context.insert("theses".to_string(), serde_json::to_value(&theses)?);
        context.insert("mandate".to_string(), json!(params.mandate));
        context.insert(
            "constraints".to_string(),
            params.constraints.clone().unwrap_or(Value::Null),
        );

        let portfolio = self
            .invoker
            .invoke(
                &self.registry.portfolio.portfolio_manager,
                "Build optimal portfolio",
                &context,
            )
            .await?;

        // The PM agent reports either "positions" or "allocations".
        let allocations = portfolio
            .get("positions")
            .or_else(|| portfolio.get("allocations"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut created = Vec::new();
        if let Some(fund_id) = conversation.fund_id {
            for allocation in &allocations {
                let Some(ticker) = allocation.get("ticker").and_then(Value::as_str) else {
                    continue;
                };
                let company = allocation
                    .get("company")
                    .or_else(|| allocation.get("company_name"))
                    .and_then(Value::as_str)
                    .map(String::from);
                let weight = allocation
                    .get("weight")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.05);

                let position = Position::proposed(fund_id, ticker.to_string(), company, weight);
                self.store.save_position(&position).await?;
                created.push(ticker.to_string());
            }

            self.store
                .update_fund_status(fund_id, FundStatus::Active)
                .await?;
        }

        let message = format!(
            "Portfolio built with {} positions! Your fund is now active.",
            created.len()
        );
        conversation.phase = Phase::Complete {
            positions: created.clone(),
        };

        Ok(ActionOutcome::PortfolioBuilt {
            message,
            fund_id: conversation.fund_id,
            positions: created,
            portfolio: portfolio.payload.to_value(),
        })
    }
}

/// Derive a fund name from explicit params or the first two themes.
fn derive_fund_name(params: &FundParams) -> String {
    if let Some(name) = params.name.as_deref() {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }

    if params.themes.is_empty() {
        return "New Growth Fund".to_string();
    }

    let joined: String = params.themes.iter().take(2).map(|t| title_case(t)).collect();
    format!("{joined} Fund")
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase, collapse non-alphanumeric runs to hyphens, trim hyphens.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_hyphen = false;

    for ch in name.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }

    slug.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockReasoningClient;
    use crate::models::PositionStatus;
    use crate::store::InMemoryStore;
    use std::time::Duration;

    fn engine(client: Arc<MockReasoningClient>, store: Arc<InMemoryStore>) -> ConversationEngine {
        ConversationEngine::new(
            Arc::new(AgentRegistry::new()),
            AgentInvoker::new(client, Duration::from_secs(30)),
            store,
        )
    }

    #[test]
    fn test_fund_name_derivation() {
        let named = FundParams {
            name: Some("Deep Value Fund".to_string()),
            ..FundParams::default()
        };
        assert_eq!(derive_fund_name(&named), "Deep Value Fund");

        let themed = FundParams {
            themes: vec!["fintech".to_string(), "ai".to_string(), "space".to_string()],
            ..FundParams::default()
        };
        assert_eq!(derive_fund_name(&themed), "FintechAi Fund");

        assert_eq!(derive_fund_name(&FundParams::default()), "New Growth Fund");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("FintechAi Fund"), "fintechai-fund");
        assert_eq!(slugify("  AI & Robotics!! Fund  "), "ai-robotics-fund");
        assert_eq!(slugify("---"), "");
    }

    #[tokio::test]
    async fn test_create_fund_turn() {
        let client = Arc::new(MockReasoningClient::new().respond(
            "intent parser",
            r#"{
                "intent": "CREATE_FUND",
                "fund_params": {"themes": ["fintech", "ai"], "mandate": "US growth"},
                "suggested_response": "On it."
            }"#,
        ));
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(client, store.clone());

        let outcome = engine
            .chat(None, None, "build me a fintech and ai fund")
            .await
            .unwrap();

        assert_eq!(outcome.intent.as_deref(), Some("create_fund"));
        assert_eq!(
            outcome.actions,
            vec!["scouting", "analyzing", "building_portfolio"]
        );
        assert!(outcome.message.contains("FintechAi Fund"));

        let conversation = store
            .load_conversation(outcome.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.phase.name(), "scouting");
        assert_eq!(conversation.messages.len(), 2);

        let fund_id = conversation.fund_id.unwrap();
        let fund = store.get_fund(fund_id).await.unwrap().unwrap();
        assert_eq!(fund.name, "FintechAi Fund");
        assert_eq!(fund.slug, "fintechai-fund");
        assert_eq!(fund.status, FundStatus::Building);
    }

    #[tokio::test]
    async fn test_trade_command_requires_confirmation() {
        let client = Arc::new(MockReasoningClient::new().respond(
            "intent parser",
            r#"{"intent": "command_trade", "trade_params": {"ticker": "COIN", "action": "sell"}}"#,
        ));
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(client, store.clone());

        let outcome = engine.chat(None, None, "sell COIN").await.unwrap();

        assert_eq!(outcome.actions, vec!["confirm_trade"]);
        assert!(outcome.message.contains("sell COIN"));

        // No trade executed and no phase transition from this turn alone.
        let conversation = store
            .load_conversation(outcome.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.phase.name(), "creation");
    }

    #[tokio::test]
    async fn test_unclear_prefers_classifier_clarification() {
        let client = Arc::new(MockReasoningClient::new().respond(
            "intent parser",
            r#"{"intent": "unclear", "clarification_needed": "Which sector interests you?"}"#,
        ));
        let engine = engine(client, Arc::new(InMemoryStore::new()));

        let outcome = engine.chat(None, None, "hmm").await.unwrap();
        assert_eq!(outcome.message, "Which sector interests you?");
        assert!(outcome.actions.is_empty());
    }

    #[tokio::test]
    async fn test_intent_failure_degrades_to_unclear() {
        let client = Arc::new(MockReasoningClient::new().fail("intent parser", "llm down"));
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(client, store.clone());

        let outcome = engine.chat(None, None, "do something").await.unwrap();

        assert_eq!(outcome.intent.as_deref(), Some("unclear"));
        assert_eq!(outcome.message, FALLBACK_CLARIFICATION);

        // The turn was still persisted.
        let conversation = store
            .load_conversation(outcome.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.messages.len(), 2);
    }

    fn hot_universe(count: usize) -> String {
        let hot: Vec<String> = (1..=count)
            .map(|i| format!(r#"{{"ticker": "S{i}"}}"#))
            .collect();
        format!(
            r#"{{"screened_stocks": {{"hot": [{}], "warm": [], "cold": []}}, "summary": "ok"}}"#,
            hot.join(", ")
        )
    }

    #[tokio::test]
    async fn test_execute_scouting_caps_at_ten_and_advances() {
        let client = Arc::new(
            MockReasoningClient::new().respond("Stock Screener", &hot_universe(11)),
        );
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(client, store.clone());

        let mut conversation = Conversation::new(Some(Uuid::new_v4()));
        conversation.phase = Phase::Scouting {
            params: FundParams {
                themes: vec!["ai".to_string()],
                ..FundParams::default()
            },
        };
        store.save_conversation(&conversation).await.unwrap();

        let outcome = engine.execute(conversation.id, "scouting").await.unwrap();

        let ActionOutcome::Scouted { tickers, .. } = outcome else {
            panic!("expected scouted outcome");
        };
        assert_eq!(tickers.len(), 10);

        let reloaded = store.load_conversation(conversation.id).await.unwrap().unwrap();
        assert_eq!(reloaded.phase.name(), "discovered");
    }

    #[tokio::test]
    async fn test_execute_analyzing_caps_at_five_and_swallows_failures() {
        let client = Arc::new(
            MockReasoningClient::new()
                .fail("investment thesis for T3", "synthesis down")
                .respond(
                    "Thesis Writer",
                    r#"{"recommendation": "buy", "conviction": 0.6, "thesis_summary": "fine"}"#,
                ),
        );
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(client, store.clone());

        let mut conversation = Conversation::new(Some(Uuid::new_v4()));
        conversation.phase = Phase::Discovered {
            params: FundParams::default(),
            tickers: (1..=7).map(|i| format!("T{i}")).collect(),
        };
        store.save_conversation(&conversation).await.unwrap();

        let outcome = engine.execute(conversation.id, "analyzing").await.unwrap();

        let ActionOutcome::Analyzed { theses, .. } = outcome else {
            panic!("expected analyzed outcome");
        };
        // First five tickers attempted, T3 failed and was skipped.
        assert_eq!(theses.len(), 4);
        assert!(theses.iter().all(|t| t.ticker != "T3"));

        let reloaded = store.load_conversation(conversation.id).await.unwrap().unwrap();
        assert_eq!(reloaded.phase.name(), "analyzed");
    }

    #[tokio::test]
    async fn test_execute_building_portfolio_materializes_positions() {
        let client = Arc::new(MockReasoningClient::new().respond(
            "Portfolio Manager",
            r#"{
                "positions": [
                    {"ticker": "NVDA", "company": "NVIDIA", "weight": 0.08},
                    {"ticker": "MSFT", "weight": 0.06},
                    {"note": "cash buffer", "weight": 0.05}
                ]
            }"#,
        ));
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(client, store.clone());

        let fund = Fund::new("AI Fund".to_string(), "ai-fund".to_string(), None, None);
        store.save_fund(&fund).await.unwrap();

        let mut conversation = Conversation::new(Some(fund.id));
        conversation.phase = Phase::Analyzed {
            params: FundParams::default(),
            theses: Vec::new(),
        };
        store.save_conversation(&conversation).await.unwrap();

        let outcome = engine
            .execute(conversation.id, "building_portfolio")
            .await
            .unwrap();

        let ActionOutcome::PortfolioBuilt { positions, .. } = outcome else {
            panic!("expected portfolio outcome");
        };
        assert_eq!(positions, vec!["NVDA", "MSFT"]);

        let stored = store
            .positions_for_fund(fund.id, Some(PositionStatus::Proposed))
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
        let nvda = stored.iter().find(|p| p.ticker == "NVDA").unwrap();
        assert_eq!(nvda.target_weight, 0.08);
        assert_eq!(nvda.company_name.as_deref(), Some("NVIDIA"));

        let fund = store.get_fund(fund.id).await.unwrap().unwrap();
        assert_eq!(fund.status, FundStatus::Active);

        let reloaded = store.load_conversation(conversation.id).await.unwrap().unwrap();
        assert_eq!(reloaded.phase.name(), "complete");
    }

    #[tokio::test]
    async fn test_unknown_action_leaves_state_untouched() {
        let client = Arc::new(MockReasoningClient::new());
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(client, store.clone());

        let conversation = Conversation::new(None);
        store.save_conversation(&conversation).await.unwrap();

        let outcome = engine.execute(conversation.id, "dance").await.unwrap();
        assert!(matches!(outcome, ActionOutcome::UnknownAction { action } if action == "dance"));

        let reloaded = store.load_conversation(conversation.id).await.unwrap().unwrap();
        assert_eq!(reloaded.phase.name(), "creation");
    }

    #[tokio::test]
    async fn test_failed_stage_reports_in_band_and_keeps_phase() {
        // Screener hard-fails, so the scouting stage fails; the phase must
        // survive for a retry.
        let client = Arc::new(MockReasoningClient::new().fail("Stock Screener", "screener down"));
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(client, store.clone());

        let mut conversation = Conversation::new(Some(Uuid::new_v4()));
        conversation.phase = Phase::Scouting {
            params: FundParams::default(),
        };
        store.save_conversation(&conversation).await.unwrap();

        let outcome = engine.execute(conversation.id, "scouting").await.unwrap();
        assert!(
            matches!(outcome, ActionOutcome::Failed { ref action, .. } if action == "scouting")
        );

        let reloaded = store.load_conversation(conversation.id).await.unwrap().unwrap();
        assert_eq!(reloaded.phase.name(), "scouting");
    }
}
