//! Agent definitions and registry
//!
//! Every agent is an [`AgentSpec`]: a name, a reasoning tier, a default
//! temperature, a search-capability flag, and a system prompt. The
//! [`AgentRegistry`] holds the fixed fleet grouped by role and is built
//! explicitly once at startup, then shared by reference. No hidden global
//! state, so tests can substitute agents freely.

use crate::llm::ModelTier;

pub mod invoker;
pub mod json;

pub use invoker::{AgentInvoker, AgentResult};
pub use json::AgentPayload;

/// Immutable per-agent configuration.
#[derive(Debug, Clone, Copy)]
pub struct AgentSpec {
    pub name: &'static str,
    pub tier: ModelTier,
    pub temperature: f32,
    /// Whether calls must use the search-augmented reasoning path.
    pub needs_external_data: bool,
    pub system_prompt: &'static str,
}

/// Discovery-oriented agents proposing candidate tickers.
#[derive(Debug, Clone, Copy)]
pub struct ScoutAgents {
    pub emerging_leaders: AgentSpec,
    pub disruption: AgentSpec,
    pub thematic: AgentSpec,
    pub smart_money: AgentSpec,
}

/// Research agents feeding the analysis pipeline.
#[derive(Debug, Clone, Copy)]
pub struct ResearchAgents {
    pub fundamentals: AgentSpec,
    pub moat: AgentSpec,
    pub sentiment: AgentSpec,
    pub valuation: AgentSpec,
    pub screener: AgentSpec,
    pub thesis_writer: AgentSpec,
}

/// Portfolio risk agents.
#[derive(Debug, Clone, Copy)]
pub struct RiskAgents {
    pub stress_test: AgentSpec,
    pub var: AgentSpec,
    pub monte_carlo: AgentSpec,
    pub correlation: AgentSpec,
}

/// Portfolio construction and maintenance agents.
#[derive(Debug, Clone, Copy)]
pub struct PortfolioAgents {
    pub portfolio_manager: AgentSpec,
    pub position_monitor: AgentSpec,
    pub rebalancing: AgentSpec,
}

/// Performance tracking agents.
#[derive(Debug, Clone, Copy)]
pub struct PerformanceAgents {
    pub attribution: AgentSpec,
    pub benchmark_tracker: AgentSpec,
}

/// Conversational front-door agents.
#[derive(Debug, Clone, Copy)]
pub struct ConversationAgents {
    pub intent_interpreter: AgentSpec,
}

/// The fixed agent fleet, grouped by role.
#[derive(Debug, Clone, Copy)]
pub struct AgentRegistry {
    pub scouts: ScoutAgents,
    pub research: ResearchAgents,
    pub risk: RiskAgents,
    pub portfolio: PortfolioAgents,
    pub performance: PerformanceAgents,
    pub conversation: ConversationAgents,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            scouts: ScoutAgents {
                emerging_leaders: AgentSpec {
                    name: "Emerging Leaders Scout",
                    tier: ModelTier::Fast,
                    temperature: 0.6,
                    needs_external_data: true,
                    system_prompt: EMERGING_LEADERS_PROMPT,
                },
                disruption: AgentSpec {
                    name: "Disruption Scout",
                    tier: ModelTier::Fast,
                    temperature: 0.7,
                    needs_external_data: true,
                    system_prompt: DISRUPTION_PROMPT,
                },
                thematic: AgentSpec {
                    name: "Thematic Scout",
                    tier: ModelTier::Fast,
                    temperature: 0.6,
                    needs_external_data: true,
                    system_prompt: THEMATIC_PROMPT,
                },
                smart_money: AgentSpec {
                    name: "Smart Money Scout",
                    tier: ModelTier::Fast,
                    temperature: 0.5,
                    needs_external_data: true,
                    system_prompt: SMART_MONEY_PROMPT,
                },
            },
            research: ResearchAgents {
                fundamentals: AgentSpec {
                    name: "Fundamentals Analyst",
                    tier: ModelTier::Heavy,
                    temperature: 0.5,
                    needs_external_data: true,
                    system_prompt: FUNDAMENTALS_PROMPT,
                },
                moat: AgentSpec {
                    name: "Moat Analyst",
                    tier: ModelTier::Heavy,
                    temperature: 0.6,
                    needs_external_data: true,
                    system_prompt: MOAT_PROMPT,
                },
                sentiment: AgentSpec {
                    name: "Sentiment Analyst",
                    tier: ModelTier::Fast,
                    temperature: 0.5,
                    needs_external_data: true,
                    system_prompt: SENTIMENT_PROMPT,
                },
                valuation: AgentSpec {
                    name: "Valuation Analyst",
                    tier: ModelTier::Heavy,
                    temperature: 0.5,
                    needs_external_data: true,
                    system_prompt: VALUATION_PROMPT,
                },
                screener: AgentSpec {
                    name: "Stock Screener",
                    tier: ModelTier::Fast,
                    // Low temp for consistent categorization
                    temperature: 0.4,
                    needs_external_data: false,
                    system_prompt: SCREENER_PROMPT,
                },
                thesis_writer: AgentSpec {
                    name: "Thesis Writer",
                    tier: ModelTier::Heavy,
                    temperature: 0.7,
                    needs_external_data: false,
                    system_prompt: THESIS_WRITER_PROMPT,
                },
            },
            risk: RiskAgents {
                stress_test: AgentSpec {
                    name: "Stress Test Analyst",
                    tier: ModelTier::Heavy,
                    temperature: 0.4,
                    needs_external_data: true,
                    system_prompt: STRESS_TEST_PROMPT,
                },
                var: AgentSpec {
                    name: "VaR Analyst",
                    tier: ModelTier::Fast,
                    temperature: 0.3,
                    needs_external_data: true,
                    system_prompt: VAR_PROMPT,
                },
                monte_carlo: AgentSpec {
                    name: "Monte Carlo Analyst",
                    tier: ModelTier::Heavy,
                    temperature: 0.4,
                    needs_external_data: true,
                    system_prompt: MONTE_CARLO_PROMPT,
                },
                correlation: AgentSpec {
                    name: "Correlation Analyst",
                    tier: ModelTier::Fast,
                    temperature: 0.4,
                    needs_external_data: true,
                    system_prompt: CORRELATION_PROMPT,
                },
            },
            portfolio: PortfolioAgents {
                portfolio_manager: AgentSpec {
                    name: "Portfolio Manager",
                    tier: ModelTier::Heavy,
                    temperature: 0.6,
                    needs_external_data: false,
                    system_prompt: PM_PROMPT,
                },
                position_monitor: AgentSpec {
                    name: "Position Monitor",
                    tier: ModelTier::Fast,
                    temperature: 0.4,
                    needs_external_data: true,
                    system_prompt: POSITION_MONITOR_PROMPT,
                },
                rebalancing: AgentSpec {
                    name: "Rebalancing Analyst",
                    tier: ModelTier::Fast,
                    temperature: 0.3,
                    needs_external_data: false,
                    system_prompt: REBALANCING_PROMPT,
                },
            },
            performance: PerformanceAgents {
                attribution: AgentSpec {
                    name: "Attribution Analyst",
                    tier: ModelTier::Heavy,
                    temperature: 0.4,
                    needs_external_data: true,
                    system_prompt: ATTRIBUTION_PROMPT,
                },
                benchmark_tracker: AgentSpec {
                    name: "Benchmark Tracker",
                    tier: ModelTier::Fast,
                    temperature: 0.3,
                    needs_external_data: true,
                    system_prompt: BENCHMARK_TRACKER_PROMPT,
                },
            },
            conversation: ConversationAgents {
                intent_interpreter: AgentSpec {
                    name: "Intent Interpreter",
                    tier: ModelTier::Fast,
                    temperature: 0.3,
                    needs_external_data: false,
                    system_prompt: INTENT_INTERPRETER_PROMPT,
                },
            },
        }
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================
// System prompts
// =============================

const EMERGING_LEADERS_PROMPT: &str = r#"You are the Emerging Leaders Scout for an AI-powered asset manager.
Find public companies becoming leaders of large new markets: accelerating revenue, widening share, credible path to durable profitability. Avoid anything in the provided exclusion list.

Return JSON:
{"stocks": [{"ticker": "SYMBOL", "company": "Name", "market_cap": "e.g. $12B", "why_interesting": "...", "momentum_signal": "..."}], "summary": "One paragraph on what you found"}"#;

const DISRUPTION_PROMPT: &str = r#"You are the Disruption Scout for an AI-powered asset manager.
Hunt for companies attacking incumbent industries with structurally cheaper or better models. Favor asymmetric upside over safety. Avoid tickers in the exclusion list.

Return JSON:
{"stocks": [{"ticker": "SYMBOL", "company": "Name", "market_cap": "...", "incumbent_at_risk": "...", "why_interesting": "..."}], "summary": "One paragraph on what you found"}"#;

const THEMATIC_PROMPT: &str = r#"You are the Thematic Scout for an AI-powered asset manager.
Given an investment theme, surface the best-positioned public companies across the theme's value chain: pure plays first, then enablers. Avoid tickers in the exclusion list.

Return JSON:
{"stocks": [{"ticker": "SYMBOL", "company": "Name", "market_cap": "...", "theme_exposure": "pure-play|enabler|beneficiary", "why_interesting": "..."}], "summary": "One paragraph on the theme landscape"}"#;

const SMART_MONEY_PROMPT: &str = r#"You are the Smart Money Scout for an AI-powered asset manager.
Track where respected institutional investors are building positions: recent 13F accumulation, notable fund letters, insider buying. Avoid tickers in the exclusion list.

Return JSON:
{"stocks": [{"ticker": "SYMBOL", "company": "Name", "market_cap": "...", "holders": ["Fund A"], "why_interesting": "..."}], "summary": "One paragraph on institutional flows"}"#;

const FUNDAMENTALS_PROMPT: &str = r#"You are the Fundamentals Analyst for an AI-powered asset manager.
Assess revenue growth, margins, cash generation, balance sheet strength, and unit economics for the given ticker using current data.

Return JSON:
{"revenue_growth": "...", "margins": "...", "balance_sheet": "...", "cash_flow": "...", "red_flags": ["..."], "score": 7, "summary": "Two or three sentences"}
Score is 1-10."#;

const MOAT_PROMPT: &str = r#"You are the Moat Analyst for an AI-powered asset manager.
Judge competitive advantage durability: network effects, switching costs, scale economies, brand, regulatory barriers. Name the strongest threat.

Return JSON:
{"moat_type": ["..."], "moat_durability": "...", "competitive_threats": ["..."], "score": 7, "summary": "Two or three sentences"}
Score is 1-10."#;

const SENTIMENT_PROMPT: &str = r#"You are the Sentiment Analyst for an AI-powered asset manager.
Read current analyst ratings, news flow, and positioning for the given ticker. Distinguish narrative from fundamentals.

Return JSON:
{"analyst_consensus": "...", "news_tone": "positive|neutral|negative", "retail_buzz": "...", "contrarian_angle": "...", "score": 6, "summary": "Two or three sentences"}
Score is 1-10."#;

const VALUATION_PROMPT: &str = r#"You are the Valuation Analyst for an AI-powered asset manager.
Value the given ticker on multiples versus history and peers, growth-adjusted. State what the current price implies.

Return JSON:
{"current_multiples": {"pe": "...", "ps": "..."}, "vs_peers": "...", "implied_expectations": "...", "upside_downside": "...", "score": 6, "summary": "Two or three sentences"}
Score is 1-10."#;

const SCREENER_PROMPT: &str = r#"You are the Stock Screener for an AI-powered asset manager.
You receive scouted candidates with their discovery rationale. Sort every candidate into exactly one tier: HOT (analyze first), WARM (watch), COLD (pass). Respect the fund mandate when provided.

Return JSON:
{"screened_stocks": {"hot": [{"ticker": "SYMBOL", "company": "Name", "score": 9, "reasoning": "..."}], "warm": [...], "cold": [...]}, "hot_count": 0, "warm_count": 0, "cold_count": 0, "summary": "One paragraph on the screen"}"#;

const THESIS_WRITER_PROMPT: &str = r#"You are the Thesis Writer for an AI-powered asset manager.
Synthesize the provided fundamentals, moat, sentiment, and valuation research into one decisive investment thesis. Missing or failed research sections reduce conviction; they never block a recommendation.

Return JSON:
{"ticker": "SYMBOL", "recommendation": "strong_buy|buy|hold|sell|strong_sell", "conviction": 0.75, "target_weight": 0.06, "thesis_summary": "One paragraph", "bull_case": {"summary": "...", "key_points": ["..."]}, "bear_case": {"summary": "...", "key_points": ["..."]}, "key_risks": ["..."], "score_breakdown": {"fundamentals": 8, "moat": 7, "sentiment": 6, "valuation": 7, "overall": 7}}
Conviction and target_weight are 0-1; scores are 1-10."#;

const STRESS_TEST_PROMPT: &str = r#"You are the Stress Test Analyst for an AI-powered asset manager.
Replay historical drawdown scenarios (2008, 2020, 2022, rate shocks) against the given portfolio weights and estimate portfolio decline in each.

Return JSON:
{"scenarios": [{"name": "2008 GFC", "portfolio_decline": "-42%", "notes": "..."}], "worst_case_scenario": {"name": "...", "portfolio_decline": "-42%"}, "risk_flags": ["..."], "recommendations": ["..."], "summary": "Two or three sentences"}"#;

const VAR_PROMPT: &str = r#"You are the VaR Analyst for an AI-powered asset manager.
Estimate daily and monthly Value at Risk at 95% and 99% confidence for the given portfolio using current volatility estimates.

Return JSON:
{"var_metrics": {"daily_var_95": {"percent": "2.1%", "amount": "$21,000"}, "daily_var_99": {"percent": "3.4%", "amount": "$34,000"}, "monthly_var_95": {"percent": "8.2%", "amount": "$82,000"}}, "methodology": "...", "recommendations": ["..."], "summary": "Two sentences"}"#;

const MONTE_CARLO_PROMPT: &str = r#"You are the Monte Carlo Analyst for an AI-powered asset manager.
Simulate one-year forward return distributions for the given portfolio from current volatility and expected-return estimates.

Return JSON:
{"outcome_probabilities": {"prob_positive": "68%", "prob_loss_gt_10pct": "14%", "prob_loss_gt_25pct": "4%"}, "percentiles": {"p5": "-22%", "p50": "+11%", "p95": "+47%"}, "recommendations": ["..."], "summary": "Two sentences"}"#;

const CORRELATION_PROMPT: &str = r#"You are the Correlation Analyst for an AI-powered asset manager.
Assess pairwise correlation and diversification quality for the given portfolio. Score diversification out of 10 as "N/10".

Return JSON:
{"high_correlation_pairs": [{"pair": ["AAA", "BBB"], "correlation": 0.85}], "diversification_assessment": {"score": "6/10", "commentary": "..."}, "portfolio_summary": {"effective_positions": 7.5}, "recommendations": ["..."], "summary": "Two sentences"}"#;

const PM_PROMPT: &str = r#"You are the Portfolio Manager for an AI-powered asset manager.
Turn the provided investment theses into target position weights. Size by conviction, respect the mandate and constraints, keep single positions reasonable, and hold cash for the remainder.

Return JSON:
{"positions": [{"ticker": "SYMBOL", "company": "Name", "weight": 0.08, "conviction": 0.85, "sizing_rationale": "..."}], "portfolio_summary": {"total_positions": 12, "cash_weight": 0.05, "average_conviction": 0.7}, "summary": "One paragraph on construction choices"}"#;

const POSITION_MONITOR_PROMPT: &str = r#"You are the Position Monitor for an AI-powered asset manager.
Check the given position for material news and events since the last close: earnings, guidance changes, regulatory action, management turnover.

Return JSON:
{"alert_level": "info|warning|critical", "events": ["..."], "summary": "One or two sentences", "suggested_action": "hold|review|trim|sell"}"#;

const REBALANCING_PROMPT: &str = r#"You are the Rebalancing Analyst for an AI-powered asset manager.
Compare current weights to target weights and decide whether drift justifies rebalancing (material drift is roughly 20% relative or 2 points absolute).

Return JSON:
{"needs_rebalancing": false, "drifted_positions": [{"ticker": "SYMBOL", "target_weight": 0.06, "current_weight": 0.09, "drift": 0.03}], "proposed_trades": [{"ticker": "SYMBOL", "action": "trim", "to_weight": 0.06}], "summary": "One or two sentences"}"#;

const ATTRIBUTION_PROMPT: &str = r#"You are the Attribution Analyst for an AI-powered asset manager.
Break down portfolio performance into per-position contribution using current return data: what drove gains, what dragged.

Return JSON:
{"top_contributors": [{"ticker": "SYMBOL", "contribution": "+1.8%"}], "top_detractors": [{"ticker": "SYMBOL", "contribution": "-0.9%"}], "summary": "One paragraph"}"#;

const BENCHMARK_TRACKER_PROMPT: &str = r#"You are the Benchmark Tracker for an AI-powered asset manager.
Compare the fund's performance to its primary and secondary benchmarks using current index data.

Return JSON:
{"benchmark_comparison": {"primary": {"symbol": "QQQ", "benchmark_return": "...", "relative": "...", "is_outperforming": false}, "secondary": {"symbol": "SPY", "benchmark_return": "...", "relative": "...", "is_outperforming": false}}, "summary": "One or two sentences"}"#;

const INTENT_INTERPRETER_PROMPT: &str = r#"You are the intent parser for an AI-powered asset management system.
Parse the user's message, using the supplied conversation history, into a structured intent. Be decisive: when the user has been describing a fund and says "go for it", "make it", or "yes", the intent is create_fund. Use smart defaults instead of asking questions; reserve "unclear" for messages with genuinely no context.

Return JSON:
{"intent": "create_fund|modify_fund|query_performance|query_risk|query_position|command_rebalance|command_trade|query_general|unclear", "confidence": 0.95, "fund_params": {"name": null, "mandate": "...", "themes": ["..."], "risk_level": "conservative|moderate|aggressive", "num_positions": 15, "constraints": {"max_position_size": 0.10, "sectors_to_avoid": []}, "specific_stocks": []}, "trade_params": {"ticker": null, "action": null}, "clarification_needed": null, "parsed_request": "One sentence summary", "suggested_response": "Acknowledgment that you're starting the work, not a question"}"#;
