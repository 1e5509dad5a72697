//! Core data models for the fund orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::agents::AgentPayload;
use crate::llm::SourceRef;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FundStatus {
    Building,
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Proposed,
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Recommendation {
    /// Parse an agent-supplied recommendation string. Anything unknown
    /// lands on `Hold` so a thesis always carries a valid recommendation.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "strong_buy" => Recommendation::StrongBuy,
            "buy" => Recommendation::Buy,
            "sell" => Recommendation::Sell,
            "strong_sell" => Recommendation::StrongSell,
            _ => Recommendation::Hold,
        }
    }
}

/// Aggregate portfolio risk classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RiskLevel {
    #[serde(rename = "LOW-MODERATE")]
    LowModerate,
    #[serde(rename = "MODERATE")]
    Moderate,
    #[serde(rename = "MODERATE-HIGH")]
    ModerateHigh,
    #[serde(rename = "HIGH")]
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::LowModerate => "LOW-MODERATE",
            RiskLevel::Moderate => "MODERATE",
            RiskLevel::ModerateHigh => "MODERATE-HIGH",
            RiskLevel::High => "HIGH",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Discovery =================
//

/// A candidate stock proposed by a scout. Free-form thesis fields from the
/// scout ride along in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredStock {
    pub ticker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<Value>,
    /// Name of the scout that first surfaced this stock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    /// Set when more than one scout surfaced the same ticker.
    #[serde(default)]
    pub multi_source: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// HOT/WARM/COLD partition of a discovery run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreenedUniverse {
    #[serde(default)]
    pub hot: Vec<DiscoveredStock>,
    #[serde(default)]
    pub warm: Vec<DiscoveredStock>,
    #[serde(default)]
    pub cold: Vec<DiscoveredStock>,
}

impl ScreenedUniverse {
    pub fn hot_count(&self) -> usize {
        self.hot.len()
    }

    pub fn warm_count(&self) -> usize {
        self.warm.len()
    }

    pub fn cold_count(&self) -> usize {
        self.cold.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryStats {
    pub scouts_run: usize,
    /// Stocks returned across all scouts, before deduplication.
    pub total_discovered: usize,
    pub unique_stocks: usize,
    pub hot_count: usize,
    pub warm_count: usize,
    pub cold_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoutSummary {
    pub name: String,
    pub count: usize,
    pub summary: String,
}

/// Full output of one discovery run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryOutcome {
    pub universe: ScreenedUniverse,
    pub stats: DiscoveryStats,
    pub scout_summaries: Vec<ScoutSummary>,
    pub screening_summary: String,
}

//
// ================= Thesis =================
//

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub fundamentals: Option<f64>,
    pub moat: Option<f64>,
    pub sentiment: Option<f64>,
    pub valuation: Option<f64>,
    pub overall: Option<f64>,
}

/// Synthesized per-ticker investment recommendation. Immutable once
/// returned; persistence and versioning live behind the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thesis {
    pub ticker: String,
    pub recommendation: Recommendation,
    /// Confidence in the recommendation, clamped to [0, 1].
    pub conviction: f64,
    /// Suggested portfolio weight, clamped to [0, 1].
    pub target_weight: f64,
    pub thesis_summary: Option<String>,
    pub bull_case: Option<String>,
    pub bear_case: Option<String>,
    pub key_risks: Vec<String>,
    pub scores: ScoreBreakdown,
}

impl Thesis {
    /// Build a thesis from the synthesis agent's payload. A degraded or
    /// partial payload yields a neutral hold thesis rather than an error.
    pub fn from_payload(ticker: &str, payload: &AgentPayload) -> Self {
        let recommendation = payload
            .str_field("recommendation")
            .map(Recommendation::parse)
            .unwrap_or(Recommendation::Hold);

        Self {
            ticker: ticker.to_string(),
            recommendation,
            conviction: unit_interval(payload.get("conviction")),
            target_weight: unit_interval(payload.get("target_weight")),
            thesis_summary: payload.str_field("thesis_summary").map(String::from),
            bull_case: case_summary(payload.get("bull_case")),
            bear_case: case_summary(payload.get("bear_case")),
            key_risks: string_list(payload.get("key_risks")),
            scores: payload
                .get("score_breakdown")
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default(),
        }
    }
}

fn unit_interval(value: Option<&Value>) -> f64 {
    value
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0)
}

/// Bull/bear cases come back either as a plain string or as an object
/// with a `summary` field.
fn case_summary(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("summary")
            .and_then(Value::as_str)
            .map(String::from),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// One research slot per discipline: either the agent payload or an
/// `{"_error": ...}` placeholder for a failed branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSet {
    pub fundamentals: Value,
    pub moat: Value,
    pub sentiment: Value,
    pub valuation: Value,
}

/// Complete output of one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub ticker: String,
    pub thesis: Thesis,
    pub research: ResearchSet,
    pub sources: Vec<SourceRef>,
}

/// Compact thesis view carried through conversation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThesisDigest {
    pub ticker: String,
    pub recommendation: Recommendation,
    pub conviction: f64,
    pub thesis_summary: Option<String>,
}

impl From<&AnalysisReport> for ThesisDigest {
    fn from(report: &AnalysisReport) -> Self {
        Self {
            ticker: report.ticker.clone(),
            recommendation: report.thesis.recommendation,
            conviction: report.thesis.conviction,
            thesis_summary: report.thesis.thesis_summary.clone(),
        }
    }
}

//
// ================= Risk =================
//

/// Pipeline input: one portfolio position as ticker + weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionWeight {
    pub ticker: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSummary {
    pub worst_case_drawdown: String,
    pub daily_var_95: String,
    pub probability_of_loss: String,
    pub effective_positions: String,
    pub overall_risk_level: RiskLevel,
}

/// Aggregated portfolio risk report. Sub-results are raw agent payloads
/// (or `{"_error": ...}` slots); the summary, flags, and recommendations
/// are computed by the orchestrator, not delegated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReport {
    pub positions_count: usize,
    pub total_value: f64,
    pub stress_tests: Value,
    pub var: Value,
    pub monte_carlo: Option<Value>,
    pub correlations: Option<Value>,
    pub summary: RiskSummary,
    pub risk_flags: Vec<String>,
    pub recommendations: Vec<String>,
}

//
// ================= Persistence entities =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fund {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub category: Option<String>,
    pub mandate: Option<String>,
    pub benchmark_primary: Option<String>,
    pub benchmark_secondary: Option<String>,
    pub status: FundStatus,
    pub created_at: DateTime<Utc>,
}

impl Fund {
    pub fn new(name: String, slug: String, category: Option<String>, mandate: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            slug,
            category,
            mandate,
            benchmark_primary: None,
            benchmark_secondary: None,
            status: FundStatus::Building,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub fund_id: Uuid,
    pub ticker: String,
    pub company_name: Option<String>,
    pub target_weight: f64,
    pub current_weight: f64,
    pub current_price: Option<f64>,
    pub cost_basis: Option<f64>,
    pub unrealized_pnl_pct: Option<f64>,
    pub status: PositionStatus,
    pub created_at: DateTime<Utc>,
}

impl Position {
    pub fn proposed(fund_id: Uuid, ticker: String, company_name: Option<String>, weight: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            fund_id,
            ticker,
            company_name,
            target_weight: weight,
            current_weight: weight,
            current_price: None,
            cost_basis: None,
            unrealized_pnl_pct: None,
            status: PositionStatus::Proposed,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub fund_id: Uuid,
    /// Alert category: "news", "risk", "drift".
    pub kind: String,
    pub ticker: Option<String>,
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub action_required: bool,
    pub action_options: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

/// Persisted analysis result for a ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThesisRecord {
    pub id: Uuid,
    pub fund_id: Option<Uuid>,
    pub ticker: String,
    pub recommendation: Recommendation,
    pub conviction: f64,
    pub report: Value,
    pub created_at: DateTime<Utc>,
}

impl ThesisRecord {
    pub fn from_report(report: &AnalysisReport, fund_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            fund_id,
            ticker: report.ticker.clone(),
            recommendation: report.thesis.recommendation,
            conviction: report.thesis.conviction,
            report: serde_json::to_value(report).unwrap_or(Value::Null),
            created_at: Utc::now(),
        }
    }
}

/// Persisted weekly risk report for a fund.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReportRecord {
    pub id: Uuid,
    pub fund_id: Uuid,
    pub report: RiskReport,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recommendation_parse_defaults_to_hold() {
        assert_eq!(Recommendation::parse("strong_buy"), Recommendation::StrongBuy);
        assert_eq!(Recommendation::parse("SELL"), Recommendation::Sell);
        assert_eq!(Recommendation::parse("accumulate"), Recommendation::Hold);
        assert_eq!(Recommendation::parse(""), Recommendation::Hold);
    }

    #[test]
    fn test_risk_level_serialization() {
        assert_eq!(
            serde_json::to_string(&RiskLevel::ModerateHigh).unwrap(),
            "\"MODERATE-HIGH\""
        );
        assert_eq!(RiskLevel::LowModerate.to_string(), "LOW-MODERATE");
    }

    #[test]
    fn test_thesis_from_full_payload() {
        let payload = AgentPayload::recover(
            r#"{
                "recommendation": "buy",
                "conviction": 0.8,
                "target_weight": 0.06,
                "thesis_summary": "Category leader with room to run.",
                "bull_case": {"summary": "Share gains continue."},
                "bear_case": "Valuation leaves no margin for error.",
                "key_risks": ["Customer concentration", "Rate sensitivity"],
                "score_breakdown": {"fundamentals": 8, "moat": 7, "sentiment": 6, "valuation": 5, "overall": 7}
            }"#,
        );

        let thesis = Thesis::from_payload("NVDA", &payload);
        assert_eq!(thesis.recommendation, Recommendation::Buy);
        assert_eq!(thesis.conviction, 0.8);
        assert_eq!(thesis.bull_case.as_deref(), Some("Share gains continue."));
        assert_eq!(
            thesis.bear_case.as_deref(),
            Some("Valuation leaves no margin for error.")
        );
        assert_eq!(thesis.key_risks.len(), 2);
        assert_eq!(thesis.scores.overall, Some(7.0));
    }

    #[test]
    fn test_thesis_from_degraded_payload_is_neutral() {
        let payload = AgentPayload::recover("the model rambled instead of answering");
        let thesis = Thesis::from_payload("XYZ", &payload);

        assert_eq!(thesis.recommendation, Recommendation::Hold);
        assert_eq!(thesis.conviction, 0.0);
        assert_eq!(thesis.target_weight, 0.0);
        assert!(thesis.key_risks.is_empty());
    }

    #[test]
    fn test_thesis_clamps_out_of_range_values() {
        let payload = AgentPayload::recover(r#"{"recommendation": "buy", "conviction": 1.7, "target_weight": -0.2}"#);
        let thesis = Thesis::from_payload("ABC", &payload);

        assert_eq!(thesis.conviction, 1.0);
        assert_eq!(thesis.target_weight, 0.0);
    }

    #[test]
    fn test_discovered_stock_keeps_free_form_fields() {
        let stock: DiscoveredStock = serde_json::from_value(json!({
            "ticker": "NVDA",
            "company": "NVIDIA",
            "market_cap": "$3T",
            "why_interesting": "AI infrastructure leader"
        }))
        .unwrap();

        assert_eq!(stock.ticker, "NVDA");
        assert!(!stock.multi_source);
        assert_eq!(stock.extra["why_interesting"], "AI infrastructure leader");
    }
}
