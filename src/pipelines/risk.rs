//! Portfolio risk pipeline
//!
//! Fans out to the risk agents (stress test and VaR always; Monte Carlo
//! and correlation on full runs), captures branch failures as
//! `{"_error": ...}` slots, and compiles a single report. The overall
//! risk level, flags, and recommendations are derived here by the
//! orchestrator, never delegated to an agent.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::agents::{AgentInvoker, AgentRegistry, AgentResult, AgentSpec};
use crate::models::{PositionWeight, RiskLevel, RiskReport, RiskSummary};
use crate::Result;

const MAX_FLAGS: usize = 5;
const MAX_RECOMMENDATIONS: usize = 5;

#[derive(Clone)]
pub struct RiskPipeline {
    registry: Arc<AgentRegistry>,
    invoker: AgentInvoker,
}

impl RiskPipeline {
    pub fn new(registry: Arc<AgentRegistry>, invoker: AgentInvoker) -> Self {
        Self { registry, invoker }
    }

    /// Run risk analysis on a portfolio.
    ///
    /// `run_full = false` restricts the run to stress test + VaR; the Monte
    /// Carlo and correlation slots are then absent from the report.
    pub async fn analyze(
        &self,
        positions: &[PositionWeight],
        portfolio_value: f64,
        run_full: bool,
    ) -> Result<RiskReport> {
        info!(positions = positions.len(), run_full, "Risk pipeline: dispatching agents");

        let mut context = Map::new();
        context.insert("positions".to_string(), serde_json::to_value(positions)?);
        context.insert("portfolio_value".to_string(), json!(portfolio_value));

        let risk = &self.registry.risk;
        let mut branches: Vec<(&'static str, AgentSpec)> = vec![
            ("stress_test", risk.stress_test),
            ("var", risk.var),
        ];
        if run_full {
            branches.push(("monte_carlo", risk.monte_carlo));
            branches.push(("correlation", risk.correlation));
        }

        let handles: Vec<(&'static str, JoinHandle<Result<AgentResult>>)> = branches
            .into_iter()
            .map(|(label, spec)| {
                let invoker = self.invoker.clone();
                let context = context.clone();
                let handle = tokio::spawn(async move {
                    invoker.invoke(&spec, "Analyze portfolio risk", &context).await
                });
                (label, handle)
            })
            .collect();

        let mut slots: Vec<Value> = Vec::with_capacity(4);
        for (label, handle) in handles {
            let slot = match handle.await {
                Ok(Ok(result)) => result.payload.to_value(),
                Ok(Err(e)) => {
                    warn!(branch = label, error = %e, "Risk branch failed");
                    json!({ "_error": e.to_string() })
                }
                Err(e) => {
                    warn!(branch = label, error = %e, "Risk branch panicked");
                    json!({ "_error": e.to_string() })
                }
            };
            slots.push(slot);
        }

        let stress = slots[0].clone();
        let var = slots[1].clone();
        let monte_carlo = run_full.then(|| slots[2].clone());
        let correlations = run_full.then(|| slots[3].clone());

        let summary = build_summary(&stress, &var, monte_carlo.as_ref(), correlations.as_ref());
        let risk_flags = identify_flags(&stress, &var, correlations.as_ref());
        let recommendations = compile_recommendations(&stress, &var, correlations.as_ref());

        info!(
            overall = %summary.overall_risk_level,
            flags = risk_flags.len(),
            "Risk analysis complete"
        );

        Ok(RiskReport {
            positions_count: positions.len(),
            total_value: portfolio_value,
            stress_tests: stress,
            var,
            monte_carlo,
            correlations,
            summary,
            risk_flags,
            recommendations,
        })
    }
}

fn build_summary(
    stress: &Value,
    var: &Value,
    monte_carlo: Option<&Value>,
    correlations: Option<&Value>,
) -> RiskSummary {
    RiskSummary {
        worst_case_drawdown: display_at(stress, &["worst_case_scenario", "portfolio_decline"]),
        daily_var_95: display_at(var, &["var_metrics", "daily_var_95", "percent"]),
        probability_of_loss: monte_carlo
            .map(|mc| display_at(mc, &["outcome_probabilities", "prob_loss_gt_10pct"]))
            .unwrap_or_else(|| "N/A".to_string()),
        effective_positions: correlations
            .map(|corr| display_at(corr, &["portfolio_summary", "effective_positions"]))
            .unwrap_or_else(|| "N/A".to_string()),
        overall_risk_level: assess_overall_risk(stress),
    }
}

/// Map the stress test's worst-case decline to an overall risk level.
/// A missing or unparsable decline is treated as HIGH, the conservative
/// reading of a stress test we couldn't interpret.
fn assess_overall_risk(stress: &Value) -> RiskLevel {
    let Some(worst_pct) = worst_case_decline(stress) else {
        return RiskLevel::High;
    };

    if worst_pct > 50.0 {
        RiskLevel::High
    } else if worst_pct > 35.0 {
        RiskLevel::ModerateHigh
    } else if worst_pct > 25.0 {
        RiskLevel::Moderate
    } else {
        RiskLevel::LowModerate
    }
}

/// Parse the worst-case percentage decline, e.g. "-42%" -> 42.0.
fn worst_case_decline(stress: &Value) -> Option<f64> {
    let raw = value_at(stress, &["worst_case_scenario", "portfolio_decline"])?;
    let text = match raw {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    text.replace(['%', '-'], "")
        .trim()
        .parse::<f64>()
        .ok()
        .map(f64::abs)
}

fn identify_flags(stress: &Value, var: &Value, correlations: Option<&Value>) -> Vec<String> {
    let mut flags: Vec<String> = Vec::new();

    // Up to two flags straight from the stress test.
    flags.extend(string_items(stress.get("risk_flags")).into_iter().take(2));

    // Diversification scored 3-5 out of 10 is a quality flag. An absent
    // score reads as the middling default and still flags.
    if let Some(corr) = correlations {
        let score = value_at(corr, &["diversification_assessment", "score"])
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| "5/10".to_string());
        if score.starts_with(['3', '4', '5']) {
            flags.push("Diversification quality needs improvement".to_string());
        }
    }

    // Daily 95% VaR above 3% is worth surfacing.
    if let Some(var_pct) = value_at(var, &["var_metrics", "daily_var_95", "percent"])
        .and_then(Value::as_str)
    {
        let above_threshold = var_pct
            .replace('%', "")
            .trim()
            .parse::<f64>()
            .map_or(false, |v| v > 3.0);
        if above_threshold {
            flags.push(format!("High daily VaR of {var_pct}"));
        }
    }

    flags.truncate(MAX_FLAGS);
    flags
}

fn compile_recommendations(
    stress: &Value,
    var: &Value,
    correlations: Option<&Value>,
) -> Vec<String> {
    let mut recs: Vec<String> = Vec::new();
    recs.extend(string_items(stress.get("recommendations")).into_iter().take(2));
    recs.extend(string_items(var.get("recommendations")).into_iter().take(1));
    if let Some(corr) = correlations {
        recs.extend(string_items(corr.get("recommendations")).into_iter().take(2));
    }

    // Set semantics; insertion order is kept but callers must not rely on it.
    let mut seen = HashSet::new();
    recs.retain(|r| seen.insert(r.clone()));
    recs.truncate(MAX_RECOMMENDATIONS);
    recs
}

fn value_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(key))
}

fn display_at(value: &Value, path: &[&str]) -> String {
    match value_at(value, path) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "N/A".to_string(),
    }
}

fn string_items(value: Option<&Value>) -> Vec<String> {
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
