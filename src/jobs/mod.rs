//! Scheduled job entry points
//!
//! Parameterless operations intended to be fired by an external cron-like
//! scheduler: daily position monitoring and price updates, weekly risk
//! reports, rebalancing checks, and performance updates. Each job loops
//! sequentially over funds and positions to keep the external call rate
//! bounded, and continues past per-item failures.

use std::sync::Arc;

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::{AgentInvoker, AgentRegistry};
use crate::llm::ReasoningClient;
use crate::models::{
    Alert, AlertSeverity, FundStatus, PositionStatus, PositionWeight, RiskReportRecord,
};
use crate::pipelines::RiskPipeline;
use crate::store::Store;
use crate::Result;

lazy_static! {
    static ref PRICE_RE: Regex = Regex::new(r"\$?([\d,]+\.?\d*)").expect("valid price regex");
}

const DEFAULT_PORTFOLIO_VALUE: f64 = 1_000_000.0;

#[derive(Debug, Clone, Serialize)]
pub struct MonitorReport {
    pub positions_checked: usize,
    pub alerts_created: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceUpdateReport {
    pub tickers: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskJobReport {
    pub reports_generated: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebalanceReport {
    pub funds_checked: usize,
    pub rebalance_needed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub funds_updated: usize,
}

pub struct Jobs {
    store: Arc<dyn Store>,
    registry: Arc<AgentRegistry>,
    invoker: AgentInvoker,
    client: Arc<dyn ReasoningClient>,
    risk: RiskPipeline,
}

impl Jobs {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<AgentRegistry>,
        invoker: AgentInvoker,
        client: Arc<dyn ReasoningClient>,
    ) -> Self {
        let risk = RiskPipeline::new(registry.clone(), invoker.clone());
        Self {
            store,
            registry,
            invoker,
            client,
            risk,
        }
    }

    /// Daily: check every active position for material news and raise
    /// alerts for warning/critical findings.
    pub async fn monitor_all_positions(&self) -> Result<MonitorReport> {
        info!("Starting daily position monitoring");

        let mut positions_checked = 0;
        let mut alerts_created = 0;

        for fund in self.store.list_funds_by_status(FundStatus::Active).await? {
            let positions = self
                .store
                .positions_for_fund(fund.id, Some(PositionStatus::Active))
                .await?;

            for position in positions {
                positions_checked += 1;

                let mut context = Map::new();
                context.insert("ticker".to_string(), json!(position.ticker));
                context.insert("weight".to_string(), json!(position.target_weight));

                let result = match self
                    .invoker
                    .invoke(
                        &self.registry.portfolio.position_monitor,
                        "Check for material news and events",
                        &context,
                    )
                    .await
                {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(ticker = %position.ticker, error = %e, "Monitoring failed");
                        continue;
                    }
                };

                let level = result.payload.str_field("alert_level").unwrap_or("info");
                if level == "warning" || level == "critical" {
                    let summary = result
                        .payload
                        .str_field("summary")
                        .unwrap_or("Material event detected")
                        .to_string();
                    let critical = level == "critical";

                    let alert = Alert {
                        id: Uuid::new_v4(),
                        fund_id: fund.id,
                        kind: "news".to_string(),
                        ticker: Some(position.ticker.clone()),
                        title: format!("{}: {}", position.ticker, truncate(&summary, 100)),
                        message: summary,
                        severity: if critical {
                            AlertSeverity::Critical
                        } else {
                            AlertSeverity::Warning
                        },
                        action_required: critical,
                        action_options: critical.then(|| {
                            vec![
                                "hold".to_string(),
                                "review".to_string(),
                                "trim".to_string(),
                                "sell".to_string(),
                            ]
                        }),
                        created_at: Utc::now(),
                    };
                    self.store.save_alert(&alert).await?;
                    alerts_created += 1;
                    info!(ticker = %position.ticker, level, "Alert created");
                }
            }
        }

        info!(alerts_created, "Monitoring complete");
        Ok(MonitorReport {
            positions_checked,
            alerts_created,
        })
    }

    /// Daily: refresh prices for every active position after market close.
    pub async fn update_all_prices(&self) -> Result<PriceUpdateReport> {
        info!("Starting daily price update");

        let positions = self
            .store
            .list_positions_by_status(PositionStatus::Active)
            .await?;

        let mut tickers: Vec<String> = Vec::new();
        for position in &positions {
            if !tickers.contains(&position.ticker) {
                tickers.push(position.ticker.clone());
            }
        }

        let mut updated = 0;
        for ticker in &tickers {
            let prompt = format!(
                "What is the current stock price of {ticker}? Just give me the price number."
            );
            let response = match self.client.search(&prompt, None, 0.3).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(ticker = %ticker, error = %e, "Price lookup failed");
                    continue;
                }
            };

            let Some(price) = extract_price(&response.text) else {
                warn!(ticker = %ticker, "No price found in response");
                continue;
            };

            for position in positions.iter().filter(|p| &p.ticker == ticker) {
                let mut position = position.clone();
                position.current_price = Some(price);
                if let Some(cost_basis) = position.cost_basis {
                    if cost_basis > 0.0 {
                        position.unrealized_pnl_pct = Some((price - cost_basis) / cost_basis);
                    }
                }
                self.store.save_position(&position).await?;
            }

            updated += 1;
            info!(ticker = %ticker, price, "Price updated");
        }

        info!(updated, total = tickers.len(), "Price update complete");
        Ok(PriceUpdateReport {
            tickers: tickers.len(),
            updated,
        })
    }

    /// Weekly: full risk report for every active fund, with an alert when
    /// the report carries flags.
    pub async fn generate_risk_reports(&self) -> Result<RiskJobReport> {
        info!("Generating weekly risk reports");

        let mut reports_generated = 0;

        for fund in self.store.list_funds_by_status(FundStatus::Active).await? {
            let positions = self
                .store
                .positions_for_fund(fund.id, Some(PositionStatus::Active))
                .await?;
            if positions.is_empty() {
                continue;
            }

            let weights: Vec<PositionWeight> = positions
                .iter()
                .map(|p| PositionWeight {
                    ticker: p.ticker.clone(),
                    weight: p.target_weight,
                })
                .collect();

            let report = match self
                .risk
                .analyze(&weights, DEFAULT_PORTFOLIO_VALUE, true)
                .await
            {
                Ok(report) => report,
                Err(e) => {
                    warn!(fund = %fund.name, error = %e, "Risk report failed");
                    continue;
                }
            };

            let flags = report.risk_flags.clone();
            self.store
                .save_risk_report(&RiskReportRecord {
                    id: Uuid::new_v4(),
                    fund_id: fund.id,
                    report,
                    created_at: Utc::now(),
                })
                .await?;
            reports_generated += 1;

            if !flags.is_empty() {
                let alert = Alert {
                    id: Uuid::new_v4(),
                    fund_id: fund.id,
                    kind: "risk".to_string(),
                    ticker: None,
                    title: format!("Weekly Risk Report: {} flag(s)", flags.len()),
                    message: flags.iter().take(3).cloned().collect::<Vec<_>>().join("; "),
                    severity: AlertSeverity::Warning,
                    action_required: false,
                    action_options: None,
                    created_at: Utc::now(),
                };
                self.store.save_alert(&alert).await?;
            }

            info!(fund = %fund.name, "Risk report generated");
        }

        Ok(RiskJobReport { reports_generated })
    }

    /// Weekly: check drift for every active fund and raise an actionable
    /// alert where rebalancing is recommended.
    pub async fn check_rebalancing(&self) -> Result<RebalanceReport> {
        info!("Checking rebalancing needs");

        let mut funds_checked = 0;
        let mut rebalance_needed = 0;

        for fund in self.store.list_funds_by_status(FundStatus::Active).await? {
            let positions = self
                .store
                .positions_for_fund(fund.id, Some(PositionStatus::Active))
                .await?;
            if positions.is_empty() {
                continue;
            }

            let positions_data: Vec<Value> = positions
                .iter()
                .map(|p| {
                    json!({
                        "ticker": p.ticker,
                        "target_weight": p.target_weight,
                        "current_weight": p.current_weight,
                    })
                })
                .collect();

            let mut context = Map::new();
            context.insert("positions".to_string(), Value::Array(positions_data));

            let result = match self
                .invoker
                .invoke(
                    &self.registry.portfolio.rebalancing,
                    "Check if rebalancing is needed",
                    &context,
                )
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    warn!(fund = %fund.name, error = %e, "Rebalancing check failed");
                    continue;
                }
            };

            funds_checked += 1;

            if result.get("needs_rebalancing").and_then(Value::as_bool) == Some(true) {
                rebalance_needed += 1;
                let alert = Alert {
                    id: Uuid::new_v4(),
                    fund_id: fund.id,
                    kind: "drift".to_string(),
                    ticker: None,
                    title: "Rebalancing Recommended".to_string(),
                    message: result
                        .payload
                        .str_field("summary")
                        .unwrap_or("Portfolio drift exceeds threshold")
                        .to_string(),
                    severity: AlertSeverity::Warning,
                    action_required: true,
                    action_options: Some(vec!["rebalance".to_string(), "dismiss".to_string()]),
                    created_at: Utc::now(),
                };
                self.store.save_alert(&alert).await?;
                info!(fund = %fund.name, "Rebalancing needed");
            }
        }

        Ok(RebalanceReport {
            funds_checked,
            rebalance_needed,
        })
    }

    /// Weekly: compare every active fund to its benchmarks.
    pub async fn update_performance(&self) -> Result<PerformanceReport> {
        info!("Updating performance metrics");

        let mut funds_updated = 0;

        for fund in self.store.list_funds_by_status(FundStatus::Active).await? {
            let positions = self
                .store
                .positions_for_fund(fund.id, Some(PositionStatus::Active))
                .await?;

            let positions_data: Vec<Value> = positions
                .iter()
                .map(|p| json!({"ticker": p.ticker, "weight": p.target_weight}))
                .collect();

            let mut context = Map::new();
            context.insert("positions".to_string(), Value::Array(positions_data));
            context.insert(
                "primary_benchmark".to_string(),
                json!(fund.benchmark_primary.as_deref().unwrap_or("QQQ")),
            );
            context.insert(
                "secondary_benchmark".to_string(),
                json!(fund.benchmark_secondary.as_deref().unwrap_or("SPY")),
            );

            match self
                .invoker
                .invoke(
                    &self.registry.performance.benchmark_tracker,
                    "Compare fund performance to benchmarks",
                    &context,
                )
                .await
            {
                Ok(result) => {
                    funds_updated += 1;
                    let outperforming = result
                        .get("benchmark_comparison")
                        .and_then(|c| c.get("primary"))
                        .and_then(|p| p.get("is_outperforming"))
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    info!(fund = %fund.name, outperforming, "Performance updated");
                }
                Err(e) => {
                    warn!(fund = %fund.name, error = %e, "Performance update failed");
                }
            }
        }

        Ok(PerformanceReport { funds_updated })
    }
}

fn extract_price(text: &str) -> Option<f64> {
    PRICE_RE
        .captures(text)
        .and_then(|captures| captures[1].replace(',', "").parse::<f64>().ok())
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockReasoningClient;
    use crate::models::{Fund, Position};
    use crate::store::InMemoryStore;
    use std::time::Duration;

    async fn seed_fund(store: &InMemoryStore, tickers: &[(&str, f64)]) -> Fund {
        let mut fund = Fund::new("Seed Fund".to_string(), "seed-fund".to_string(), None, None);
        fund.status = FundStatus::Active;
        store.save_fund(&fund).await.unwrap();

        for (ticker, weight) in tickers {
            let mut position = Position::proposed(fund.id, ticker.to_string(), None, *weight);
            position.status = PositionStatus::Active;
            position.cost_basis = Some(100.0);
            store.save_position(&position).await.unwrap();
        }

        fund
    }

    fn jobs(client: Arc<MockReasoningClient>, store: Arc<InMemoryStore>) -> Jobs {
        Jobs::new(
            store,
            Arc::new(AgentRegistry::new()),
            AgentInvoker::new(client.clone(), Duration::from_secs(30)),
            client,
        )
    }

    #[test]
    fn test_extract_price() {
        assert_eq!(extract_price("NVDA is trading at $123.45 today."), Some(123.45));
        assert_eq!(extract_price("Roughly 1,234.5 dollars"), Some(1234.5));
        assert_eq!(extract_price("no numbers here"), None);
    }

    #[tokio::test]
    async fn test_monitor_creates_alert_for_critical_finding() {
        let store = Arc::new(InMemoryStore::new());
        let fund = seed_fund(&store, &[("NVDA", 0.06), ("MSFT", 0.05)]).await;

        let client = Arc::new(
            MockReasoningClient::new()
                .respond(
                    "\"ticker\": \"NVDA\"",
                    r#"{"alert_level": "critical", "summary": "Guidance withdrawn"}"#,
                )
                .respond("Position Monitor", r#"{"alert_level": "info", "summary": "Quiet"}"#),
        );

        let report = jobs(client, store.clone()).monitor_all_positions().await.unwrap();

        assert_eq!(report.positions_checked, 2);
        assert_eq!(report.alerts_created, 1);

        let alerts = store.alerts_for_fund(fund.id).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
        assert!(alerts[0].action_required);
        assert_eq!(
            alerts[0].action_options.as_deref(),
            Some(&["hold".to_string(), "review".to_string(), "trim".to_string(), "sell".to_string()][..])
        );
    }

    #[tokio::test]
    async fn test_update_prices_sets_price_and_pnl() {
        let store = Arc::new(InMemoryStore::new());
        let fund = seed_fund(&store, &[("NVDA", 0.06)]).await;

        let client = Arc::new(MockReasoningClient::new().respond(
            "current stock price of NVDA",
            "NVDA is trading at $123.45 right now.",
        ));

        let report = jobs(client, store.clone()).update_all_prices().await.unwrap();
        assert_eq!(report.updated, 1);

        let positions = store
            .positions_for_fund(fund.id, Some(PositionStatus::Active))
            .await
            .unwrap();
        assert_eq!(positions[0].current_price, Some(123.45));
        let pnl = positions[0].unrealized_pnl_pct.unwrap();
        assert!((pnl - 0.2345).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_weekly_risk_reports_persist_and_alert() {
        let store = Arc::new(InMemoryStore::new());
        let fund = seed_fund(&store, &[("NVDA", 0.5), ("MSFT", 0.5)]).await;

        let client = Arc::new(
            MockReasoningClient::new().respond(
                "Stress Test",
                r#"{
                    "worst_case_scenario": {"portfolio_decline": "-60%"},
                    "risk_flags": ["Concentrated book"],
                    "recommendations": ["Diversify"]
                }"#,
            ),
        );

        let report = jobs(client, store.clone()).generate_risk_reports().await.unwrap();
        assert_eq!(report.reports_generated, 1);

        let saved = store.risk_reports_for_fund(fund.id).await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].report.summary.overall_risk_level.to_string(), "HIGH");

        let alerts = store.alerts_for_fund(fund.id).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, "risk");
    }

    #[tokio::test]
    async fn test_check_rebalancing_raises_actionable_alert() {
        let store = Arc::new(InMemoryStore::new());
        let fund = seed_fund(&store, &[("NVDA", 0.06)]).await;

        let client = Arc::new(MockReasoningClient::new().respond(
            "Rebalancing Analyst",
            r#"{"needs_rebalancing": true, "summary": "NVDA drifted to 9%"}"#,
        ));

        let report = jobs(client, store.clone()).check_rebalancing().await.unwrap();
        assert_eq!(report.funds_checked, 1);
        assert_eq!(report.rebalance_needed, 1);

        let alerts = store.alerts_for_fund(fund.id).await.unwrap();
        assert_eq!(alerts[0].kind, "drift");
        assert!(alerts[0].action_required);
    }

    #[tokio::test]
    async fn test_update_performance_counts_funds() {
        let store = Arc::new(InMemoryStore::new());
        seed_fund(&store, &[("NVDA", 0.06)]).await;

        let client = Arc::new(MockReasoningClient::new().respond(
            "Benchmark Tracker",
            r#"{"benchmark_comparison": {"primary": {"is_outperforming": true}}}"#,
        ));

        let report = jobs(client, store).update_performance().await.unwrap();
        assert_eq!(report.funds_updated, 1);
    }
}
