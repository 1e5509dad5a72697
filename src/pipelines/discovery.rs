//! Stock discovery pipeline
//!
//! Runs the scout fleet in parallel, merges and deduplicates their
//! findings by ticker, and hands the merged set to the screener for
//! HOT/WARM/COLD tiering.
//!
//! Scouts are dispatched together and joined in dispatch order, so the
//! merge is deterministic regardless of completion order: the first scout
//! in dispatch order wins a contested ticker and later duplicates only
//! boost its `multi_source` flag.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::agents::{AgentInvoker, AgentRegistry, AgentResult, AgentSpec};
use crate::models::{
    DiscoveredStock, DiscoveryOutcome, DiscoveryStats, ScoutSummary, ScreenedUniverse,
};
use crate::Result;

#[derive(Clone)]
pub struct DiscoveryPipeline {
    registry: Arc<AgentRegistry>,
    invoker: AgentInvoker,
}

struct ScoutTask {
    name: String,
    spec: AgentSpec,
    task: String,
    context: Map<String, Value>,
}

impl DiscoveryPipeline {
    pub fn new(registry: Arc<AgentRegistry>, invoker: AgentInvoker) -> Self {
        Self { registry, invoker }
    }

    /// Run discovery to build a stock universe.
    ///
    /// `run_all_scouts` forces the disruption scout; otherwise it only runs
    /// when the mandate mentions growth or disruption.
    pub async fn discover(
        &self,
        themes: &[String],
        mandate: Option<&str>,
        exclude: &[String],
        run_all_scouts: bool,
    ) -> Result<DiscoveryOutcome> {
        let tasks = self.build_tasks(themes, mandate, exclude, run_all_scouts);
        let scouts_run = tasks.len();

        info!(scouts = scouts_run, ?themes, "Discovery: dispatching scouts");

        let handles: Vec<(String, JoinHandle<Result<AgentResult>>)> = tasks
            .into_iter()
            .map(|ScoutTask { name, spec, task, context }| {
                let invoker = self.invoker.clone();
                let handle =
                    tokio::spawn(async move { invoker.invoke(&spec, &task, &context).await });
                (name, handle)
            })
            .collect();

        // Join in dispatch order; a failed branch is logged and dropped,
        // never allowed to abort its siblings.
        let mut per_scout: Vec<(String, Vec<DiscoveredStock>)> = Vec::new();
        let mut scout_summaries = Vec::new();

        for (name, handle) in handles {
            let result = match handle.await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    warn!(scout = %name, error = %e, "Scout failed");
                    continue;
                }
                Err(e) => {
                    warn!(scout = %name, error = %e, "Scout task panicked");
                    continue;
                }
            };

            let stocks = extract_stocks(&result);
            info!(scout = %name, count = stocks.len(), "Scout complete");

            scout_summaries.push(ScoutSummary {
                name: name.clone(),
                count: stocks.len(),
                summary: result.payload.str_field("summary").unwrap_or("").to_string(),
            });
            per_scout.push((name, stocks));
        }

        let total_discovered: usize = per_scout.iter().map(|(_, s)| s.len()).sum();
        let unique_stocks = merge_scout_results(per_scout);

        info!(unique = unique_stocks.len(), total_discovered, "Discovery: merged scout results");

        // Screening is the aggregation stage: its failure fails the run.
        let mut context = Map::new();
        context.insert(
            "scout_results".to_string(),
            serde_json::to_value(&unique_stocks)?,
        );
        context.insert("fund_mandate".to_string(), json!(mandate));
        context.insert("themes".to_string(), json!(themes));

        let screened = self
            .invoker
            .invoke(
                &self.registry.research.screener,
                "Screen these stocks for investment potential",
                &context,
            )
            .await?;

        let universe: ScreenedUniverse = screened
            .get("screened_stocks")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let stats = DiscoveryStats {
            scouts_run,
            total_discovered,
            unique_stocks: unique_stocks.len(),
            hot_count: universe.hot_count(),
            warm_count: universe.warm_count(),
            cold_count: universe.cold_count(),
        };

        info!(
            hot = stats.hot_count,
            warm = stats.warm_count,
            cold = stats.cold_count,
            "Discovery complete"
        );

        Ok(DiscoveryOutcome {
            universe,
            stats,
            scout_summaries,
            screening_summary: screened.payload.str_field("summary").unwrap_or("").to_string(),
        })
    }

    /// Quick single-theme discovery without screening.
    pub async fn quick_discover(&self, theme: &str) -> Result<(Vec<DiscoveredStock>, String)> {
        let mut context = Map::new();
        context.insert("theme".to_string(), json!(theme));

        let result = self
            .invoker
            .invoke(
                &self.registry.scouts.thematic,
                &format!("Find the best stocks for {theme}"),
                &context,
            )
            .await?;

        let stocks = extract_stocks(&result);
        let summary = result.payload.str_field("summary").unwrap_or("").to_string();
        Ok((stocks, summary))
    }

    fn build_tasks(
        &self,
        themes: &[String],
        mandate: Option<&str>,
        exclude: &[String],
        run_all_scouts: bool,
    ) -> Vec<ScoutTask> {
        let scouts = &self.registry.scouts;
        let base_context = |extra: Option<(&str, Value)>| {
            let mut context = Map::new();
            context.insert("exclude".to_string(), json!(exclude));
            if let Some((key, value)) = extra {
                context.insert(key.to_string(), value);
            }
            context
        };

        let mut tasks = vec![
            ScoutTask {
                name: "Emerging Leaders".to_string(),
                spec: scouts.emerging_leaders,
                task: "Find investment opportunities".to_string(),
                context: base_context(None),
            },
            ScoutTask {
                name: "Smart Money".to_string(),
                spec: scouts.smart_money,
                task: "Find investment opportunities".to_string(),
                context: base_context(None),
            },
        ];

        let mandate_lower = mandate.unwrap_or("").to_lowercase();
        if run_all_scouts || mandate_lower.contains("growth") || mandate_lower.contains("disruption")
        {
            tasks.push(ScoutTask {
                name: "Disruption".to_string(),
                spec: scouts.disruption,
                task: "Find investment opportunities".to_string(),
                context: base_context(None),
            });
        }

        for theme in themes {
            tasks.push(ScoutTask {
                name: format!("Thematic ({theme})"),
                spec: scouts.thematic,
                task: "Find investment opportunities".to_string(),
                context: base_context(Some(("theme", json!(theme)))),
            });
        }

        tasks
    }
}

/// Pull the stock list out of a scout result. Entries without a ticker are
/// dropped; a degraded payload simply contributes nothing.
fn extract_stocks(result: &AgentResult) -> Vec<DiscoveredStock> {
    let Some(items) = result.get("stocks").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| serde_json::from_value::<DiscoveredStock>(item.clone()).ok())
        .filter(|stock| !stock.ticker.is_empty())
        .collect()
}

/// Merge per-scout stock lists, deduplicating by ticker. The first
/// occurrence in dispatch order wins; later duplicates set `multi_source`
/// on the retained entry instead of overwriting it.
pub fn merge_scout_results(per_scout: Vec<(String, Vec<DiscoveredStock>)>) -> Vec<DiscoveredStock> {
    let mut unique: Vec<DiscoveredStock> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (scout_name, stocks) in per_scout {
        for mut stock in stocks {
            stock.source_name = Some(scout_name.clone());
            match index.get(&stock.ticker) {
                Some(&i) => unique[i].multi_source = true,
                None => {
                    index.insert(stock.ticker.clone(), unique.len());
                    unique.push(stock);
                }
            }
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockReasoningClient;
    use std::time::Duration;

    fn stock(ticker: &str) -> DiscoveredStock {
        DiscoveredStock {
            ticker: ticker.to_string(),
            company: None,
            market_cap: None,
            source_name: None,
            multi_source: false,
            extra: Map::new(),
        }
    }

    fn pipeline(client: Arc<MockReasoningClient>) -> DiscoveryPipeline {
        DiscoveryPipeline::new(
            Arc::new(AgentRegistry::new()),
            AgentInvoker::new(client, Duration::from_secs(30)),
        )
    }

    const SCREENER_RESPONSE: &str = r#"{
        "screened_stocks": {
            "hot": [{"ticker": "NVDA", "company": "NVIDIA"}],
            "warm": [{"ticker": "AMD"}, {"ticker": "MSFT"}],
            "cold": [{"ticker": "GOOGL"}]
        },
        "summary": "One clear leader."
    }"#;

    #[test]
    fn test_merge_dedup_flags_multi_source() {
        let merged = merge_scout_results(vec![
            ("Emerging Leaders".to_string(), vec![stock("NVDA"), stock("AMD")]),
            ("Smart Money".to_string(), vec![stock("NVDA"), stock("MSFT")]),
            ("Thematic (AI)".to_string(), vec![stock("GOOGL")]),
        ]);

        let tickers: Vec<&str> = merged.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["NVDA", "AMD", "MSFT", "GOOGL"]);

        let nvda = &merged[0];
        assert!(nvda.multi_source);
        assert_eq!(nvda.source_name.as_deref(), Some("Emerging Leaders"));
        assert!(merged.iter().skip(1).all(|s| !s.multi_source));
    }

    #[tokio::test]
    async fn test_discover_stats_and_tiers() {
        let client = Arc::new(
            MockReasoningClient::new()
                .respond(
                    "Emerging Leaders Scout",
                    r#"{"stocks": [{"ticker": "NVDA"}, {"ticker": "AMD"}], "summary": "chips"}"#,
                )
                .respond(
                    "Smart Money Scout",
                    r#"{"stocks": [{"ticker": "NVDA"}, {"ticker": "MSFT"}], "summary": "flows"}"#,
                )
                .respond(
                    "Thematic Scout",
                    r#"{"stocks": [{"ticker": "GOOGL"}], "summary": "ai theme"}"#,
                )
                .respond("Stock Screener", SCREENER_RESPONSE),
        );

        let outcome = pipeline(client)
            .discover(&["AI".to_string()], None, &[], false)
            .await
            .unwrap();

        assert_eq!(outcome.stats.scouts_run, 3);
        assert_eq!(outcome.stats.total_discovered, 5);
        assert_eq!(outcome.stats.unique_stocks, 4);
        assert_eq!(outcome.stats.hot_count, 1);
        assert_eq!(outcome.stats.warm_count, 2);
        assert_eq!(outcome.stats.cold_count, 1);
        assert_eq!(outcome.scout_summaries.len(), 3);
        assert_eq!(outcome.screening_summary, "One clear leader.");
    }

    #[tokio::test]
    async fn test_failed_scout_is_excluded_not_fatal() {
        let client = Arc::new(
            MockReasoningClient::new()
                .respond(
                    "Emerging Leaders Scout",
                    r#"{"stocks": [{"ticker": "NVDA"}], "summary": "ok"}"#,
                )
                .fail("Smart Money Scout", "rate limited")
                .respond("Stock Screener", SCREENER_RESPONSE),
        );

        let outcome = pipeline(client)
            .discover(&[], None, &[], false)
            .await
            .unwrap();

        // Both scouts dispatched; only one contributed.
        assert_eq!(outcome.stats.scouts_run, 2);
        assert_eq!(outcome.stats.total_discovered, 1);
        assert_eq!(outcome.scout_summaries.len(), 1);
        assert_eq!(outcome.scout_summaries[0].name, "Emerging Leaders");
    }

    #[tokio::test]
    async fn test_disruption_scout_gated_on_mandate() {
        let client = Arc::new(MockReasoningClient::new().respond("Stock Screener", SCREENER_RESPONSE));
        let pipeline = pipeline(client.clone());

        pipeline.discover(&[], Some("US Value"), &[], false).await.unwrap();
        let first_run_calls = client.calls().len();
        // emerging + smart money + screener
        assert_eq!(first_run_calls, 3);

        pipeline
            .discover(&[], Some("US Growth and disruption"), &[], false)
            .await
            .unwrap();
        // + emerging, smart money, disruption, screener
        assert_eq!(client.calls().len(), first_run_calls + 4);
    }

    #[tokio::test]
    async fn test_discovery_is_deterministic() {
        let client = Arc::new(
            MockReasoningClient::new()
                .respond(
                    "Emerging Leaders Scout",
                    r#"{"stocks": [{"ticker": "NVDA"}, {"ticker": "AMD"}], "summary": ""}"#,
                )
                .respond(
                    "Smart Money Scout",
                    r#"{"stocks": [{"ticker": "NVDA"}], "summary": ""}"#,
                )
                .respond("Stock Screener", SCREENER_RESPONSE),
        );
        let pipeline = pipeline(client);

        let first = pipeline.discover(&[], None, &[], false).await.unwrap();
        let second = pipeline.discover(&[], None, &[], false).await.unwrap();

        assert_eq!(first.stats.hot_count, second.stats.hot_count);
        assert_eq!(first.stats.warm_count, second.stats.warm_count);
        assert_eq!(first.stats.cold_count, second.stats.cold_count);
        assert_eq!(first.stats.unique_stocks, second.stats.unique_stocks);
    }

    #[tokio::test]
    async fn test_degraded_screener_payload_yields_empty_universe() {
        let client = Arc::new(
            MockReasoningClient::new()
                .respond(
                    "Emerging Leaders Scout",
                    r#"{"stocks": [{"ticker": "NVDA"}], "summary": ""}"#,
                )
                .respond("Stock Screener", "sorry, no JSON today"),
        );

        let outcome = pipeline(client).discover(&[], None, &[], false).await.unwrap();

        assert_eq!(outcome.stats.unique_stocks, 1);
        assert_eq!(outcome.stats.hot_count, 0);
        assert_eq!(outcome.stats.warm_count, 0);
        assert_eq!(outcome.stats.cold_count, 0);
    }
}
