//! Stock analysis pipeline
//!
//! Runs the four research agents (fundamentals, moat, sentiment,
//! valuation) in parallel for one ticker, then synthesizes whatever
//! survived into an investment thesis. Research branch failures are
//! captured as `{"_error": ...}` slots and impoverish the synthesis
//! context; they never abort the run. Only a failing synthesis call fails
//! the pipeline.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::agents::{AgentInvoker, AgentRegistry, AgentResult, AgentSpec};
use crate::llm::SourceRef;
use crate::models::{AnalysisReport, Recommendation, ResearchSet, Thesis};
use crate::Result;

#[derive(Clone)]
pub struct AnalysisPipeline {
    registry: Arc<AgentRegistry>,
    invoker: AgentInvoker,
    /// Upper bound on in-flight analyses during batch runs. 1 keeps the
    /// batch strictly sequential to bound the external call rate.
    max_in_flight: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEntry {
    pub ticker: String,
    pub status: BatchStatus,
    pub recommendation: Option<Recommendation>,
    pub conviction: Option<f64>,
    pub overall_score: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub analyzed: usize,
    pub failed: usize,
    pub results: Vec<BatchEntry>,
}

impl AnalysisPipeline {
    pub fn new(registry: Arc<AgentRegistry>, invoker: AgentInvoker, max_in_flight: usize) -> Self {
        Self {
            registry,
            invoker,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Run complete analysis on a stock.
    pub async fn analyze(&self, ticker: &str) -> Result<AnalysisReport> {
        self.analyze_with_context(ticker, None).await
    }

    pub async fn analyze_with_context(
        &self,
        ticker: &str,
        additional_context: Option<&str>,
    ) -> Result<AnalysisReport> {
        info!(ticker, "Analysis: running research agents");

        let research = &self.registry.research;
        let branches = [
            ("fundamentals", research.fundamentals),
            ("moat", research.moat),
            ("sentiment", research.sentiment),
            ("valuation", research.valuation),
        ];

        let handles: Vec<(&'static str, JoinHandle<Result<AgentResult>>)> = branches
            .into_iter()
            .map(|(label, spec)| {
                let invoker = self.invoker.clone();
                let task = format!("Analyze {ticker}");
                let mut context = Map::new();
                context.insert("ticker".to_string(), json!(ticker));
                let handle =
                    tokio::spawn(async move { invoker.invoke(&spec, &task, &context).await });
                (label, handle)
            })
            .collect();

        // Join in dispatch order; each slot is a payload or an error tag.
        let mut slots: Vec<Value> = Vec::with_capacity(4);
        let mut sources: Vec<SourceRef> = Vec::new();

        for (label, handle) in handles {
            let slot = match handle.await {
                Ok(Ok(result)) => {
                    sources.extend(result.sources.iter().cloned());
                    result.payload.to_value()
                }
                Ok(Err(e)) => {
                    warn!(ticker, branch = label, error = %e, "Research branch failed");
                    json!({ "_error": e.to_string() })
                }
                Err(e) => {
                    warn!(ticker, branch = label, error = %e, "Research branch panicked");
                    json!({ "_error": e.to_string() })
                }
            };
            slots.push(slot);
        }

        let research = ResearchSet {
            fundamentals: slots[0].clone(),
            moat: slots[1].clone(),
            sentiment: slots[2].clone(),
            valuation: slots[3].clone(),
        };

        // Synthesis always runs, however impoverished the context. Its
        // failure is the one hard failure of this pipeline.
        let mut context = Map::new();
        context.insert("ticker".to_string(), json!(ticker));
        context.insert("fundamentals".to_string(), research.fundamentals.clone());
        context.insert("moat".to_string(), research.moat.clone());
        context.insert("sentiment".to_string(), research.sentiment.clone());
        context.insert("valuation".to_string(), research.valuation.clone());

        let mut task = format!("Create a complete investment thesis for {ticker}.");
        if let Some(extra) = additional_context {
            task.push_str(&format!(" Additional context: {extra}"));
        }

        let synthesis = self
            .invoker
            .invoke(&self.registry.research.thesis_writer, &task, &context)
            .await?;

        let thesis = Thesis::from_payload(ticker, &synthesis.payload);

        info!(
            ticker,
            recommendation = ?thesis.recommendation,
            conviction = thesis.conviction,
            "Analysis complete"
        );

        Ok(AnalysisReport {
            ticker: ticker.to_string(),
            thesis,
            research,
            sources,
        })
    }

    /// Analyze multiple tickers with bounded concurrency, continuing past
    /// individual failures.
    pub async fn analyze_batch(&self, tickers: &[String]) -> BatchOutcome {
        let mut results: Vec<BatchEntry> = Vec::with_capacity(tickers.len());

        for chunk in tickers.chunks(self.max_in_flight) {
            let handles: Vec<(String, JoinHandle<Result<AnalysisReport>>)> = chunk
                .iter()
                .map(|ticker| {
                    let ticker = ticker.to_uppercase();
                    let pipeline = self.clone();
                    let spawned_ticker = ticker.clone();
                    let handle =
                        tokio::spawn(async move { pipeline.analyze(&spawned_ticker).await });
                    (ticker, handle)
                })
                .collect();

            for (ticker, handle) in handles {
                let entry = match handle.await {
                    Ok(Ok(report)) => BatchEntry {
                        ticker,
                        status: BatchStatus::Success,
                        recommendation: Some(report.thesis.recommendation),
                        conviction: Some(report.thesis.conviction),
                        overall_score: report.thesis.scores.overall,
                        error: None,
                    },
                    Ok(Err(e)) => {
                        warn!(ticker = %ticker, error = %e, "Batch analysis failed for ticker");
                        BatchEntry {
                            ticker,
                            status: BatchStatus::Error,
                            recommendation: None,
                            conviction: None,
                            overall_score: None,
                            error: Some(e.to_string()),
                        }
                    }
                    Err(e) => BatchEntry {
                        ticker,
                        status: BatchStatus::Error,
                        recommendation: None,
                        conviction: None,
                        overall_score: None,
                        error: Some(e.to_string()),
                    },
                };
                results.push(entry);
            }
        }

        let analyzed = results
            .iter()
            .filter(|r| r.status == BatchStatus::Success)
            .count();
        let failed = results.len() - analyzed;

        BatchOutcome {
            analyzed,
            failed,
            results,
        }
    }
}
