//! Fund Agent Orchestrator
//!
//! Orchestrates a fleet of LLM-backed agents into fund-management
//! workflows:
//! - Discovery: scouts fan out in parallel, findings are deduplicated by
//!   ticker and screened into HOT/WARM/COLD tiers
//! - Analysis: four research agents per ticker, synthesized into one
//!   investment thesis that survives partial research failures
//! - Risk: stress test / VaR / Monte Carlo / correlation agents rolled
//!   into a single report with orchestrator-derived flags
//! - Conversation: a phase state machine that turns chat into pipeline
//!   stages with persisted, resumable state
//!
//! Branch failures inside a pipeline are captured as values and surfaced
//! as `_error` annotations, never as aborts of sibling branches.

pub mod agents;
pub mod config;
pub mod conversation;
pub mod error;
pub mod jobs;
pub mod llm;
pub mod models;
pub mod pipelines;
pub mod store;

pub use error::Result;

// Re-export common types
pub use agents::{AgentInvoker, AgentRegistry, AgentResult, AgentSpec};
pub use config::Settings;
pub use conversation::{ActionOutcome, ChatOutcome, Conversation, ConversationEngine};
pub use models::*;
pub use pipelines::{AnalysisPipeline, DiscoveryPipeline, RiskPipeline};
