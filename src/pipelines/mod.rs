//! Orchestration pipelines
//!
//! Each pipeline fans out to a group of agents, captures per-branch
//! failures as values, and aggregates whatever survived. Sibling branches
//! are never cancelled by one branch failing; only the final
//! synthesis/aggregation call can fail a pipeline wholesale.

pub mod analysis;
pub mod discovery;
pub mod risk;

pub use analysis::{AnalysisPipeline, BatchEntry, BatchOutcome};
pub use discovery::DiscoveryPipeline;
pub use risk::RiskPipeline;
