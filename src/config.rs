//! Application settings loaded from environment variables
//!
//! Collected once at startup and passed by reference; `.env` files are
//! honored via dotenv.

use std::env;
use std::time::Duration;

use crate::error::OrchestrationError;
use crate::Result;

/// Runtime configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct Settings {
    /// API key for the Gemini reasoning service.
    pub google_api_key: String,

    /// Model id used for heavy reasoning (analysis, synthesis, PM decisions).
    pub heavy_model: String,

    /// Model id used for fast tasks (screening, parsing, intent).
    pub fast_model: String,

    /// Upper bound on generated tokens per call.
    pub max_output_tokens: u32,

    /// Timeout applied to every outbound agent call.
    pub agent_timeout_secs: u64,

    /// Maximum in-flight analyses during batch processing. 1 = strictly
    /// sequential, which keeps the external call rate bounded.
    pub max_concurrent_analyses: usize,

    /// Optional Postgres connection string. Absent = in-memory store.
    pub database_url: Option<String>,
}

impl Settings {
    /// Load settings from the process environment.
    ///
    /// Only `GOOGLE_API_KEY` (or `GEMINI_API_KEY`) is required; everything
    /// else has a working default.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let google_api_key = env::var("GOOGLE_API_KEY")
            .or_else(|_| env::var("GEMINI_API_KEY"))
            .map_err(|_| {
                OrchestrationError::ConfigError(
                    "GOOGLE_API_KEY (or GEMINI_API_KEY) is not set".to_string(),
                )
            })?;

        Ok(Self {
            google_api_key,
            ..Self::defaults()
        })
    }

    /// Settings suitable for tests and the mock-backed demo binary.
    pub fn for_tests() -> Self {
        Self::defaults()
    }

    fn defaults() -> Self {
        Self {
            google_api_key: String::new(),
            heavy_model: env_or("GEMINI_HEAVY_MODEL", "gemini-2.5-pro"),
            fast_model: env_or("GEMINI_FAST_MODEL", "gemini-2.0-flash"),
            max_output_tokens: parse_or("GEMINI_MAX_OUTPUT_TOKENS", 8192),
            agent_timeout_secs: parse_or("AGENT_TIMEOUT_SECS", 120),
            max_concurrent_analyses: parse_or("MAX_CONCURRENT_ANALYSES", 1),
            database_url: env::var("DATABASE_URL")
                .or_else(|_| env::var("POSTGRES_URL"))
                .ok(),
        }
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
