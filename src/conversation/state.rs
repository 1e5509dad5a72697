//! Conversation state
//!
//! A conversation is an append-only message history plus a phase. The
//! phase enum carries the stage payload for the fund-build cycle, so a
//! phase can never be paired with another phase's data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::ThesisDigest;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Fund parameters extracted by the intent interpreter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundParams {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mandate: Option<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub num_positions: Option<u32>,
    #[serde(default)]
    pub constraints: Option<Value>,
    #[serde(default)]
    pub specific_stocks: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Phase of the fund-build cycle, with the data that phase carries.
///
/// Transitions only move forward within one cycle:
/// creation -> scouting -> discovered -> analyzed -> complete. A
/// conversation attached to an existing fund starts in management.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Creation,
    Management,
    Scouting {
        params: FundParams,
    },
    Discovered {
        params: FundParams,
        tickers: Vec<String>,
    },
    Analyzed {
        params: FundParams,
        theses: Vec<ThesisDigest>,
    },
    Complete {
        positions: Vec<String>,
    },
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Creation => "creation",
            Phase::Management => "management",
            Phase::Scouting { .. } => "scouting",
            Phase::Discovered { .. } => "discovered",
            Phase::Analyzed { .. } => "analyzed",
            Phase::Complete { .. } => "complete",
        }
    }

    /// The fund params carried by the current stage, if any.
    pub fn params(&self) -> Option<&FundParams> {
        match self {
            Phase::Scouting { params }
            | Phase::Discovered { params, .. }
            | Phase::Analyzed { params, .. } => Some(params),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub fund_id: Option<Uuid>,
    pub phase: Phase,
    pub messages: Vec<ChatTurn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(fund_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            fund_id,
            phase: if fund_id.is_some() {
                Phase::Management
            } else {
                Phase::Creation
            },
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message to the history.
    pub fn add_message(&mut self, role: ChatRole, content: impl Into<String>) {
        self.messages.push(ChatTurn {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
        self.updated_at = Utc::now();
    }

    /// The last `n` turns as `{role, content}` pairs for agent context.
    pub fn recent_history(&self, n: usize) -> Vec<Value> {
        self.messages
            .iter()
            .rev()
            .take(n)
            .rev()
            .map(|turn| {
                serde_json::json!({
                    "role": turn.role,
                    "content": turn.content,
                })
            })
            .collect()
    }
}
