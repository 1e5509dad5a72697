//! State persistence layer
//!
//! The core only needs create-with-generated-id, update-by-id, and
//! ordered conversation history; schema and storage engine stay behind
//! this trait. [`InMemoryStore`] backs tests and the demo binary;
//! [`PostgresStore`] persists across restarts.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::conversation::state::Conversation;
use crate::models::{
    Alert, Fund, FundStatus, Position, PositionStatus, RiskReportRecord, ThesisRecord,
};
use crate::Result;

pub mod postgres;
pub use postgres::PostgresStore;

/// Trait for entity persistence. `save_*` operations upsert by id.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn save_fund(&self, fund: &Fund) -> Result<()>;
    async fn get_fund(&self, id: Uuid) -> Result<Option<Fund>>;
    async fn update_fund_status(&self, id: Uuid, status: FundStatus) -> Result<()>;
    async fn list_funds_by_status(&self, status: FundStatus) -> Result<Vec<Fund>>;

    async fn save_position(&self, position: &Position) -> Result<()>;
    async fn positions_for_fund(
        &self,
        fund_id: Uuid,
        status: Option<PositionStatus>,
    ) -> Result<Vec<Position>>;
    async fn list_positions_by_status(&self, status: PositionStatus) -> Result<Vec<Position>>;

    async fn save_thesis(&self, record: &ThesisRecord) -> Result<()>;
    async fn latest_thesis(&self, ticker: &str) -> Result<Option<ThesisRecord>>;

    async fn save_risk_report(&self, record: &RiskReportRecord) -> Result<()>;
    async fn risk_reports_for_fund(&self, fund_id: Uuid) -> Result<Vec<RiskReportRecord>>;

    async fn save_alert(&self, alert: &Alert) -> Result<()>;
    async fn alerts_for_fund(&self, fund_id: Uuid) -> Result<Vec<Alert>>;

    async fn save_conversation(&self, conversation: &Conversation) -> Result<()>;
    async fn load_conversation(&self, id: Uuid) -> Result<Option<Conversation>>;
}

/// In-memory store for development and tests.
#[derive(Default)]
pub struct InMemoryStore {
    funds: Arc<RwLock<HashMap<Uuid, Fund>>>,
    positions: Arc<RwLock<HashMap<Uuid, Position>>>,
    theses: Arc<RwLock<Vec<ThesisRecord>>>,
    risk_reports: Arc<RwLock<Vec<RiskReportRecord>>>,
    alerts: Arc<RwLock<Vec<Alert>>>,
    conversations: Arc<RwLock<HashMap<Uuid, Conversation>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    async fn save_fund(&self, fund: &Fund) -> Result<()> {
        let mut funds = self.funds.write().await;
        funds.insert(fund.id, fund.clone());
        Ok(())
    }

    async fn get_fund(&self, id: Uuid) -> Result<Option<Fund>> {
        let funds = self.funds.read().await;
        Ok(funds.get(&id).cloned())
    }

    async fn update_fund_status(&self, id: Uuid, status: FundStatus) -> Result<()> {
        let mut funds = self.funds.write().await;
        if let Some(fund) = funds.get_mut(&id) {
            fund.status = status;
        }
        Ok(())
    }

    async fn list_funds_by_status(&self, status: FundStatus) -> Result<Vec<Fund>> {
        let funds = self.funds.read().await;
        let mut matching: Vec<Fund> = funds
            .values()
            .filter(|f| f.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|f| f.created_at);
        Ok(matching)
    }

    async fn save_position(&self, position: &Position) -> Result<()> {
        let mut positions = self.positions.write().await;
        positions.insert(position.id, position.clone());
        Ok(())
    }

    async fn positions_for_fund(
        &self,
        fund_id: Uuid,
        status: Option<PositionStatus>,
    ) -> Result<Vec<Position>> {
        let positions = self.positions.read().await;
        let mut matching: Vec<Position> = positions
            .values()
            .filter(|p| p.fund_id == fund_id && status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        matching.sort_by_key(|p| p.created_at);
        Ok(matching)
    }

    async fn list_positions_by_status(&self, status: PositionStatus) -> Result<Vec<Position>> {
        let positions = self.positions.read().await;
        let mut matching: Vec<Position> = positions
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|p| p.created_at);
        Ok(matching)
    }

    async fn save_thesis(&self, record: &ThesisRecord) -> Result<()> {
        let mut theses = self.theses.write().await;
        theses.push(record.clone());
        Ok(())
    }

    async fn latest_thesis(&self, ticker: &str) -> Result<Option<ThesisRecord>> {
        let theses = self.theses.read().await;
        Ok(theses
            .iter()
            .filter(|t| t.ticker == ticker)
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn save_risk_report(&self, record: &RiskReportRecord) -> Result<()> {
        let mut reports = self.risk_reports.write().await;
        reports.push(record.clone());
        Ok(())
    }

    async fn risk_reports_for_fund(&self, fund_id: Uuid) -> Result<Vec<RiskReportRecord>> {
        let reports = self.risk_reports.read().await;
        Ok(reports
            .iter()
            .filter(|r| r.fund_id == fund_id)
            .cloned()
            .collect())
    }

    async fn save_alert(&self, alert: &Alert) -> Result<()> {
        let mut alerts = self.alerts.write().await;
        alerts.push(alert.clone());
        Ok(())
    }

    async fn alerts_for_fund(&self, fund_id: Uuid) -> Result<Vec<Alert>> {
        let alerts = self.alerts.read().await;
        Ok(alerts
            .iter()
            .filter(|a| a.fund_id == fund_id)
            .cloned()
            .collect())
    }

    async fn save_conversation(&self, conversation: &Conversation) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        conversations.insert(conversation.id, conversation.clone());
        Ok(())
    }

    async fn load_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(&id).cloned())
    }
}
