//! Postgres-backed store
//!
//! Entities are stored whole as JSONB payloads with a few queryable
//! columns duplicated alongside. The pool connects lazily and the schema
//! is bootstrapped idempotently on first use.

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::conversation::state::Conversation;
use crate::error::OrchestrationError;
use crate::models::{
    Alert, Fund, FundStatus, Position, PositionStatus, RiskReportRecord, ThesisRecord,
};
use crate::store::Store;
use crate::Result;

pub struct PostgresStore {
    pool: PgPool,
    schema_ready: OnceCell<()>,
}

impl PostgresStore {
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .map_err(|e| {
                OrchestrationError::DatabaseError(format!("Failed to initialize pool: {}", e))
            })?;

        Ok(Self {
            pool,
            schema_ready: OnceCell::new(),
        })
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS funds (
                      id UUID PRIMARY KEY,
                      status TEXT NOT NULL,
                      payload JSONB NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS positions (
                      id UUID PRIMARY KEY,
                      fund_id UUID NOT NULL,
                      ticker TEXT NOT NULL,
                      status TEXT NOT NULL,
                      payload JSONB NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS theses (
                      id UUID PRIMARY KEY,
                      ticker TEXT NOT NULL,
                      payload JSONB NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS risk_reports (
                      id UUID PRIMARY KEY,
                      fund_id UUID NOT NULL,
                      payload JSONB NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS alerts (
                      id UUID PRIMARY KEY,
                      fund_id UUID NOT NULL,
                      payload JSONB NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS conversations (
                      id UUID PRIMARY KEY,
                      payload JSONB NOT NULL,
                      updated_at TIMESTAMPTZ NOT NULL
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_positions_fund ON positions (fund_id);
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_theses_ticker_time ON theses (ticker, created_at);
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                OrchestrationError::DatabaseError(format!("Failed to initialize schema: {}", e))
            })?;

        Ok(())
    }

    fn db_err(context: &str, e: sqlx::Error) -> OrchestrationError {
        OrchestrationError::DatabaseError(format!("{}: {}", context, e))
    }
}

fn status_str<S: serde::Serialize>(status: &S) -> String {
    serde_json::to_value(status)
        .ok()
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default()
}

fn from_payload<T: serde::de::DeserializeOwned>(row: &sqlx::postgres::PgRow) -> Result<T> {
    let payload: serde_json::Value = row
        .try_get("payload")
        .map_err(|e| OrchestrationError::DatabaseError(format!("Missing payload column: {}", e)))?;
    Ok(serde_json::from_value(payload)?)
}

#[async_trait::async_trait]
impl Store for PostgresStore {
    async fn save_fund(&self, fund: &Fund) -> Result<()> {
        self.ensure_schema().await?;
        sqlx::query(
            r#"
            INSERT INTO funds (id, status, payload, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET status = $2, payload = $3
            "#,
        )
        .bind(fund.id)
        .bind(status_str(&fund.status))
        .bind(serde_json::to_value(fund)?)
        .bind(fund.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to save fund", e))?;
        Ok(())
    }

    async fn get_fund(&self, id: Uuid) -> Result<Option<Fund>> {
        self.ensure_schema().await?;
        let row = sqlx::query("SELECT payload FROM funds WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::db_err("Failed to load fund", e))?;
        row.as_ref().map(from_payload).transpose()
    }

    async fn update_fund_status(&self, id: Uuid, status: FundStatus) -> Result<()> {
        self.ensure_schema().await?;
        sqlx::query(
            r#"
            UPDATE funds
            SET status = $2,
                payload = jsonb_set(payload, '{status}', to_jsonb($2::text))
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status_str(&status))
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to update fund status", e))?;
        Ok(())
    }

    async fn list_funds_by_status(&self, status: FundStatus) -> Result<Vec<Fund>> {
        self.ensure_schema().await?;
        let rows = sqlx::query(
            "SELECT payload FROM funds WHERE status = $1 ORDER BY created_at ASC",
        )
        .bind(status_str(&status))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to list funds", e))?;
        rows.iter().map(from_payload).collect()
    }

    async fn save_position(&self, position: &Position) -> Result<()> {
        self.ensure_schema().await?;
        sqlx::query(
            r#"
            INSERT INTO positions (id, fund_id, ticker, status, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET status = $4, payload = $5
            "#,
        )
        .bind(position.id)
        .bind(position.fund_id)
        .bind(&position.ticker)
        .bind(status_str(&position.status))
        .bind(serde_json::to_value(position)?)
        .bind(position.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to save position", e))?;
        Ok(())
    }

    async fn positions_for_fund(
        &self,
        fund_id: Uuid,
        status: Option<PositionStatus>,
    ) -> Result<Vec<Position>> {
        self.ensure_schema().await?;
        let rows = match status {
            Some(status) => sqlx::query(
                "SELECT payload FROM positions WHERE fund_id = $1 AND status = $2 ORDER BY created_at ASC",
            )
            .bind(fund_id)
            .bind(status_str(&status))
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query(
                "SELECT payload FROM positions WHERE fund_id = $1 ORDER BY created_at ASC",
            )
            .bind(fund_id)
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(|e| Self::db_err("Failed to list positions", e))?;
        rows.iter().map(from_payload).collect()
    }

    async fn list_positions_by_status(&self, status: PositionStatus) -> Result<Vec<Position>> {
        self.ensure_schema().await?;
        let rows = sqlx::query(
            "SELECT payload FROM positions WHERE status = $1 ORDER BY created_at ASC",
        )
        .bind(status_str(&status))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to list positions", e))?;
        rows.iter().map(from_payload).collect()
    }

    async fn save_thesis(&self, record: &ThesisRecord) -> Result<()> {
        self.ensure_schema().await?;
        sqlx::query(
            r#"
            INSERT INTO theses (id, ticker, payload, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET payload = $3
            "#,
        )
        .bind(record.id)
        .bind(&record.ticker)
        .bind(serde_json::to_value(record)?)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to save thesis", e))?;
        Ok(())
    }

    async fn latest_thesis(&self, ticker: &str) -> Result<Option<ThesisRecord>> {
        self.ensure_schema().await?;
        let row = sqlx::query(
            "SELECT payload FROM theses WHERE ticker = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to load thesis", e))?;
        row.as_ref().map(from_payload).transpose()
    }

    async fn save_risk_report(&self, record: &RiskReportRecord) -> Result<()> {
        self.ensure_schema().await?;
        sqlx::query(
            r#"
            INSERT INTO risk_reports (id, fund_id, payload, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET payload = $3
            "#,
        )
        .bind(record.id)
        .bind(record.fund_id)
        .bind(serde_json::to_value(record)?)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to save risk report", e))?;
        Ok(())
    }

    async fn risk_reports_for_fund(&self, fund_id: Uuid) -> Result<Vec<RiskReportRecord>> {
        self.ensure_schema().await?;
        let rows = sqlx::query(
            "SELECT payload FROM risk_reports WHERE fund_id = $1 ORDER BY created_at ASC",
        )
        .bind(fund_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to list risk reports", e))?;
        rows.iter().map(from_payload).collect()
    }

    async fn save_alert(&self, alert: &Alert) -> Result<()> {
        self.ensure_schema().await?;
        sqlx::query(
            r#"
            INSERT INTO alerts (id, fund_id, payload, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(alert.id)
        .bind(alert.fund_id)
        .bind(serde_json::to_value(alert)?)
        .bind(alert.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to save alert", e))?;
        Ok(())
    }

    async fn alerts_for_fund(&self, fund_id: Uuid) -> Result<Vec<Alert>> {
        self.ensure_schema().await?;
        let rows = sqlx::query(
            "SELECT payload FROM alerts WHERE fund_id = $1 ORDER BY created_at ASC",
        )
        .bind(fund_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to list alerts", e))?;
        rows.iter().map(from_payload).collect()
    }

    async fn save_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.ensure_schema().await?;
        sqlx::query(
            r#"
            INSERT INTO conversations (id, payload, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET payload = $2, updated_at = $3
            "#,
        )
        .bind(conversation.id)
        .bind(serde_json::to_value(conversation)?)
        .bind(conversation.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to save conversation", e))?;
        Ok(())
    }

    async fn load_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.ensure_schema().await?;
        let row = sqlx::query("SELECT payload FROM conversations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::db_err("Failed to load conversation", e))?;
        row.as_ref().map(from_payload).transpose()
    }
}
